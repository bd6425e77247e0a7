//! Development provider
//!
//! Local git operations, filesystem search, and a package-install helper.
//! Operations shell out to the host tool; a failing subcommand surfaces its
//! own stderr and exit code in the payload, and the output validator turns
//! the non-zero exit into a non-success result.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use globset::Glob;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use walkdir::WalkDir;

use crate::error::ToolError;
use crate::registry::{ParamType, ToolDescriptor, ToolProvider};

/// Cap on matches returned by search_in_files
const MAX_SEARCH_MATCHES: usize = 200;

/// Cap on paths returned by find_files
const MAX_FIND_RESULTS: usize = 500;

/// Provider for local development operations
pub struct DevProvider {
    workspace: PathBuf,
}

impl DevProvider {
    pub fn new(workspace: PathBuf) -> Self {
        // dunce avoids the \\?\ prefix canonicalize produces on Windows.
        let workspace = dunce::canonicalize(&workspace).unwrap_or(workspace);
        Self { workspace }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ToolError> {
        let output = tokio::time::timeout(
            Duration::from_secs(60),
            Command::new(program)
                .args(args)
                .current_dir(&self.workspace)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| ToolError::Timeout(60))?
        .map_err(|e| ToolError::Execution(format!("failed to spawn {}: {}", program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(format!(
            "Exit code: {}\nSTDOUT:\n{}\nSTDERR:\n{}",
            output.status.code().unwrap_or(-1),
            stdout,
            stderr
        ))
    }

    fn find_files(&self, pattern: &str, subdir: Option<&str>) -> Result<String, ToolError> {
        let glob = Glob::new(pattern)
            .map_err(|e| ToolError::Validation(format!("bad glob pattern '{}': {}", pattern, e)))?
            .compile_matcher();

        let root = match subdir {
            Some(dir) => self.workspace.join(dir),
            None => self.workspace.clone(),
        };

        let mut found = Vec::new();
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name().to_string_lossy() != ".git")
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let relative = entry
                .path()
                .strip_prefix(&self.workspace)
                .unwrap_or(entry.path());
            if glob.is_match(name.as_ref()) || glob.is_match(relative) {
                found.push(relative.display().to_string());
                if found.len() >= MAX_FIND_RESULTS {
                    break;
                }
            }
        }
        found.sort();
        Ok(format!("{} items\n{}", found.len(), found.join("\n")))
    }

    fn search_in_files(
        &self,
        pattern: &str,
        file_pattern: Option<&str>,
    ) -> Result<String, ToolError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ToolError::Validation(format!("bad regex '{}': {}", pattern, e)))?;
        let glob = match file_pattern {
            Some(p) => Some(
                Glob::new(p)
                    .map_err(|e| {
                        ToolError::Validation(format!("bad glob pattern '{}': {}", p, e))
                    })?
                    .compile_matcher(),
            ),
            None => None,
        };

        let mut matches = Vec::new();
        'outer: for entry in WalkDir::new(&self.workspace)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name().to_string_lossy() != ".git")
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(glob) = &glob {
                if !glob.is_match(entry.file_name().to_string_lossy().as_ref()) {
                    continue;
                }
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue; // binary or unreadable
            };
            let relative = entry
                .path()
                .strip_prefix(&self.workspace)
                .unwrap_or(entry.path());
            for (line_number, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!(
                        "{}:{}: {}",
                        relative.display(),
                        line_number + 1,
                        line.trim()
                    ));
                    if matches.len() >= MAX_SEARCH_MATCHES {
                        break 'outer;
                    }
                }
            }
        }
        Ok(format!("{} matches\n{}", matches.len(), matches.join("\n")))
    }
}

fn sanitize_package_name(name: &str) -> Result<(), ToolError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/' | '='))
    {
        return Err(ToolError::Validation(format!(
            "invalid package name '{}'",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl ToolProvider for DevProvider {
    fn name(&self) -> &str {
        "dev"
    }

    fn description(&self) -> &str {
        "Local git operations, filesystem search, and package installation"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("dev", "git_status", "Show local git working tree status")
                .with_category("file-ops"),
            ToolDescriptor::new("dev", "git_add", "Stage files in the local repository")
                .with_category("file-ops")
                .with_param("files", ParamType::String, "Paths to stage (default all)", false),
            ToolDescriptor::new("dev", "git_commit", "Commit staged changes")
                .with_category("file-ops")
                .with_param("message", ParamType::String, "Commit message", true),
            ToolDescriptor::new("dev", "git_log", "Show recent commits")
                .with_category("file-ops")
                .with_param("limit", ParamType::Integer, "Number of commits (default 10)", false),
            ToolDescriptor::new("dev", "git_diff", "Show unstaged changes")
                .with_category("file-ops")
                .with_param("path", ParamType::String, "Restrict the diff to a path", false),
            ToolDescriptor::new("dev", "find_files", "Find files by glob pattern")
                .with_category("file-ops")
                .with_param("pattern", ParamType::String, "Glob pattern, e.g. *.rs", true)
                .with_param("path", ParamType::String, "Subdirectory to search", false),
            ToolDescriptor::new("dev", "search_in_files", "Search file contents by regex")
                .with_category("file-ops")
                .with_param("pattern", ParamType::String, "Regex to search for", true)
                .with_param("file_pattern", ParamType::String, "Restrict to matching file names", false),
            ToolDescriptor::new("dev", "install_package", "Install a package with pip, npm, or cargo")
                .with_category("utilities")
                .with_timeout(180)
                .with_param("package", ParamType::String, "Package name", true)
                .with_param("manager", ParamType::String, "pip, npm, or cargo (default pip)", false),
        ]
    }

    async fn call(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        match tool {
            "git_status" => self
                .run("git", &["status", "--short", "--branch"])
                .await
                .map(Value::String),
            "git_add" => {
                let files = args.get("files").and_then(Value::as_str).unwrap_or(".");
                self.run("git", &["add", "--", files]).await.map(Value::String)
            }
            "git_commit" => {
                let message = args
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("message is required".into()))?;
                self.run("git", &["commit", "-m", message])
                    .await
                    .map(Value::String)
            }
            "git_log" => {
                let limit = args
                    .get("limit")
                    .and_then(Value::as_u64)
                    .unwrap_or(10)
                    .clamp(1, 100)
                    .to_string();
                self.run("git", &["log", "--oneline", "-n", &limit])
                    .await
                    .map(Value::String)
            }
            "git_diff" => match args.get("path").and_then(Value::as_str) {
                Some(path) => self
                    .run("git", &["diff", "--", path])
                    .await
                    .map(Value::String),
                None => self.run("git", &["diff"]).await.map(Value::String),
            },
            "find_files" => {
                let pattern = args
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("pattern is required".into()))?;
                let path = args.get("path").and_then(Value::as_str);
                self.find_files(pattern, path).map(Value::String)
            }
            "search_in_files" => {
                let pattern = args
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("pattern is required".into()))?;
                let file_pattern = args.get("file_pattern").and_then(Value::as_str);
                self.search_in_files(pattern, file_pattern).map(Value::String)
            }
            "install_package" => {
                let package = args
                    .get("package")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("package is required".into()))?;
                sanitize_package_name(package)?;
                let manager = args
                    .get("manager")
                    .and_then(Value::as_str)
                    .unwrap_or("pip");
                let output = match manager {
                    "pip" => self.run("pip", &["install", package]).await?,
                    "npm" => self.run("npm", &["install", package]).await?,
                    "cargo" => self.run("cargo", &["add", package]).await?,
                    other => {
                        return Err(ToolError::Validation(format!(
                            "unknown package manager '{}' (expected pip, npm, or cargo)",
                            other
                        )))
                    }
                };
                Ok(json!(output))
            }
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}
