//! Remote provider
//!
//! Command execution, file transfer, and repository management on a remote
//! host through the SSH pool. Every file path is filtered before any I/O:
//! traversal and absolute paths are rejected, and writes are restricted to a
//! whitelisted extension set.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::ToolError;
use crate::registry::{ParamType, ToolDescriptor, ToolProvider};
use crate::ssh::SshPool;

/// Remote directory all workspace state lives under (relative to the
/// login home directory).
const WORKSPACE_ROOT: &str = "ringmaster-workspace";

/// Extensions the remote provider will write
const ALLOWED_WRITE_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "rs", "js", "ts", "json", "yaml", "yml", "toml", "sh", "cfg", "conf",
    "csv", "html", "css", "xml", "ini", "sql", "env.example", "gitignore",
];

/// Reject traversal, absolute paths, and shell-hostile names.
fn safe_relative_path(path: &str) -> Result<(), ToolError> {
    if path.is_empty() {
        return Err(ToolError::Validation("path must not be empty".into()));
    }
    if path.starts_with('/') || path.starts_with('\\') || path.starts_with('~') {
        return Err(ToolError::Security(format!(
            "absolute paths are not allowed: {}",
            path
        )));
    }
    if Path::new(path)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(ToolError::Security(format!(
            "path traversal is not allowed: {}",
            path
        )));
    }
    if path.contains('\'') || path.contains('\n') || path.contains('\0') {
        return Err(ToolError::Security(format!(
            "path contains forbidden characters: {}",
            path
        )));
    }
    Ok(())
}

/// Whether a filename's extension is on the write whitelist.
fn allowed_write_extension(path: &str) -> bool {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    ALLOWED_WRITE_EXTENSIONS
        .iter()
        .any(|ext| name.ends_with(&format!(".{}", ext)))
}

/// Repository names come from user input and end up on a command line.
fn sanitize_repo_name(name: &str) -> Result<(), ToolError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        || name.starts_with('.')
    {
        return Err(ToolError::Validation(format!(
            "invalid repository name '{}'",
            name
        )));
    }
    Ok(())
}

#[derive(Default)]
struct RemoteState {
    current_repo: Option<String>,
}

/// Provider backed by the SSH pool
pub struct RemoteProvider {
    pool: Arc<SshPool>,
    state: Mutex<RemoteState>,
}

impl RemoteProvider {
    pub fn new(pool: Arc<SshPool>) -> Self {
        Self {
            pool,
            state: Mutex::new(RemoteState::default()),
        }
    }

    /// Directory commands and file paths resolve against: the selected
    /// repository if one is set, the workspace root otherwise.
    fn base_dir(&self) -> String {
        match &self.state.lock().current_repo {
            Some(repo) => format!("{}/{}", WORKSPACE_ROOT, repo),
            None => WORKSPACE_ROOT.to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<String, ToolError> {
        safe_relative_path(path)?;
        Ok(format!("{}/{}", self.base_dir(), path))
    }

    async fn run(&self, command: &str, input: Option<String>) -> Result<String, ToolError> {
        let guard = self.pool.acquire().await?;
        let scoped = format!("cd '{}' 2>/dev/null; {}", self.base_dir(), command);
        let output = self.pool.exec(&guard, &scoped, input).await?;
        Ok(output.render())
    }

    /// Run a command from the login directory, outside any repository.
    async fn run_at_root(&self, command: &str) -> Result<String, ToolError> {
        let guard = self.pool.acquire().await?;
        let output = self.pool.exec(&guard, command, None).await?;
        Ok(output.render())
    }

    async fn repositories(&self) -> Result<Vec<String>, ToolError> {
        let guard = self.pool.acquire().await?;
        let entries = self.pool.list_directory(&guard, WORKSPACE_ROOT).await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| entry.strip_suffix('/').map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect())
    }

    async fn git(&self, subcommand: &str) -> Result<Value, ToolError> {
        if self.state.lock().current_repo.is_none() {
            return Err(ToolError::Validation(
                "no repository selected; call switch_repository first".into(),
            ));
        }
        self.run(&format!("git {}", subcommand), None)
            .await
            .map(Value::String)
    }
}

#[async_trait]
impl ToolProvider for RemoteProvider {
    fn name(&self) -> &str {
        "remote"
    }

    fn description(&self) -> &str {
        "Remote command execution, file transfer, and repository management over SSH"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "remote",
                "execute_command",
                "Execute a shell command on the remote host. Returns exit code, stdout, and stderr.",
            )
            .with_category("network")
            .with_auth_required()
            .with_timeout(60)
            .with_param("command", ParamType::String, "Command to run", true)
            .with_param(
                "input_data",
                ParamType::String,
                "Text piped to the command's stdin",
                false,
            ),
            ToolDescriptor::new("remote", "write_file", "Write a file in the remote workspace")
                .with_category("file-ops")
                .with_auth_required()
                .with_param("filename", ParamType::String, "Relative file path", true)
                .with_param("content", ParamType::String, "File content", true),
            ToolDescriptor::new("remote", "read_file", "Read a file from the remote workspace")
                .with_category("file-ops")
                .with_auth_required()
                .with_param("filename", ParamType::String, "Relative file path", true),
            ToolDescriptor::new("remote", "list_directory", "List a remote workspace directory")
                .with_category("file-ops")
                .with_auth_required()
                .with_param("path", ParamType::String, "Relative directory path", false),
            ToolDescriptor::new("remote", "init_workspace", "Create the remote workspace directory")
                .with_category("file-ops")
                .with_auth_required(),
            ToolDescriptor::new("remote", "clone_repository", "Clone a git repository into the workspace")
                .with_category("network")
                .with_auth_required()
                .with_timeout(120)
                .with_param("url", ParamType::String, "Repository URL", true)
                .with_param("name", ParamType::String, "Directory name override", false),
            ToolDescriptor::new("remote", "list_repositories", "List repositories in the workspace")
                .with_category("file-ops")
                .with_auth_required(),
            ToolDescriptor::new("remote", "switch_repository", "Select the repository later commands run in")
                .with_category("file-ops")
                .with_auth_required()
                .with_param("name", ParamType::String, "Repository name", true),
            ToolDescriptor::new("remote", "get_current_repository", "Show the selected repository")
                .with_category("file-ops")
                .with_auth_required(),
            ToolDescriptor::new("remote", "git_status", "git status in the selected repository")
                .with_category("file-ops")
                .with_auth_required(),
            ToolDescriptor::new("remote", "git_add", "git add in the selected repository")
                .with_category("file-ops")
                .with_auth_required()
                .with_param("files", ParamType::String, "Paths to stage (default all)", false),
            ToolDescriptor::new("remote", "git_commit", "git commit in the selected repository")
                .with_category("file-ops")
                .with_auth_required()
                .with_param("message", ParamType::String, "Commit message", true),
            ToolDescriptor::new("remote", "git_log", "git log in the selected repository")
                .with_category("file-ops")
                .with_auth_required()
                .with_param("limit", ParamType::Integer, "Number of commits (default 10)", false),
            ToolDescriptor::new("remote", "git_pull", "git pull in the selected repository")
                .with_category("network")
                .with_auth_required()
                .with_timeout(120),
            ToolDescriptor::new("remote", "git_push", "git push from the selected repository")
                .with_category("network")
                .with_auth_required()
                .with_timeout(120),
        ]
    }

    async fn initialize(&self) -> Result<(), ToolError> {
        // The pool connects lazily; nothing to warm up here.
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ToolError> {
        self.pool.sweep();
        Ok(())
    }

    async fn call(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let str_arg = |key: &str| -> Result<&str, ToolError> {
            args.get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::Validation(format!("{} is required", key)))
        };

        match tool {
            "execute_command" => {
                let command = str_arg("command")?;
                let input = args
                    .get("input_data")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.run(command, input).await.map(Value::String)
            }
            "write_file" => {
                let filename = str_arg("filename")?;
                let content = str_arg("content")?;
                let remote_path = self.resolve(filename)?;
                if !allowed_write_extension(filename) {
                    return Err(ToolError::Security(format!(
                        "file extension not allowed for writes: {}",
                        filename
                    )));
                }
                let guard = self.pool.acquire().await?;
                if let Some(parent) = Path::new(&remote_path).parent() {
                    let parent = parent.to_string_lossy();
                    if !parent.is_empty() {
                        self.pool
                            .exec(&guard, &format!("mkdir -p '{}'", parent), None)
                            .await?;
                    }
                }
                let written = self.pool.write_file(&guard, &remote_path, content).await?;
                Ok(json!(format!(
                    "Wrote {} bytes to {} successfully",
                    written, filename
                )))
            }
            "read_file" => {
                let filename = str_arg("filename")?;
                let remote_path = self.resolve(filename)?;
                let guard = self.pool.acquire().await?;
                self.pool
                    .read_file(&guard, &remote_path)
                    .await
                    .map(Value::String)
            }
            "list_directory" => {
                let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
                let remote_path = if path == "." {
                    self.base_dir()
                } else {
                    self.resolve(path)?
                };
                let guard = self.pool.acquire().await?;
                let entries = self.pool.list_directory(&guard, &remote_path).await?;
                Ok(json!(format!(
                    "{} items\n{}",
                    entries.len(),
                    entries.join("\n")
                )))
            }
            "init_workspace" => {
                let output = self
                    .run_at_root(&format!("mkdir -p '{}' && echo created", WORKSPACE_ROOT))
                    .await?;
                info!("remote workspace initialized");
                Ok(Value::String(output))
            }
            "clone_repository" => {
                let url = str_arg("url")?;
                url::Url::parse(url)
                    .map_err(|e| ToolError::Validation(format!("invalid URL '{}': {}", url, e)))?;
                if url.contains('\'') {
                    return Err(ToolError::Security("URL contains forbidden quote".into()));
                }
                let name = match args.get("name").and_then(Value::as_str) {
                    Some(name) => name.to_string(),
                    None => url
                        .rsplit('/')
                        .next()
                        .unwrap_or_default()
                        .trim_end_matches(".git")
                        .to_string(),
                };
                sanitize_repo_name(&name)?;
                let output = self
                    .run_at_root(&format!(
                        "git clone '{}' '{}/{}'",
                        url, WORKSPACE_ROOT, name
                    ))
                    .await?;
                self.state.lock().current_repo = Some(name.clone());
                Ok(json!(format!("Cloned into {}\n{}", name, output)))
            }
            "list_repositories" => {
                let repos = self.repositories().await?;
                Ok(json!(format!(
                    "{} items\n{}",
                    repos.len(),
                    repos.join("\n")
                )))
            }
            "switch_repository" => {
                let name = str_arg("name")?;
                sanitize_repo_name(name)?;
                let repos = self.repositories().await?;
                if !repos.iter().any(|r| r == name) {
                    return Err(ToolError::Execution(format!(
                        "repository '{}' not found in workspace (have: {})",
                        name,
                        repos.join(", ")
                    )));
                }
                self.state.lock().current_repo = Some(name.to_string());
                Ok(json!(format!("Switched to repository '{}'", name)))
            }
            "get_current_repository" => {
                let current = self.state.lock().current_repo.clone();
                Ok(json!(current.unwrap_or_else(|| "none selected".to_string())))
            }
            "git_status" => self.git("status --short --branch").await,
            "git_add" => {
                let files = args.get("files").and_then(Value::as_str).unwrap_or(".");
                safe_relative_path(files)?;
                self.git(&format!("add '{}'", files)).await
            }
            "git_commit" => {
                let message = str_arg("message")?;
                let escaped = message.replace('\'', "'\\''");
                self.git(&format!("commit -m '{}'", escaped)).await
            }
            "git_log" => {
                let limit = args
                    .get("limit")
                    .and_then(Value::as_u64)
                    .unwrap_or(10)
                    .clamp(1, 100);
                self.git(&format!("log --oneline -n {}", limit)).await
            }
            "git_pull" => self.git("pull").await,
            "git_push" => self.git("push").await,
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        assert!(matches!(
            safe_relative_path("../etc/passwd"),
            Err(ToolError::Security(_))
        ));
        assert!(matches!(
            safe_relative_path("ok/../../escape"),
            Err(ToolError::Security(_))
        ));
    }

    #[test]
    fn absolute_paths_are_rejected() {
        assert!(matches!(
            safe_relative_path("/etc/passwd"),
            Err(ToolError::Security(_))
        ));
        assert!(matches!(
            safe_relative_path("~/secrets"),
            Err(ToolError::Security(_))
        ));
    }

    #[test]
    fn normal_paths_pass() {
        assert!(safe_relative_path("src/main.rs").is_ok());
        assert!(safe_relative_path("notes.txt").is_ok());
    }

    #[test]
    fn write_extension_whitelist() {
        assert!(allowed_write_extension("notes.txt"));
        assert!(allowed_write_extension("config.YAML"));
        assert!(allowed_write_extension("script.sh"));
        assert!(!allowed_write_extension("binary.exe"));
        assert!(!allowed_write_extension("library.so"));
        assert!(!allowed_write_extension("no_extension"));
    }

    fn offline_provider() -> RemoteProvider {
        let settings = crate::ssh::SshSettings {
            host: "example.test".into(),
            port: 22,
            user: "deploy".into(),
            key_path: std::path::PathBuf::from("/tmp/id_test"),
            connect_timeout: std::time::Duration::from_secs(1),
            idle_ttl: std::time::Duration::from_secs(300),
            max_entries: 5,
        };
        RemoteProvider::new(Arc::new(SshPool::new(settings)))
    }

    #[tokio::test]
    async fn write_file_rejects_traversal_before_any_io() {
        let provider = offline_provider();
        let mut args = Map::new();
        args.insert("filename".into(), json!("../etc/passwd"));
        args.insert("content".into(), json!("x"));

        // The path filter fires before the pool is ever touched; no
        // connection attempt happens.
        let error = provider.call("write_file", &args).await.unwrap_err();
        assert!(matches!(error, ToolError::Security(_)));
    }

    #[tokio::test]
    async fn write_file_rejects_disallowed_extension() {
        let provider = offline_provider();
        let mut args = Map::new();
        args.insert("filename".into(), json!("payload.exe"));
        args.insert("content".into(), json!("x"));

        let error = provider.call("write_file", &args).await.unwrap_err();
        assert!(matches!(error, ToolError::Security(_)));
    }

    #[tokio::test]
    async fn git_tools_require_a_selected_repository() {
        let provider = offline_provider();
        let error = provider.call("git_status", &Map::new()).await.unwrap_err();
        assert!(matches!(error, ToolError::Validation(_)));
        assert!(error.to_string().contains("switch_repository"));
    }

    #[test]
    fn repo_names_are_sanitized() {
        assert!(sanitize_repo_name("my-repo_1.2").is_ok());
        assert!(sanitize_repo_name("bad;rm").is_err());
        assert!(sanitize_repo_name(".hidden").is_err());
        assert!(sanitize_repo_name("").is_err());
    }
}
