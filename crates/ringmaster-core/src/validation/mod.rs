//! Output validator
//!
//! Classifies raw tool output against per-command-class rule tables.
//! Evaluation order: error patterns, then warning patterns, then expected
//! patterns, then unknown. Callers may layer an expectation overlay on top;
//! missing-expected or present-forbidden content promotes the outcome to an
//! error regardless of pattern matches, as does a parsed non-zero exit code.

pub mod rules;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use rules::rule_for;

/// Command classes with dedicated rule sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandClass {
    DirectoryCreation,
    DirectoryListing,
    FileCreation,
    FileReading,
    CommandExecution,
}

impl CommandClass {
    /// Infer the command class for a tool's output, consulting the command
    /// text for shell-style tools. `None` means the rule sets do not apply:
    /// calculator results, search payloads, and session bookkeeping are not
    /// command output and must not be classified against shell patterns.
    pub fn infer(tool_name: &str, command: Option<&str>) -> Option<Self> {
        let name = tool_name.to_lowercase();
        if name.ends_with("write_file") {
            return Some(CommandClass::FileCreation);
        }
        if name.ends_with("read_file") {
            return Some(CommandClass::FileReading);
        }
        if name.ends_with("list_directory") || name.ends_with("list_repositories") {
            return Some(CommandClass::DirectoryListing);
        }

        let runs_commands = name.ends_with("execute_command")
            || name.ends_with("install_package")
            || name.ends_with("init_workspace")
            || name.ends_with("clone_repository")
            || name.split('_').any(|part| part == "git");
        if !runs_commands {
            return None;
        }

        if let Some(command) = command {
            let trimmed = command.trim_start();
            if trimmed.starts_with("mkdir") {
                return Some(CommandClass::DirectoryCreation);
            }
            if trimmed.starts_with("ls") || trimmed.starts_with("dir") {
                return Some(CommandClass::DirectoryListing);
            }
            if trimmed.starts_with("cat") || trimmed.starts_with("head") || trimmed.starts_with("tail")
            {
                return Some(CommandClass::FileReading);
            }
        }
        Some(CommandClass::CommandExecution)
    }
}

/// Classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Unknown,
}

/// Result of one validation pass
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub severity: Severity,
    /// The pattern that decided the outcome, when one did
    pub matched_pattern: Option<String>,
    /// ±2 lines of output around the deciding match
    pub context: Option<String>,
    pub messages: Vec<String>,
}

impl ValidationReport {
    fn new(severity: Severity) -> Self {
        Self {
            severity,
            matched_pattern: None,
            context: None,
            messages: Vec::new(),
        }
    }
}

/// Caller-supplied expectation overlay
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub expected_name: Option<String>,
    pub expected_content: Option<String>,
    pub forbidden_content: Option<String>,
}

/// Pattern-based output classifier
#[derive(Default)]
pub struct OutputValidator;

impl OutputValidator {
    pub fn new() -> Self {
        Self
    }

    /// Classify `output` under the rule set for `class`.
    pub fn validate(
        &self,
        class: CommandClass,
        output: &str,
        context: Option<&ValidationContext>,
    ) -> ValidationReport {
        let rule = rule_for(class);
        let lower = output.to_lowercase();

        // Overlay expectations override pattern outcomes entirely.
        if let Some(ctx) = context {
            if let Some(expected) = &ctx.expected_name {
                if !output.contains(expected.as_str()) {
                    let mut report = ValidationReport::new(Severity::Error);
                    report
                        .messages
                        .push(format!("Expected name '{}' not present in output", expected));
                    return report;
                }
            }
            if let Some(expected) = &ctx.expected_content {
                if !output.contains(expected.as_str()) {
                    let mut report = ValidationReport::new(Severity::Error);
                    report
                        .messages
                        .push(format!("Expected content '{}' not present in output", expected));
                    return report;
                }
            }
            if let Some(forbidden) = &ctx.forbidden_content {
                if output.contains(forbidden.as_str()) {
                    let mut report = ValidationReport::new(Severity::Error);
                    report
                        .messages
                        .push(format!("Forbidden content '{}' present in output", forbidden));
                    return report;
                }
            }
        }

        if let Some((pattern, position)) = first_match(rule.error_patterns, &lower) {
            let mut report = ValidationReport::new(Severity::Error);
            report.matched_pattern = Some(pattern.to_string());
            report.context = Some(context_snippet(output, position));
            report
                .messages
                .push(format!("Error pattern matched: {}", pattern));
            return report;
        }

        if let Some(code) = parse_exit_code(output) {
            if code != 0 {
                let mut report = ValidationReport::new(Severity::Error);
                report.messages.push(format!("Non-zero exit code: {}", code));
                return report;
            }
        }

        for forbidden in rule.forbidden_elements {
            if lower.contains(forbidden) {
                let mut report = ValidationReport::new(Severity::Error);
                report
                    .messages
                    .push(format!("Forbidden element present: {}", forbidden));
                return report;
            }
        }

        if let Some((pattern, position)) = first_match(rule.warning_patterns, &lower) {
            let mut report = ValidationReport::new(Severity::Warning);
            report.matched_pattern = Some(pattern.to_string());
            report.context = Some(context_snippet(output, position));
            report
                .messages
                .push(format!("Warning pattern matched: {}", pattern));
            return report;
        }

        for required in rule.required_elements {
            if !lower.contains(required) {
                let mut report = ValidationReport::new(Severity::Error);
                report
                    .messages
                    .push(format!("Required element missing: {}", required));
                return report;
            }
        }

        if first_match(rule.expected_patterns, &lower).is_some() {
            return ValidationReport::new(Severity::Success);
        }

        ValidationReport::new(Severity::Unknown)
    }
}

/// First pattern in `patterns` that matches `text`, with its byte position.
fn first_match(patterns: &[&'static str], text: &str) -> Option<(&'static str, usize)> {
    for pattern in patterns {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .ok()?;
        if let Some(found) = regex.find(text) {
            return Some((pattern, found.start()));
        }
    }
    None
}

/// ±2 lines of output surrounding a byte position.
fn context_snippet(output: &str, position: usize) -> String {
    // The position comes from a lowercased copy whose byte length can
    // differ from the original.
    let prefix = output.get(..position.min(output.len())).unwrap_or(output);
    let line_index = prefix.bytes().filter(|b| *b == b'\n').count();
    let lines: Vec<&str> = output.lines().collect();
    let start = line_index.saturating_sub(2);
    let end = (line_index + 3).min(lines.len());
    lines[start..end].join("\n")
}

/// Pull an `exit code: N` marker out of the output.
fn parse_exit_code(output: &str) -> Option<i64> {
    let regex = RegexBuilder::new(r"exit code[:=]?\s*(-?\d+)")
        .case_insensitive(true)
        .build()
        .ok()?;
    regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_pattern_wins() {
        let validator = OutputValidator::new();
        let report = validator.validate(
            CommandClass::FileReading,
            "cat: notes.txt: No such file or directory",
            None,
        );
        assert_eq!(report.severity, Severity::Error);
        assert!(report.matched_pattern.is_some());
    }

    #[test]
    fn warning_before_expected() {
        let validator = OutputValidator::new();
        let report = validator.validate(
            CommandClass::DirectoryCreation,
            "directory already exists, created nothing",
            None,
        );
        assert_eq!(report.severity, Severity::Warning);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let validator = OutputValidator::new();
        let report = validator.validate(CommandClass::FileReading, "just file contents", None);
        assert_eq!(report.severity, Severity::Unknown);
    }

    #[test]
    fn nonzero_exit_code_is_error() {
        let validator = OutputValidator::new();
        let report = validator.validate(
            CommandClass::CommandExecution,
            "Exit code: 2\nSTDOUT:\nSTDERR:\nsomething odd",
            None,
        );
        assert_eq!(report.severity, Severity::Error);
    }

    #[test]
    fn zero_exit_code_is_success() {
        let validator = OutputValidator::new();
        let report = validator.validate(
            CommandClass::CommandExecution,
            "Exit code: 0\nSTDOUT:\nok\nSTDERR:\n",
            None,
        );
        assert_eq!(report.severity, Severity::Success);
    }

    #[test]
    fn overlay_promotes_to_error() {
        let validator = OutputValidator::new();
        let ctx = ValidationContext {
            expected_content: Some("report.csv".to_string()),
            ..Default::default()
        };
        let report = validator.validate(
            CommandClass::DirectoryListing,
            "total 0\nnotes.txt",
            Some(&ctx),
        );
        assert_eq!(report.severity, Severity::Error);

        let ctx = ValidationContext {
            forbidden_content: Some("secrets.env".to_string()),
            ..Default::default()
        };
        let report = validator.validate(
            CommandClass::DirectoryListing,
            "total 1\nsecrets.env",
            Some(&ctx),
        );
        assert_eq!(report.severity, Severity::Error);
    }

    #[test]
    fn context_snippet_spans_two_lines_each_side() {
        let output = "line one\nline two\nPermission denied here\nline four\nline five\nline six";
        let validator = OutputValidator::new();
        let report = validator.validate(CommandClass::FileReading, output, None);
        let context = report.context.unwrap();
        assert!(context.contains("line one"));
        assert!(context.contains("line five"));
        assert!(!context.contains("line six"));
    }

    #[test]
    fn class_inference() {
        assert_eq!(
            CommandClass::infer("remote_write_file", None),
            Some(CommandClass::FileCreation)
        );
        assert_eq!(
            CommandClass::infer("remote_execute_command", Some("mkdir build")),
            Some(CommandClass::DirectoryCreation)
        );
        assert_eq!(
            CommandClass::infer("remote_execute_command", Some("ls -la")),
            Some(CommandClass::DirectoryListing)
        );
        assert_eq!(
            CommandClass::infer("dev_git_status", None),
            Some(CommandClass::CommandExecution)
        );
    }

    #[test]
    fn non_command_tools_have_no_class() {
        assert_eq!(CommandClass::infer("calc_calculate", None), None);
        assert_eq!(CommandClass::infer("websearch_search_web", None), None);
        assert_eq!(CommandClass::infer("monitor_create_todos", None), None);
        assert_eq!(CommandClass::infer("mathpack_hypotenuse", None), None);
    }
}
