//! Validation rule tables
//!
//! Pure data: one rule set per command class. Keeping the patterns here
//! rather than inline in the classifier lets tests enumerate them.

use super::CommandClass;

/// Pattern lists applied to one command class
pub struct ValidationRule {
    pub name: &'static str,
    pub expected_patterns: &'static [&'static str],
    pub error_patterns: &'static [&'static str],
    pub warning_patterns: &'static [&'static str],
    pub required_elements: &'static [&'static str],
    pub forbidden_elements: &'static [&'static str],
}

pub const DIRECTORY_CREATION: ValidationRule = ValidationRule {
    name: "directory_creation",
    expected_patterns: &["created", "directory", "success"],
    error_patterns: &[
        "permission denied",
        "file exists",
        "no such file",
        "cannot create",
        "read-only file system",
    ],
    warning_patterns: &["already exists"],
    required_elements: &[],
    forbidden_elements: &["error", "failed"],
};

pub const DIRECTORY_LISTING: ValidationRule = ValidationRule {
    name: "directory_listing",
    expected_patterns: &["total", "drwx", "-rw-", "\\d+ items?"],
    error_patterns: &[
        "no such file or directory",
        "permission denied",
        "not a directory",
    ],
    warning_patterns: &["empty directory"],
    required_elements: &[],
    forbidden_elements: &[],
};

pub const FILE_CREATION: ValidationRule = ValidationRule {
    name: "file_creation",
    expected_patterns: &["written", "created", "bytes", "success"],
    error_patterns: &[
        "permission denied",
        "no space left",
        "read-only file system",
        "is a directory",
        "disk quota exceeded",
    ],
    warning_patterns: &["overwr(ote|iting)", "truncated"],
    required_elements: &[],
    forbidden_elements: &[],
};

pub const FILE_READING: ValidationRule = ValidationRule {
    name: "file_reading",
    expected_patterns: &[],
    error_patterns: &[
        "no such file or directory",
        "permission denied",
        "is a directory",
        "input/output error",
    ],
    warning_patterns: &["binary file", "file is empty"],
    required_elements: &[],
    forbidden_elements: &[],
};

pub const COMMAND_EXECUTION: ValidationRule = ValidationRule {
    name: "command_execution",
    expected_patterns: &["exit code: 0"],
    error_patterns: &[
        "command not found",
        "segmentation fault",
        "traceback \\(most recent call last\\)",
        "fatal:",
        "panicked at",
        "killed",
    ],
    warning_patterns: &["warning[:!]", "deprecated"],
    required_elements: &[],
    forbidden_elements: &[],
};

/// Resolve the rule table for a command class.
pub fn rule_for(class: CommandClass) -> &'static ValidationRule {
    match class {
        CommandClass::DirectoryCreation => &DIRECTORY_CREATION,
        CommandClass::DirectoryListing => &DIRECTORY_LISTING,
        CommandClass::FileCreation => &FILE_CREATION,
        CommandClass::FileReading => &FILE_READING,
        CommandClass::CommandExecution => &COMMAND_EXECUTION,
    }
}
