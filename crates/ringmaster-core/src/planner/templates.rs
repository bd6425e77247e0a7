//! Planner rule tables and step templates
//!
//! Pure data. The detection heuristics and the per-category step programs
//! live here so tests can enumerate them; the planner only walks these
//! tables.

use serde_json::json;

use super::TaskCategory;

/// Single keywords that mark a request as complex
pub const COMPLEXITY_KEYWORDS: &[&str] = &[
    "deploy",
    "setup",
    "set up",
    "configure",
    "install",
    "build",
    "monitor",
    "pipeline",
    "environment",
    "process",
    "analyze",
    "migrate",
    "provision",
    "automate",
    "orchestrate",
];

/// Ordering words; two of these plus a project keyword mark complexity
pub const SEQUENCE_INDICATORS: &[&str] = &[
    "first", "then", "after", "next", "finally", "step", "before", "once", "followed by",
];

/// Words that signal project-level work
pub const PROJECT_KEYWORDS: &[&str] = &[
    "project",
    "application",
    "app",
    "service",
    "server",
    "repository",
    "website",
    "system",
    "database",
    "pipeline",
    "infrastructure",
];

/// Regex tables per category, checked in declaration order
pub const CATEGORY_PATTERNS: &[(TaskCategory, &[&str])] = &[
    (
        TaskCategory::Deployment,
        &[
            r"\bdeploy(ment|ing)?\b",
            r"\brelease\b",
            r"\broll(out| out)\b",
            r"\bship\b.*\b(app|service|application)\b",
        ],
    ),
    (
        TaskCategory::Development,
        &[
            r"\b(write|create|implement|refactor|fix)\b.*\b(code|function|module|feature|test)\b",
            r"\bcommit\b",
            r"\brepositor(y|ies)\b",
            r"\bdebug\b",
        ],
    ),
    (
        TaskCategory::Monitoring,
        &[
            r"\bmonitor(ing)?\b",
            r"\bhealth check\b",
            r"\b(track|watch)\b.*\b(progress|status)\b",
            r"\bmetrics\b",
        ],
    ),
    (
        TaskCategory::DataProcessing,
        &[
            r"\b(process|transform|parse|aggregate)\b.*\bdata\b",
            r"\bcsv\b",
            r"\bpipeline\b",
            r"\banaly(ze|sis)\b",
        ],
    ),
    (
        TaskCategory::SystemAdministration,
        &[
            r"\b(disk|memory|cpu) (usage|space)\b",
            r"\bprovision\b",
            r"\b(set ?up|configure)\b.*\b(server|environment|host)\b",
            r"\binstall\b.*\b(package|dependenc)",
        ],
    ),
];

/// One templated step: description, target tool, pre-bound parameters
pub struct StepTemplate {
    pub description: &'static str,
    pub tool: &'static str,
    pub params: fn(&str) -> serde_json::Value,
}

fn todos_for(category: TaskCategory) -> &'static [&'static str] {
    match category {
        TaskCategory::Deployment => &[
            "Prepare the deployment workspace",
            "Verify the target environment",
            "Stage application files",
            "Confirm deployment status",
        ],
        TaskCategory::Development => &[
            "Review working tree status",
            "Locate the relevant files",
            "Apply and verify changes",
        ],
        TaskCategory::Monitoring => &[
            "Record baseline system state",
            "Collect progress snapshots",
            "Summarize findings",
        ],
        TaskCategory::DataProcessing => &[
            "Locate the input data",
            "Run the transformation",
            "Validate the output",
        ],
        TaskCategory::SystemAdministration => &[
            "Inspect system resources",
            "Apply configuration changes",
            "Verify the system state",
        ],
    }
}

/// The step program for a category. The first step always seeds the
/// monitoring provider with the plan's own todo list.
pub fn steps_for(category: TaskCategory) -> Vec<StepTemplate> {
    let mut steps = vec![StepTemplate {
        description: "Seed the session todo list with the plan",
        tool: "monitor_create_todos",
        params: match category {
            TaskCategory::Deployment => |_q| json!({ "todos": todos_for(TaskCategory::Deployment) }),
            TaskCategory::Development => {
                |_q| json!({ "todos": todos_for(TaskCategory::Development) })
            }
            TaskCategory::Monitoring => |_q| json!({ "todos": todos_for(TaskCategory::Monitoring) }),
            TaskCategory::DataProcessing => {
                |_q| json!({ "todos": todos_for(TaskCategory::DataProcessing) })
            }
            TaskCategory::SystemAdministration => {
                |_q| json!({ "todos": todos_for(TaskCategory::SystemAdministration) })
            }
        },
    }];

    match category {
        TaskCategory::Deployment => {
            steps.push(StepTemplate {
                description: "Initialize the remote workspace",
                tool: "remote_init_workspace",
                params: |_q| json!({}),
            });
            steps.push(StepTemplate {
                description: "Record the target environment",
                tool: "remote_execute_command",
                params: |_q| json!({ "command": "uname -a && df -h ." }),
            });
            steps.push(StepTemplate {
                description: "Check the local working tree",
                tool: "dev_git_status",
                params: |_q| json!({}),
            });
        }
        TaskCategory::Development => {
            steps.push(StepTemplate {
                description: "Check the working tree",
                tool: "dev_git_status",
                params: |_q| json!({}),
            });
            steps.push(StepTemplate {
                description: "List project documentation",
                tool: "dev_find_files",
                params: |_q| json!({ "pattern": "*.md" }),
            });
        }
        TaskCategory::Monitoring => {
            steps.push(StepTemplate {
                description: "Capture remote system state",
                tool: "remote_execute_command",
                params: |_q| json!({ "command": "uptime && df -h" }),
            });
            steps.push(StepTemplate {
                description: "List active work items",
                tool: "monitor_get_current_todos",
                params: |_q| json!({}),
            });
        }
        TaskCategory::DataProcessing => {
            steps.push(StepTemplate {
                description: "Locate data files",
                tool: "dev_find_files",
                params: |_q| json!({ "pattern": "*.csv" }),
            });
            steps.push(StepTemplate {
                description: "Scan for data references",
                tool: "dev_search_in_files",
                params: |query| json!({ "pattern": first_token(query) }),
            });
        }
        TaskCategory::SystemAdministration => {
            steps.push(StepTemplate {
                description: "Inspect remote resources",
                tool: "remote_execute_command",
                params: |_q| json!({ "command": "df -h && free -m" }),
            });
            steps.push(StepTemplate {
                description: "Check the local working tree",
                tool: "dev_git_status",
                params: |_q| json!({}),
            });
        }
    }

    steps.push(StepTemplate {
        description: "Summarize plan progress",
        tool: "monitor_get_progress_summary",
        params: |_q| json!({}),
    });
    steps
}

/// A safe regex token derived from the query for search steps.
fn first_token(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .find(|w| w.len() > 3)
        .unwrap_or_else(|| "data".to_string())
}
