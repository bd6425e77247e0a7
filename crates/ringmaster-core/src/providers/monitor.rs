//! Monitoring provider
//!
//! Owns the in-memory session store: todo lists grouped under agent
//! sessions, a current-session pointer, and per-session task counters.
//! Nothing here survives process exit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ToolError;
use crate::registry::{ParamType, ToolDescriptor, ToolProvider};

/// Todo lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TodoStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TodoStatus::Pending),
            "in_progress" => Some(TodoStatus::InProgress),
            "completed" => Some(TodoStatus::Completed),
            "failed" => Some(TodoStatus::Failed),
            "cancelled" => Some(TodoStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
            TodoStatus::Failed => "failed",
            TodoStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TodoStatus::Completed | TodoStatus::Failed | TodoStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TodoStatus::Pending | TodoStatus::InProgress)
    }
}

/// One tracked work item
#[derive(Debug, Clone, Serialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    #[serde(rename = "activeForm")]
    pub active_form: String,
    pub status: TodoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// A logical run: ordered todos plus aggregate counters
#[derive(Debug, Clone, Serialize)]
pub struct AgentSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub todos: Vec<TodoItem>,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    next_todo_id: u64,
}

impl AgentSession {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: now,
            todos: Vec::new(),
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            next_todo_id: 1,
        }
    }

    fn add_todo(&mut self, content: String, active_form: String, status: TodoStatus) -> &TodoItem {
        let now = Utc::now();
        let id = format!("todo_{}", self.next_todo_id);
        self.next_todo_id += 1;
        self.total_tasks += 1;
        self.todos.push(TodoItem {
            id,
            content,
            active_form,
            status,
            created_at: now,
            updated_at: now,
            notes: None,
            duration_secs: None,
        });
        self.last_activity = now;
        self.todos.last().expect("just pushed")
    }
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<String, AgentSession>,
    current: Option<String>,
}

/// Provider owning the session map
#[derive(Default)]
pub struct MonitoringProvider {
    store: Mutex<StoreInner>,
}

impl MonitoringProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_session(&self, name: Option<&str>) -> String {
        let id = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("session_{}", &Uuid::new_v4().to_string()[..8]),
        };
        let mut store = self.store.lock();
        store
            .sessions
            .entry(id.clone())
            .or_insert_with(|| AgentSession::new(id.clone()));
        store.current = Some(id.clone());
        id
    }

    /// The current session id, creating one on first use.
    fn ensure_current(&self) -> String {
        {
            let store = self.store.lock();
            if let Some(current) = &store.current {
                return current.clone();
            }
        }
        self.create_session(None)
    }

    /// Snapshot of a session for assertions and HTTP callers.
    pub fn session_snapshot(&self, id: &str) -> Option<AgentSession> {
        self.store.lock().sessions.get(id).cloned()
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.store.lock().current.clone()
    }
}

/// Accepted shapes for one todo entry in create_todos
fn parse_todo_entry(entry: &Value) -> Result<(String, String, TodoStatus, Option<String>), ToolError> {
    match entry {
        Value::String(content) => Ok((
            content.clone(),
            format!("Working on: {}", content),
            TodoStatus::Pending,
            None,
        )),
        Value::Object(fields) => {
            let content = fields
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::Validation("todo object requires 'content'".into()))?
                .to_string();
            let active_form = fields
                .get("activeForm")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Working on: {}", content));
            let (status, warning) = match fields.get("status").and_then(Value::as_str) {
                None => (TodoStatus::Pending, None),
                Some(raw) => match TodoStatus::parse(raw) {
                    Some(status) => (status, None),
                    None => (
                        TodoStatus::Pending,
                        Some(format!("unknown status '{}' downgraded to pending", raw)),
                    ),
                },
            };
            Ok((content, active_form, status, warning))
        }
        other => Err(ToolError::Validation(format!(
            "todo entries must be strings or objects, got {}",
            other
        ))),
    }
}

#[async_trait]
impl ToolProvider for MonitoringProvider {
    fn name(&self) -> &str {
        "monitor"
    }

    fn description(&self) -> &str {
        "Session bookkeeping: todo lists, status transitions, and progress summaries"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("monitor", "create_session", "Start a new agent session")
                .with_category("utilities")
                .with_param("name", ParamType::String, "Optional session name", false),
            ToolDescriptor::new(
                "monitor",
                "create_todos",
                "Create todo items in the current session. Accepts plain strings or \
                 objects with content/status/activeForm.",
            )
            .with_category("utilities")
            .with_param("todos", ParamType::Array, "Todo list entries", true),
            ToolDescriptor::new("monitor", "update_todo_status", "Update one todo's status")
                .with_category("utilities")
                .with_param("todo_id", ParamType::String, "Todo id, e.g. todo_1", true)
                .with_param(
                    "status",
                    ParamType::String,
                    "pending, in_progress, completed, failed, or cancelled",
                    true,
                )
                .with_param("notes", ParamType::String, "Optional progress notes", false),
            ToolDescriptor::new("monitor", "get_current_todos", "List todos in the current session")
                .with_category("utilities")
                .with_param(
                    "include_completed",
                    ParamType::Boolean,
                    "Include terminal items (default false)",
                    false,
                ),
            ToolDescriptor::new("monitor", "clear_todos", "Remove all todos from the current session")
                .with_category("utilities"),
            ToolDescriptor::new("monitor", "get_progress_summary", "Summarize session progress")
                .with_category("utilities"),
        ]
    }

    async fn call(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        match tool {
            "create_session" => {
                let name = args.get("name").and_then(Value::as_str);
                let id = self.create_session(name);
                Ok(json!(format!("Created session '{}'", id)))
            }
            "create_todos" => {
                let entries = args
                    .get("todos")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ToolError::Validation("todos array is required".into()))?;
                if entries.is_empty() {
                    return Err(ToolError::Validation("todos must not be empty".into()));
                }

                let mut parsed = Vec::with_capacity(entries.len());
                let mut warnings = Vec::new();
                for entry in entries {
                    let (content, active_form, status, warning) = parse_todo_entry(entry)?;
                    if let Some(warning) = warning {
                        warnings.push(warning);
                    }
                    parsed.push((content, active_form, status));
                }

                let session_id = self.ensure_current();
                let mut store = self.store.lock();
                let session = store
                    .sessions
                    .get_mut(&session_id)
                    .ok_or_else(|| ToolError::Execution("current session vanished".into()))?;
                let mut created = Vec::new();
                for (content, active_form, status) in parsed {
                    created.push(session.add_todo(content, active_form, status).id.clone());
                }

                Ok(json!({
                    "session": session_id,
                    "created": created,
                    "count": created.len(),
                    "warnings": warnings,
                }))
            }
            "update_todo_status" => {
                let todo_id = args
                    .get("todo_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("todo_id is required".into()))?;
                let status_raw = args
                    .get("status")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("status is required".into()))?;
                let status = TodoStatus::parse(status_raw).ok_or_else(|| {
                    ToolError::Validation(format!("unknown status '{}'", status_raw))
                })?;
                let notes = args.get("notes").and_then(Value::as_str).map(str::to_string);

                let session_id = self.ensure_current();
                let mut store = self.store.lock();
                let session = store
                    .sessions
                    .get_mut(&session_id)
                    .ok_or_else(|| ToolError::Execution("current session vanished".into()))?;

                let Some(todo) = session.todos.iter_mut().find(|t| t.id == todo_id) else {
                    // A miss is not an error: report it clearly and move on.
                    return Ok(json!(format!(
                        "No todo with id '{}' in session '{}'",
                        todo_id, session_id
                    )));
                };

                let was_terminal = todo.status.is_terminal();
                let now = Utc::now();
                todo.status = status;
                todo.updated_at = now;
                if let Some(notes) = notes {
                    todo.notes = Some(notes);
                }
                if status.is_terminal() {
                    todo.duration_secs =
                        Some((now - todo.created_at).num_milliseconds() as f64 / 1000.0);
                }

                if !was_terminal {
                    match status {
                        TodoStatus::Completed => session.completed_tasks += 1,
                        TodoStatus::Failed => session.failed_tasks += 1,
                        _ => {}
                    }
                }
                session.last_activity = now;

                Ok(json!(format!(
                    "Updated {} to {}",
                    todo_id,
                    status.as_str()
                )))
            }
            "get_current_todos" => {
                let include_completed = args
                    .get("include_completed")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let session_id = self.ensure_current();
                let store = self.store.lock();
                let session = store
                    .sessions
                    .get(&session_id)
                    .ok_or_else(|| ToolError::Execution("current session vanished".into()))?;
                let todos: Vec<&TodoItem> = session
                    .todos
                    .iter()
                    .filter(|t| include_completed || t.status.is_active())
                    .collect();
                Ok(json!({
                    "session": session_id,
                    "count": todos.len(),
                    "todos": todos,
                }))
            }
            "clear_todos" => {
                let session_id = self.ensure_current();
                let mut store = self.store.lock();
                let session = store
                    .sessions
                    .get_mut(&session_id)
                    .ok_or_else(|| ToolError::Execution("current session vanished".into()))?;
                let cleared = session.todos.len();
                session.todos.clear();
                session.last_activity = Utc::now();
                Ok(json!(format!(
                    "Cleared {} todo(s) from session '{}'",
                    cleared, session_id
                )))
            }
            "get_progress_summary" => {
                let session_id = self.ensure_current();
                let store = self.store.lock();
                let session = store
                    .sessions
                    .get(&session_id)
                    .ok_or_else(|| ToolError::Execution("current session vanished".into()))?;

                let count =
                    |status: TodoStatus| session.todos.iter().filter(|t| t.status == status).count();
                let next_up: Vec<String> = session
                    .todos
                    .iter()
                    .filter(|t| t.status.is_active())
                    .take(3)
                    .map(|t| format!("{} ({})", t.content, t.status.as_str()))
                    .collect();
                let duration_secs =
                    (Utc::now() - session.created_at).num_milliseconds() as f64 / 1000.0;

                Ok(json!({
                    "session": session_id,
                    "total": session.todos.len(),
                    "pending": count(TodoStatus::Pending),
                    "in_progress": count(TodoStatus::InProgress),
                    "completed": count(TodoStatus::Completed),
                    "failed": count(TodoStatus::Failed),
                    "cancelled": count(TodoStatus::Cancelled),
                    "session_duration_secs": duration_secs,
                    "next_up": next_up,
                    "counters": {
                        "total_tasks": session.total_tasks,
                        "completed_tasks": session.completed_tasks,
                        "failed_tasks": session.failed_tasks,
                    },
                }))
            }
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn todos_from_strings_get_sequential_ids() {
        let provider = MonitoringProvider::new();
        let result = provider
            .call("create_todos", &args(&[("todos", json!(["A", "B", "C"]))]))
            .await
            .unwrap();
        assert_eq!(result["created"], json!(["todo_1", "todo_2", "todo_3"]));

        let listed = provider
            .call("get_current_todos", &Map::new())
            .await
            .unwrap();
        assert_eq!(listed["count"], 3);
        assert_eq!(listed["todos"][0]["content"], "A");
        assert_eq!(listed["todos"][0]["status"], "pending");
    }

    #[tokio::test]
    async fn unknown_status_degrades_to_pending() {
        let provider = MonitoringProvider::new();
        let result = provider
            .call(
                "create_todos",
                &args(&[(
                    "todos",
                    json!([{"content": "X", "status": "sideways", "activeForm": "Doing X"}]),
                )]),
            )
            .await
            .unwrap();
        assert_eq!(result["warnings"].as_array().unwrap().len(), 1);

        let listed = provider
            .call("get_current_todos", &Map::new())
            .await
            .unwrap();
        assert_eq!(listed["todos"][0]["status"], "pending");
    }

    #[tokio::test]
    async fn update_miss_is_clear_message() {
        let provider = MonitoringProvider::new();
        provider
            .call("create_todos", &args(&[("todos", json!(["A"]))]))
            .await
            .unwrap();
        let result = provider
            .call(
                "update_todo_status",
                &args(&[("todo_id", json!("todo_99")), ("status", json!("completed"))]),
            )
            .await
            .unwrap();
        assert!(result.as_str().unwrap().contains("No todo with id 'todo_99'"));
    }

    #[tokio::test]
    async fn terminal_transitions_update_counters() {
        let provider = MonitoringProvider::new();
        provider
            .call("create_todos", &args(&[("todos", json!(["A", "B"]))]))
            .await
            .unwrap();
        provider
            .call(
                "update_todo_status",
                &args(&[("todo_id", json!("todo_1")), ("status", json!("completed"))]),
            )
            .await
            .unwrap();
        provider
            .call(
                "update_todo_status",
                &args(&[("todo_id", json!("todo_2")), ("status", json!("failed"))]),
            )
            .await
            .unwrap();

        let summary = provider
            .call("get_progress_summary", &Map::new())
            .await
            .unwrap();
        assert_eq!(summary["counters"]["total_tasks"], 2);
        assert_eq!(summary["counters"]["completed_tasks"], 1);
        assert_eq!(summary["counters"]["failed_tasks"], 1);
        assert_eq!(summary["next_up"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn clear_todos_empties_session() {
        let provider = MonitoringProvider::new();
        provider
            .call("create_todos", &args(&[("todos", json!(["A"]))]))
            .await
            .unwrap();
        provider.call("clear_todos", &Map::new()).await.unwrap();
        let listed = provider
            .call(
                "get_current_todos",
                &args(&[("include_completed", json!(true))]),
            )
            .await
            .unwrap();
        assert_eq!(listed["count"], 0);
    }

    #[tokio::test]
    async fn named_session_becomes_current() {
        let provider = MonitoringProvider::new();
        provider
            .call("create_session", &args(&[("name", json!("deploy-run"))]))
            .await
            .unwrap();
        assert_eq!(provider.current_session_id().unwrap(), "deploy-run");
    }
}
