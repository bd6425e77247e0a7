//! Task planner
//!
//! Detects multi-step requests with keyword and regex tables, classifies
//! them into a category, and expands the category's step template into an
//! ordered plan whose steps target registered tools. Planning is fully
//! deterministic; no model call is involved.

pub mod templates;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::dispatch::ToolResult;
use crate::registry::ToolRegistry;

/// Categories the planner can classify a request into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Deployment,
    Development,
    Monitoring,
    DataProcessing,
    SystemAdministration,
}

/// Plan lifecycle: pending → in_progress → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One step of a plan, bound to a registry tool
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub tool: String,
    pub params: Map<String, Value>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    pub dependencies: Vec<String>,
}

/// An ordered step program for one request
#[derive(Debug, Clone, Serialize)]
pub struct TaskPlan {
    pub id: String,
    pub description: String,
    pub category: TaskCategory,
    pub steps: Vec<PlanStep>,
    pub status: PlanStatus,
    pub current_step: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskPlan {
    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.completed).count()
    }
}

/// Deterministic complexity detection and template expansion
#[derive(Default)]
pub struct TaskPlanner;

impl TaskPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Whether a request needs a step program rather than a single call.
    pub fn is_complex(&self, query: &str) -> bool {
        let lower = query.to_lowercase();

        if templates::COMPLEXITY_KEYWORDS
            .iter()
            .any(|k| lower.contains(k))
        {
            return true;
        }

        if self.classify_by_patterns(&lower).is_some() {
            return true;
        }

        let sequence_hits = templates::SEQUENCE_INDICATORS
            .iter()
            .filter(|k| lower.contains(*k))
            .count();
        let has_project_word = templates::PROJECT_KEYWORDS.iter().any(|k| lower.contains(k));
        if sequence_hits >= 2 && has_project_word {
            return true;
        }

        let numbered = Regex::new(r"(?m)^\s*\d+[.)]\s+\S").expect("static regex");
        if numbered.find_iter(query).count() >= 3 {
            return true;
        }

        false
    }

    fn classify_by_patterns(&self, lower: &str) -> Option<TaskCategory> {
        for (category, patterns) in templates::CATEGORY_PATTERNS {
            for pattern in *patterns {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("static regex");
                if regex.is_match(lower) {
                    return Some(*category);
                }
            }
        }
        None
    }

    /// Category for a complex query, with a keyword fallback.
    pub fn classify(&self, query: &str) -> TaskCategory {
        let lower = query.to_lowercase();
        if let Some(category) = self.classify_by_patterns(&lower) {
            return category;
        }
        if lower.contains("deploy") || lower.contains("release") {
            TaskCategory::Deployment
        } else if lower.contains("monitor") || lower.contains("status") {
            TaskCategory::Monitoring
        } else if lower.contains("data") || lower.contains("analyze") {
            TaskCategory::DataProcessing
        } else if lower.contains("install") || lower.contains("configure") {
            TaskCategory::SystemAdministration
        } else {
            TaskCategory::Development
        }
    }

    /// Expand the category template into a plan. Steps whose target tool is
    /// not registered are dropped; `None` when the request is not complex.
    pub fn build_plan(&self, query: &str, registry: &Arc<ToolRegistry>) -> Option<TaskPlan> {
        if !self.is_complex(query) {
            return None;
        }
        let category = self.classify(query);
        debug!(?category, query, "building task plan");

        let mut steps = Vec::new();
        let mut previous_id: Option<String> = None;
        for template in templates::steps_for(category) {
            if registry.lookup(template.tool).is_none() {
                debug!(tool = template.tool, "skipping step, tool not registered");
                continue;
            }
            let id = format!("step_{}", steps.len() + 1);
            let params = match (template.params)(query) {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            steps.push(PlanStep {
                id: id.clone(),
                description: template.description.to_string(),
                tool: template.tool.to_string(),
                params,
                completed: false,
                result: None,
                dependencies: previous_id.clone().into_iter().collect(),
            });
            previous_id = Some(id);
        }

        if steps.is_empty() {
            return None;
        }

        Some(TaskPlan {
            id: Uuid::new_v4().to_string(),
            description: query.to_string(),
            category,
            steps,
            status: PlanStatus::Pending,
            current_step: 0,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        })
    }
}
