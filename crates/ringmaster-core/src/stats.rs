//! Aggregate runtime counters
//!
//! One structure is the source of truth for every counter in the engine:
//! the dispatcher, the registry, the planner, and the LLM loop all record
//! through a shared handle. Never persisted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

/// Per-provider call breakdown
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Inner {
    queries_total: u64,
    queries_succeeded: u64,
    queries_failed: u64,
    tool_calls_total: u64,
    tool_calls_succeeded: u64,
    tool_calls_failed: u64,
    validation_errors: u64,
    retries: u64,
    output_validation_errors: u64,
    output_validation_warnings: u64,
    plans_created: u64,
    plans_completed: u64,
    plans_failed: u64,
    avg_response_secs: f64,
    avg_execution_secs: f64,
    per_provider: HashMap<String, ProviderStats>,
}

/// Shared counter store
#[derive(Debug, Default)]
pub struct AgentStats {
    inner: Mutex<Inner>,
}

impl AgentStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_query(&self, success: bool, elapsed_secs: f64) {
        let mut inner = self.inner.lock();
        inner.queries_total += 1;
        if success {
            inner.queries_succeeded += 1;
        } else {
            inner.queries_failed += 1;
        }
        let n = inner.queries_total as f64;
        inner.avg_response_secs += (elapsed_secs - inner.avg_response_secs) / n;
    }

    pub fn record_tool_call(
        &self,
        provider: &str,
        success: bool,
        elapsed_secs: f64,
        retries: u32,
    ) {
        let mut inner = self.inner.lock();
        inner.tool_calls_total += 1;
        if success {
            inner.tool_calls_succeeded += 1;
        } else {
            inner.tool_calls_failed += 1;
        }
        inner.retries += retries as u64;
        let n = inner.tool_calls_total as f64;
        inner.avg_execution_secs += (elapsed_secs - inner.avg_execution_secs) / n;

        let entry = inner.per_provider.entry(provider.to_string()).or_default();
        entry.calls += 1;
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    pub fn record_validation_error(&self) {
        self.inner.lock().validation_errors += 1;
    }

    pub fn record_output_validation(&self, error: bool) {
        let mut inner = self.inner.lock();
        if error {
            inner.output_validation_errors += 1;
        } else {
            inner.output_validation_warnings += 1;
        }
    }

    pub fn record_plan_created(&self) {
        self.inner.lock().plans_created += 1;
    }

    pub fn record_plan_finished(&self, completed: bool) {
        let mut inner = self.inner.lock();
        if completed {
            inner.plans_completed += 1;
        } else {
            inner.plans_failed += 1;
        }
    }

    pub fn tool_calls_total(&self) -> u64 {
        self.inner.lock().tool_calls_total
    }

    /// Structured snapshot of every counter.
    pub fn snapshot(&self) -> serde_json::Value {
        let inner = self.inner.lock();
        json!({
            "queries": {
                "total": inner.queries_total,
                "succeeded": inner.queries_succeeded,
                "failed": inner.queries_failed,
                "avg_response_secs": inner.avg_response_secs,
            },
            "tool_calls": {
                "total": inner.tool_calls_total,
                "succeeded": inner.tool_calls_succeeded,
                "failed": inner.tool_calls_failed,
                "retries": inner.retries,
                "validation_errors": inner.validation_errors,
                "avg_execution_secs": inner.avg_execution_secs,
            },
            "output_validation": {
                "errors": inner.output_validation_errors,
                "warnings": inner.output_validation_warnings,
            },
            "plans": {
                "created": inner.plans_created,
                "completed": inner.plans_completed,
                "failed": inner.plans_failed,
            },
            "providers": inner
                .per_provider
                .iter()
                .map(|(name, stats)| (name.clone(), serde_json::to_value(stats).unwrap_or_default()))
                .collect::<serde_json::Map<_, _>>(),
        })
    }
}
