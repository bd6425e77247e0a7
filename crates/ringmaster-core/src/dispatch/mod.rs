//! Reliable dispatcher
//!
//! Every tool invocation flows through here: argument validation and
//! coercion, a retry loop with linear backoff and a per-attempt deadline,
//! telemetry into the shared stats store, and a post-execution pass through
//! the output validator. Provider errors never escape as panics or raw
//! errors; the dispatcher always hands back a `ToolResult`.

pub mod coerce;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ToolError;
use crate::registry::{RegisteredTool, ToolRegistry};
use crate::stats::AgentStats;
use crate::validation::{CommandClass, OutputValidator, Severity, ValidationReport};

pub use coerce::{coerce_arguments, CoercedArgs};

/// Result kind reported back to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Success,
    Error,
    Partial,
}

/// Outcome record for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub kind: ResultKind,
    pub tool: String,
    pub payload: Value,
    pub message: String,
    pub execution_time: f64,
    pub retry_count: u32,
    pub validation_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_validation: Option<ValidationReport>,
    pub metadata: Map<String, Value>,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ToolResult {
    fn new(tool: &str, correlation_id: String) -> Self {
        Self {
            kind: ResultKind::Error,
            tool: tool.to_string(),
            payload: Value::Null,
            message: String::new(),
            execution_time: 0.0,
            retry_count: 0,
            validation_errors: Vec::new(),
            output_validation: None,
            metadata: Map::new(),
            correlation_id,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == ResultKind::Success
    }

    /// Payload rendered as text for LLM consumption.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Validates, retries, times out, and records every invocation
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    validator: OutputValidator,
    stats: Arc<AgentStats>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, stats: Arc<AgentStats>) -> Self {
        Self {
            registry,
            validator: OutputValidator::new(),
            stats,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<AgentStats> {
        &self.stats
    }

    /// Execute one call end to end.
    pub async fn dispatch(&self, tool_name: &str, raw_args: Map<String, Value>) -> ToolResult {
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut result = ToolResult::new(tool_name, correlation_id);

        let Some(entry) = self.registry.lookup(tool_name) else {
            result.message = format!("Tool not found: {}", tool_name);
            self.stats
                .record_tool_call("unknown", false, started.elapsed().as_secs_f64(), 0);
            return result;
        };
        let descriptor = entry.descriptor.clone();

        // 1. Argument validation. A failed validation never executes.
        let coerced = coerce_arguments(&descriptor, &raw_args);
        if !coerced.is_valid() {
            result.validation_errors = coerced.errors;
            result.message = format!(
                "Validation failed for {}: {}",
                tool_name,
                result.validation_errors.join("; ")
            );
            result.execution_time = started.elapsed().as_secs_f64();
            self.stats.record_validation_error();
            self.stats.record_tool_call(
                &descriptor.provider,
                false,
                result.execution_time,
                0,
            );
            return result;
        }
        let args = coerced.args;

        // 2. Retry loop with per-attempt deadline.
        let outcome = self.run_with_retries(&entry, &args, &mut result).await;
        result.execution_time = started.elapsed().as_secs_f64();

        match outcome {
            Ok(payload) => {
                result.kind = ResultKind::Success;
                result.payload = payload;
                result.message = format!("{} completed", tool_name);

                // 4. Post-validation can flip a provider success. It only
                // applies to command-style output; other payloads (search
                // results, calculator text) must not be matched against
                // shell-error patterns.
                let command = args.get("command").and_then(Value::as_str);
                if let Some(class) = CommandClass::infer(tool_name, command) {
                    let report = self
                        .validator
                        .validate(class, &result.payload_text(), None);
                    match report.severity {
                        Severity::Error => {
                            self.stats.record_output_validation(true);
                            result.kind = ResultKind::Error;
                            result.message = format!(
                                "{} output failed validation: {}",
                                tool_name,
                                report.messages.join("; ")
                            );
                        }
                        Severity::Warning => {
                            self.stats.record_output_validation(false);
                        }
                        _ => {}
                    }
                    result.output_validation = Some(report);
                }
            }
            Err(error) => {
                result.kind = ResultKind::Error;
                result.message = format!("{} failed ({}): {}", tool_name, error.kind(), error);
                result
                    .metadata
                    .insert("error_kind".into(), Value::String(error.kind().into()));
            }
        }

        // 3. Telemetry.
        self.stats.record_tool_call(
            &descriptor.provider,
            result.is_success(),
            result.execution_time,
            result.retry_count,
        );
        result
    }

    async fn run_with_retries(
        &self,
        entry: &RegisteredTool,
        args: &Map<String, Value>,
        result: &mut ToolResult,
    ) -> Result<Value, ToolError> {
        let descriptor = &entry.descriptor;
        let deadline = Duration::from_secs(descriptor.timeout_secs);
        let mut last_error = ToolError::Execution("no attempts made".into());

        for attempt in 0..=descriptor.max_retries {
            if attempt > 0 {
                result.retry_count = attempt;
                let backoff = descriptor.retry_base_delay * attempt as f64;
                debug!(
                    tool = %descriptor.name,
                    attempt,
                    backoff_secs = backoff,
                    "retrying after failure"
                );
                tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
            }

            let attempt_result = tokio::time::timeout(deadline, entry.execute(args)).await;
            match attempt_result {
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(error)) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    warn!(tool = %descriptor.name, attempt, %error, "attempt failed");
                    last_error = error;
                }
                Err(_) => {
                    warn!(
                        tool = %descriptor.name,
                        attempt,
                        timeout_secs = descriptor.timeout_secs,
                        "attempt timed out"
                    );
                    last_error = ToolError::Timeout(descriptor.timeout_secs);
                }
            }
        }

        Err(last_error)
    }
}
