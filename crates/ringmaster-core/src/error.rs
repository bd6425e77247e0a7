//! Error types for Ringmaster Core

use thiserror::Error;

/// Result type alias using Ringmaster Error
pub type Result<T> = std::result::Result<T, Error>;

/// Ringmaster error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tool-specific errors
///
/// The variant decides how the dispatcher treats a failure: validation and
/// security errors fail the invocation immediately, connection/execution/
/// timeout errors are retried up to the descriptor's retry budget.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error("Security violation: {0}")]
    Security(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Whether the dispatcher may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolError::Connection(_)
                | ToolError::Execution(_)
                | ToolError::Timeout(_)
                | ToolError::Io(_)
        )
    }

    /// Short kind label used in result messages and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "not_found",
            ToolError::Validation(_) => "validation",
            ToolError::Security(_) => "security",
            ToolError::Connection(_) => "connection",
            ToolError::Execution(_) => "execution",
            ToolError::Timeout(_) => "timeout",
            ToolError::Io(_) => "io",
        }
    }
}
