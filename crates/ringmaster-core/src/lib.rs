//! Ringmaster Core - tool orchestration for LLM agents
//!
//! This crate provides the core of the engine:
//! - Tool registry and capability index
//! - Baseline providers (calc, remote, dev, monitor, websearch)
//! - SSH connection pool behind the remote provider
//! - Plugin discovery with static validation and a directory watcher
//! - Reliable dispatch with validation, retries, timeouts, and telemetry
//! - Output classification by pattern rule sets
//! - Deterministic task planning and the LLM interaction loop

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod planner;
pub mod plugins;
pub mod providers;
pub mod registry;
pub mod runtime;
pub mod ssh;
pub mod stats;
pub mod validation;

pub use agent::{format_plan_report, Agent, ConversationHistory, SystemPrompt};
pub use config::{defaults, AgentConfig, Secret};
pub use dispatch::{Dispatcher, ResultKind, ToolResult};
pub use error::{Error, Result, ToolError};
pub use llm::{ChatMessage, HttpLlmClient, LlmClient};
pub use planner::{PlanStatus, PlanStep, TaskCategory, TaskPlan, TaskPlanner};
pub use plugins::{PluginLoader, PluginRecord, PluginStatus};
pub use providers::{
    CalculationProvider, DevProvider, MonitoringProvider, RemoteProvider, TodoStatus,
    WebSearchConfig, WebSearchProvider,
};
pub use registry::{
    CapabilityIndex, Category, Complexity, ParamSpec, ParamType, RegisteredTool, ToolDescriptor,
    ToolProvider, ToolRegistry,
};
pub use runtime::{Runtime, RuntimeBuilder};
pub use ssh::{SshPool, SshSettings};
pub use stats::AgentStats;
pub use validation::{CommandClass, OutputValidator, Severity, ValidationContext};
