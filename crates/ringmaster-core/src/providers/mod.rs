//! Capability providers
//!
//! Each provider groups related tools behind the provider capability set
//! (initialize, shutdown, list own tools, execute by name) and registers
//! its descriptors with the registry. Additional providers arrive at
//! runtime through the plugin loader.

pub mod calc;
pub mod dev;
pub mod monitor;
pub mod remote;
pub mod websearch;

pub use calc::CalculationProvider;
pub use dev::DevProvider;
pub use monitor::{AgentSession, MonitoringProvider, TodoItem, TodoStatus};
pub use remote::RemoteProvider;
pub use websearch::{WebSearchConfig, WebSearchProvider};
