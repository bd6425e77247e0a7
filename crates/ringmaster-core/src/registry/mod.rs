//! Tool registry
//!
//! The registry is the process-wide map from qualified tool names
//! (`<provider>_<local>`) to their descriptor and owning provider. Providers
//! register descriptors on initialization; the dispatcher resolves calls
//! through `lookup`. Registrations are serialized behind one lock, lookups
//! clone the entry out of a read guard.

pub mod capability;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ToolError;

pub use capability::{CapabilityIndex, Category, Complexity, ToolCapability};

/// Parameter types a tool may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

/// A single declared parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Immutable metadata record for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Qualified name: `<provider>_<local>`
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub provider: String,
    pub category: String,
    pub version: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay: f64,
    pub requires_auth: bool,
}

impl ToolDescriptor {
    pub fn new(provider: impl Into<String>, local: &str, description: impl Into<String>) -> Self {
        let provider = provider.into();
        Self {
            name: format!("{}_{}", provider, local),
            description: description.into(),
            params: Vec::new(),
            provider,
            category: "utilities".to_string(),
            version: "1.0.0".to_string(),
            timeout_secs: crate::config::defaults::TIMEOUT_SECONDS,
            max_retries: crate::config::defaults::MAX_RETRIES,
            retry_base_delay: crate::config::defaults::RETRY_BASE_DELAY,
            requires_auth: false,
        }
    }

    pub fn with_param(
        mut self,
        name: impl Into<String>,
        kind: ParamType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required,
        });
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: f64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_auth_required(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Local name without the provider prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .strip_prefix(&format!("{}_", self.provider))
            .unwrap_or(&self.name)
    }

    /// Names of required parameters.
    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.required)
    }

    /// JSON schema object for LLM consumption.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind.as_str(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Provider capability set: initialize, shutdown, list own tools, execute by
/// local name. Providers are registered as tagged records; the registry is
/// the only coupling point between them.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Provider name, used as the qualified-name prefix
    fn name(&self) -> &str;

    /// Human description shown in /servers listings
    fn description(&self) -> &str;

    /// Descriptors for every tool this provider offers
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Acquire resources. Called once before registration.
    async fn initialize(&self) -> Result<(), ToolError> {
        Ok(())
    }

    /// Release resources. Called when the provider is unregistered.
    async fn shutdown(&self) -> Result<(), ToolError> {
        Ok(())
    }

    /// Execute a tool by its local (unqualified) name.
    async fn call(
        &self,
        tool: &str,
        args: &serde_json::Map<String, Value>,
    ) -> Result<Value, ToolError>;
}

/// A registry entry: descriptor plus the provider that executes it
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: Arc<ToolDescriptor>,
    pub provider: Arc<dyn ToolProvider>,
}

impl RegisteredTool {
    /// Execute through the owning provider using the local tool name.
    pub async fn execute(
        &self,
        args: &serde_json::Map<String, Value>,
    ) -> Result<Value, ToolError> {
        self.provider.call(self.descriptor.local_name(), args).await
    }
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one descriptor for a provider. Duplicate names warn and
    /// overwrite the prior binding; the registry never silently drops.
    pub fn register(&self, descriptor: ToolDescriptor, provider: Arc<dyn ToolProvider>) {
        let mut tools = self.tools.write();
        let name = descriptor.name.clone();
        if tools.contains_key(&name) {
            warn!(tool = %name, "overwriting existing tool registration");
        }
        debug!(tool = %name, provider = %descriptor.provider, "registered tool");
        tools.insert(
            name,
            RegisteredTool {
                descriptor: Arc::new(descriptor),
                provider,
            },
        );
    }

    /// Register every tool a provider declares.
    pub fn register_provider(&self, provider: Arc<dyn ToolProvider>) {
        for descriptor in provider.tools() {
            self.register(descriptor, provider.clone());
        }
    }

    /// Get an entry by qualified name.
    pub fn lookup(&self, name: &str) -> Option<RegisteredTool> {
        self.tools.read().get(name).cloned()
    }

    /// All descriptors, sorted by qualified name.
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        let mut list: Vec<_> = self
            .tools
            .read()
            .values()
            .map(|t| t.descriptor.clone())
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Remove one tool. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    /// Remove every tool a provider registered. Returns how many were freed.
    pub fn unregister_provider(&self, provider_name: &str) -> usize {
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|_, t| t.descriptor.provider != provider_name);
        before - tools.len()
    }

    /// Tool counts grouped by provider.
    pub fn provider_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for tool in self.tools.read().values() {
            *counts.entry(tool.descriptor.provider.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl ToolProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes arguments back"
        }

        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor::new("echo", "say", "Echo a message").with_param(
                "message",
                ParamType::String,
                "Message to echo",
                true,
            )]
        }

        async fn call(
            &self,
            tool: &str,
            args: &serde_json::Map<String, Value>,
        ) -> Result<Value, ToolError> {
            match tool {
                "say" => Ok(args.get("message").cloned().unwrap_or(Value::Null)),
                other => Err(ToolError::NotFound(other.to_string())),
            }
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ToolRegistry::new();
        registry.register_provider(Arc::new(EchoProvider));

        assert_eq!(registry.len(), 1);
        let entry = registry.lookup("echo_say").unwrap();
        assert_eq!(entry.descriptor.local_name(), "say");
        assert_eq!(registry.list()[0].name, "echo_say");
    }

    #[test]
    fn reregistration_replaces_and_keeps_size() {
        let registry = ToolRegistry::new();
        let provider = Arc::new(EchoProvider);
        registry.register_provider(provider.clone());
        registry.register_provider(provider);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_provider_frees_tools() {
        let registry = ToolRegistry::new();
        registry.register_provider(Arc::new(EchoProvider));
        assert_eq!(registry.unregister_provider("echo"), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn parameters_schema_shape() {
        let descriptor = ToolDescriptor::new("calc", "calculate", "Evaluate an expression")
            .with_param("expression", ParamType::String, "Expression text", true)
            .with_param("precision", ParamType::Integer, "Digits", false);
        let schema = descriptor.parameters_schema();
        assert_eq!(schema["properties"]["expression"]["type"], "string");
        assert_eq!(schema["required"], json!(["expression"]));
    }

    #[tokio::test]
    async fn execute_routes_to_provider() {
        let registry = ToolRegistry::new();
        registry.register_provider(Arc::new(EchoProvider));
        let entry = registry.lookup("echo_say").unwrap();
        let mut args = serde_json::Map::new();
        args.insert("message".into(), json!("hi"));
        assert_eq!(entry.execute(&args).await.unwrap(), json!("hi"));
    }
}
