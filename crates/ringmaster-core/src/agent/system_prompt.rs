//! System prompt construction
//!
//! The prompt enumerates every registered tool with its typed parameter
//! list and teaches the call convention the parser expects.

use std::sync::Arc;

use crate::registry::ToolRegistry;

const PROMPT_HEADER: &str = r#"You are Ringmaster, an assistant that completes tasks by calling tools.

To call a tool, emit a line of the form:
FUNCTION_CALL: tool_name(param="value", count=3, items=["a", "b"])

Rules:
- One call per line. You may emit several calls in one reply.
- Use only the tools listed below, with their exact names.
- Quote string values. Use JSON-style arrays for list parameters.
- After the results come back, answer the user in plain language.
- If no tool is needed, just answer directly.

Available tools:
"#;

/// Builds the system prompt from the live registry
pub struct SystemPrompt {
    registry: Arc<ToolRegistry>,
    context: Option<String>,
}

impl SystemPrompt {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            context: None,
        }
    }

    /// Add free-form context below the tool listing.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Render the full prompt against the current registry contents.
    pub fn build(&self) -> String {
        let mut prompt = String::from(PROMPT_HEADER);
        for descriptor in self.registry.list() {
            let params: Vec<String> = descriptor
                .params
                .iter()
                .map(|p| {
                    if p.required {
                        format!("{}: {}", p.name, p.kind.as_str())
                    } else {
                        format!("{}?: {}", p.name, p.kind.as_str())
                    }
                })
                .collect();
            prompt.push_str(&format!(
                "- {}({}): {}\n",
                descriptor.name,
                params.join(", "),
                descriptor.description.lines().next().unwrap_or_default()
            ));
        }
        if let Some(context) = &self.context {
            prompt.push('\n');
            prompt.push_str(context);
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CalculationProvider;

    #[test]
    fn prompt_lists_registered_tools() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register_provider(Arc::new(CalculationProvider::new()));

        let prompt = SystemPrompt::new(registry).build();
        assert!(prompt.contains("FUNCTION_CALL:"));
        assert!(prompt.contains("calc_calculate(expression: string)"));
        assert!(prompt.contains("calc_get_variables()"));
    }

    #[test]
    fn optional_params_are_marked() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register_provider(Arc::new(CalculationProvider::new()));
        let prompt = SystemPrompt::new(registry).build();
        assert!(prompt.contains("calc_set_variable(name: string, value: number)"));
    }
}
