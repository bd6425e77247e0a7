//! Plugin manifest format
//!
//! Plugins are declarative TOML files: a `[provider]` table plus `[[tool]]`
//! entries whose bodies are templates executed by the engine. Two kinds are
//! supported: `expression` templates evaluated by the calculator after
//! argument substitution, and `response` templates that interpolate
//! arguments into a text reply. Nothing in a manifest can reach the
//! filesystem, the network, or a process.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ToolError;
use crate::registry::{ParamType, ToolDescriptor};

/// Parsed plugin file
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub provider: ProviderMeta,
    #[serde(default, rename = "tool")]
    pub tools: Vec<ToolManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMeta {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// What a plugin tool does with its substituted template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Template is evaluated as a calculator expression
    Expression,
    /// Template is returned as text after substitution
    Response,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolManifest {
    pub name: String,
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub kind: ToolKind,
    pub template: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamManifest>,
}

fn default_category() -> String {
    "utilities".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamManifest {
    #[serde(rename = "type", default = "default_param_type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl ToolManifest {
    /// Build the registry descriptor for this tool under `provider`.
    pub fn descriptor(&self, provider: &str, version: &str) -> ToolDescriptor {
        let mut descriptor = ToolDescriptor::new(provider, &self.name, self.description.clone())
            .with_category(self.category.clone())
            .with_version(version);
        for (name, param) in &self.params {
            let kind = match param.kind.as_str() {
                "integer" => ParamType::Integer,
                "number" => ParamType::Number,
                "boolean" => ParamType::Boolean,
                "array" => ParamType::Array,
                "object" => ParamType::Object,
                _ => ParamType::String,
            };
            descriptor =
                descriptor.with_param(name, kind, param.description.clone(), param.required);
        }
        descriptor
    }

    /// Substitute `{name}` placeholders with argument values.
    pub fn substitute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, ToolError> {
        let mut text = self.template.clone();
        for name in self.params.keys() {
            let placeholder = format!("{{{}}}", name);
            if !text.contains(&placeholder) {
                continue;
            }
            let rendered = match args.get(name) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                Some(serde_json::Value::Bool(b)) => b.to_string(),
                Some(other) => other.to_string(),
                None => {
                    return Err(ToolError::Validation(format!(
                        "missing argument '{}' for template",
                        name
                    )))
                }
            };
            text = text.replace(&placeholder, &rendered);
        }
        Ok(text)
    }
}

impl PluginManifest {
    pub fn parse(source: &str) -> Result<Self, ToolError> {
        toml::from_str(source)
            .map_err(|e| ToolError::Validation(format!("manifest parse failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
[provider]
name = "geometry"
version = "1.2.0"
description = "Geometry helpers"

[[tool]]
name = "hypotenuse"
description = "Length of the hypotenuse of a right triangle"
category = "mathematics"
kind = "expression"
template = "sqrt({a}**2 + {b}**2)"

[tool.params.a]
type = "number"
description = "First leg"
required = true

[tool.params.b]
type = "number"
description = "Second leg"
required = true
"#;

    #[test]
    fn parses_sample_manifest() {
        let manifest = PluginManifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.provider.name, "geometry");
        assert_eq!(manifest.tools.len(), 1);
        assert_eq!(manifest.tools[0].kind, ToolKind::Expression);
        assert_eq!(manifest.tools[0].params.len(), 2);
    }

    #[test]
    fn descriptor_is_qualified() {
        let manifest = PluginManifest::parse(SAMPLE).unwrap();
        let descriptor = manifest.tools[0].descriptor("geometry", "1.2.0");
        assert_eq!(descriptor.name, "geometry_hypotenuse");
        assert_eq!(descriptor.version, "1.2.0");
        assert_eq!(descriptor.required_params().count(), 2);
    }

    #[test]
    fn substitution_fills_placeholders() {
        let manifest = PluginManifest::parse(SAMPLE).unwrap();
        let mut args = serde_json::Map::new();
        args.insert("a".into(), json!(3));
        args.insert("b".into(), json!(4));
        let text = manifest.tools[0].substitute(&args).unwrap();
        assert_eq!(text, "sqrt(3**2 + 4**2)");
    }

    #[test]
    fn missing_argument_is_validation_error() {
        let manifest = PluginManifest::parse(SAMPLE).unwrap();
        let error = manifest.tools[0].substitute(&serde_json::Map::new()).unwrap_err();
        assert!(matches!(error, ToolError::Validation(_)));
    }
}
