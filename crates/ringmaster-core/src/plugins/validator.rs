//! Static plugin validation
//!
//! A plugin file must pass every check here before anything is instantiated
//! from it. The raw source text is scanned first, so a file that is not even
//! valid TOML still gets precise rejection reasons when it carries forbidden
//! imports or dangerous call patterns. A rejected file never registers a
//! provider; structural oddities (no provider table, no tools) only warn.

use regex::Regex;

use super::manifest::{PluginManifest, ToolKind};

/// Module names whose import is always rejected: process control,
/// filesystem mutation, dynamic evaluation, reflection.
const BLOCKED_IMPORTS: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "importlib",
    "ctypes",
    "socket",
    "pickle",
    "inspect",
    "builtins",
];

/// Literal source patterns that are rejected wherever they appear
const DANGEROUS_PATTERNS: &[&str] = &[
    "eval(",
    "exec(",
    "compile(",
    "__import__",
    "getattr(",
    "setattr(",
    "globals(",
    "locals(",
    "os.system(",
    "subprocess.",
    "shutil.rmtree",
    "rm -rf",
    "sudo ",
    "mkfs",
    "dd if=",
    "$(",
    "`",
];

/// Outcome of validating one plugin source file
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run the full static check suite over one plugin source.
pub fn validate_source(source: &str) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // 1. Raw-text scan, before any parsing.
    let import_regex =
        Regex::new(r"(?m)^\s*(?:import|from|use|require)\s+([A-Za-z_][A-Za-z0-9_.]*)")
            .expect("static regex");
    for captures in import_regex.captures_iter(source) {
        let module = captures[1].split('.').next().unwrap_or(&captures[1]);
        if BLOCKED_IMPORTS.contains(&module) {
            errors.push(format!("forbidden import '{}'", module));
        }
    }
    for pattern in DANGEROUS_PATTERNS {
        if source.contains(pattern) {
            errors.push(format!("dangerous pattern '{}'", pattern));
        }
    }
    if !errors.is_empty() {
        return ValidationOutcome { errors, warnings };
    }

    // 2. Manifest parse.
    let manifest = match PluginManifest::parse(source) {
        Ok(manifest) => manifest,
        Err(error) => {
            errors.push(error.to_string());
            return ValidationOutcome { errors, warnings };
        }
    };

    // 3. Structural checks.
    if manifest.provider.name.is_empty() {
        errors.push("provider name must not be empty".to_string());
    } else if !manifest
        .provider
        .name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        errors.push(format!(
            "provider name '{}' must be lowercase alphanumeric with underscores",
            manifest.provider.name
        ));
    }

    if manifest.tools.is_empty() {
        warnings.push("manifest declares no tools".to_string());
    }

    for tool in &manifest.tools {
        match tool.kind {
            ToolKind::Expression => {
                // Every placeholder filled with a literal must leave a
                // parseable expression behind.
                let mut probe = tool.template.clone();
                for name in tool.params.keys() {
                    probe = probe.replace(&format!("{{{}}}", name), "1");
                }
                let mut bindings = std::collections::HashMap::new();
                let mut evaluator = crate::providers::calc::Evaluator::new(&mut bindings);
                if let Err(error) = evaluator.eval(&probe) {
                    if error.is_validation() {
                        errors.push(format!(
                            "tool '{}' expression template does not parse: {}",
                            tool.name, error
                        ));
                    }
                }
            }
            ToolKind::Response => {
                if tool.template.is_empty() {
                    warnings.push(format!("tool '{}' has an empty response template", tool.name));
                }
            }
        }
        if tool.name.is_empty() {
            errors.push("tool names must not be empty".to_string());
        }
    }

    ValidationOutcome { errors, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_import_is_rejected_with_reason() {
        let outcome = validate_source("import os\nos.system(\"rm -rf /\")\n");
        assert!(!outcome.passed());
        assert!(outcome.errors.iter().any(|e| e.contains("forbidden import 'os'")));
        assert!(outcome.errors.iter().any(|e| e.contains("os.system(")));
        assert!(outcome.errors.iter().any(|e| e.contains("rm -rf")));
    }

    #[test]
    fn subprocess_import_is_rejected() {
        let outcome = validate_source("from subprocess import run\n");
        assert!(!outcome.passed());
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("forbidden import 'subprocess'")));
    }

    #[test]
    fn eval_pattern_is_rejected() {
        let outcome = validate_source(
            "[provider]\nname = \"x\"\n\n[[tool]]\nname = \"t\"\ndescription = \"eval(code)\"\nkind = \"response\"\ntemplate = \"hi\"\n",
        );
        assert!(!outcome.passed());
    }

    #[test]
    fn unparseable_file_is_rejected() {
        let outcome = validate_source("this is not toml at all :::");
        assert!(!outcome.passed());
        assert!(outcome.errors[0].contains("parse failed"));
    }

    #[test]
    fn empty_tools_only_warns() {
        let outcome = validate_source("[provider]\nname = \"quiet\"\n");
        assert!(outcome.passed());
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn broken_expression_template_is_rejected() {
        let source = r#"
[provider]
name = "mathpack"

[[tool]]
name = "broken"
description = "Bad template"
kind = "expression"
template = "sqrt({a} +* 2)"

[tool.params.a]
type = "number"
required = true
"#;
        let outcome = validate_source(source);
        assert!(!outcome.passed());
        assert!(outcome.errors[0].contains("does not parse"));
    }

    #[test]
    fn clean_manifest_passes() {
        let source = r#"
[provider]
name = "geometry"
description = "Geometry helpers"

[[tool]]
name = "circle_area"
description = "Area of a circle"
kind = "expression"
template = "pi * {r}**2"

[tool.params.r]
type = "number"
required = true
"#;
        let outcome = validate_source(source);
        assert!(outcome.passed(), "errors: {:?}", outcome.errors);
        assert!(outcome.warnings.is_empty());
    }
}
