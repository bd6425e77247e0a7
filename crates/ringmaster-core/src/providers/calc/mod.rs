//! Calculation provider
//!
//! Safe arithmetic over a restricted expression AST plus a private variable
//! store. Bindings live for the life of the provider instance; concurrent
//! updates are serialized on the bindings lock.

pub mod eval;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::registry::{ParamType, ToolDescriptor, ToolProvider};

pub use eval::{EvalError, EvalValue, Evaluator};

/// Provider offering expression evaluation and variable management
#[derive(Default)]
pub struct CalculationProvider {
    bindings: Mutex<HashMap<String, f64>>,
}

impl CalculationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn evaluate(&self, expression: &str) -> Result<String, ToolError> {
        let mut bindings = self.bindings.lock();
        let mut evaluator = Evaluator::new(&mut bindings);
        match evaluator.eval(expression) {
            Ok(value) => Ok(value.format()),
            Err(error) if error.is_validation() => Err(ToolError::Validation(error.to_string())),
            Err(error) => Err(ToolError::Execution(error.to_string())),
        }
    }
}

#[async_trait]
impl ToolProvider for CalculationProvider {
    fn name(&self) -> &str {
        "calc"
    }

    fn description(&self) -> &str {
        "Arithmetic evaluation with functions, constants, and named variables"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "calc",
                "calculate",
                "Evaluate a mathematical expression. Supports + - * / // % **, \
                 comparison chains, functions (trig, logs, sqrt, factorial, gcd, \
                 min/max/sum over lists), constants pi/e/tau/inf/nan, and \
                 assignment 'name = expr'.",
            )
            .with_category("mathematics")
            // Evaluation is deterministic, so no retry budget.
            .with_retries(0, 1.0)
            .with_param(
                "expression",
                ParamType::String,
                "Expression to evaluate",
                true,
            ),
            ToolDescriptor::new("calc", "set_variable", "Store a named numeric variable")
                .with_category("mathematics")
                .with_retries(0, 1.0)
                .with_param("name", ParamType::String, "Variable name", true)
                .with_param("value", ParamType::Number, "Numeric value", true),
            ToolDescriptor::new("calc", "get_variables", "List all stored variables")
                .with_category("mathematics")
                .with_retries(0, 1.0),
            ToolDescriptor::new("calc", "clear_variables", "Remove all stored variables")
                .with_category("mathematics")
                .with_retries(0, 1.0),
        ]
    }

    async fn call(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        match tool {
            "calculate" => {
                let expression = args
                    .get("expression")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("expression is required".into()))?;
                self.evaluate(expression).map(Value::String)
            }
            "set_variable" => {
                let name = args
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::Validation("name is required".into()))?;
                if !name
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_')
                    || name.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true)
                {
                    return Err(ToolError::Validation(format!(
                        "invalid variable name '{}'",
                        name
                    )));
                }
                let value = args
                    .get("value")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| ToolError::Validation("value must be a number".into()))?;
                self.bindings.lock().insert(name.to_string(), value);
                Ok(json!(format!("{} = {}", name, EvalValue::Number(value).format())))
            }
            "get_variables" => {
                let bindings = self.bindings.lock();
                let mut map = Map::new();
                let mut names: Vec<_> = bindings.keys().collect();
                names.sort();
                for name in names {
                    map.insert(name.clone(), json!(bindings[name]));
                }
                Ok(Value::Object(map))
            }
            "clear_variables" => {
                let mut bindings = self.bindings.lock();
                let count = bindings.len();
                bindings.clear();
                Ok(json!(format!("Cleared {} variable(s)", count)))
            }
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn calculate_simple() {
        let provider = CalculationProvider::new();
        let result = provider
            .call("calculate", &args(&[("expression", json!("2 + 3 * 4"))]))
            .await
            .unwrap();
        assert_eq!(result, json!("14"));
    }

    #[tokio::test]
    async fn variable_round_trip() {
        let provider = CalculationProvider::new();
        provider
            .call(
                "set_variable",
                &args(&[("name", json!("x")), ("value", json!(10.0))]),
            )
            .await
            .unwrap();

        let result = provider
            .call("calculate", &args(&[("expression", json!("x * 2 + 5"))]))
            .await
            .unwrap();
        assert_eq!(result, json!("25"));

        let variables = provider.call("get_variables", &Map::new()).await.unwrap();
        assert_eq!(variables["x"], json!(10.0));

        provider
            .call("clear_variables", &Map::new())
            .await
            .unwrap();
        let variables = provider.call("get_variables", &Map::new()).await.unwrap();
        assert_eq!(variables, json!({}));
    }

    #[tokio::test]
    async fn division_by_zero_is_execution_error() {
        let provider = CalculationProvider::new();
        let error = provider
            .call("calculate", &args(&[("expression", json!("1 / 0"))]))
            .await
            .unwrap_err();
        assert!(matches!(error, ToolError::Execution(_)));
        assert!(error.to_string().contains("Division by zero"));
    }

    #[tokio::test]
    async fn bad_syntax_is_validation_error() {
        let provider = CalculationProvider::new();
        let error = provider
            .call("calculate", &args(&[("expression", json!("2 +* 3"))]))
            .await
            .unwrap_err();
        assert!(matches!(error, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_bad_variable_name() {
        let provider = CalculationProvider::new();
        let error = provider
            .call(
                "set_variable",
                &args(&[("name", json!("2bad")), ("value", json!(1.0))]),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ToolError::Validation(_)));
    }
}
