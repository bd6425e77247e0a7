//! Argument validation and coercion
//!
//! Model-emitted arguments arrive as loosely typed JSON. Before execution
//! each value is cleaned (nulls and empty strings dropped, wrapping quotes
//! and doubled escapes stripped) and coerced to the declared parameter type.
//! Arrays accept either a JSON array or a comma-separated string.

use serde_json::{Map, Value};

use crate::registry::{ParamType, ToolDescriptor};

/// Outcome of the validation pipeline
pub struct CoercedArgs {
    pub args: Map<String, Value>,
    pub errors: Vec<String>,
}

impl CoercedArgs {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate and coerce raw arguments against a descriptor.
pub fn coerce_arguments(descriptor: &ToolDescriptor, raw: &Map<String, Value>) -> CoercedArgs {
    let mut args = Map::new();
    let mut errors = Vec::new();

    for param in &descriptor.params {
        let value = raw.get(&param.name).cloned().and_then(clean_value);
        match value {
            Some(value) => match coerce_value(value, param.kind) {
                Ok(coerced) => {
                    args.insert(param.name.clone(), coerced);
                }
                Err(reason) => errors.push(format!(
                    "Parameter '{}' has invalid type: {}",
                    param.name, reason
                )),
            },
            None => {
                if param.required {
                    errors.push(format!("Missing required parameter '{}'", param.name));
                }
            }
        }
    }

    // Pass through extras the descriptor does not declare; providers that
    // care validate them on their side.
    for (key, value) in raw {
        if !args.contains_key(key) && !descriptor.params.iter().any(|p| &p.name == key) {
            if let Some(value) = clean_value(value.clone()) {
                args.insert(key.clone(), value);
            }
        }
    }

    CoercedArgs { args, errors }
}

/// Drop nulls and empty strings, strip quote wrapping from strings.
fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let cleaned = strip_quotes(&s);
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::String(cleaned))
            }
        }
        other => Some(other),
    }
}

/// Strip one layer of wrapping quotes and collapse doubled escapes.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    let unwrapped = if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    unwrapped
        .replace("\\\"", "\"")
        .replace("\\'", "'")
        .replace("\\\\", "\\")
}

fn coerce_value(value: Value, kind: ParamType) -> Result<Value, String> {
    match kind {
        ParamType::String => Ok(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(stringify(&other)),
        }),
        ParamType::Integer => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::Number(n) => {
                let f = n.as_f64().unwrap_or_default();
                if f.fract() == 0.0 {
                    Ok(Value::from(f as i64))
                } else {
                    Err(format!("'{}' is not an integer", n))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not an integer", s)),
            other => Err(format!("'{}' is not an integer", stringify(other))),
        },
        ParamType::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", s)),
            other => Err(format!("'{}' is not a number", stringify(other))),
        },
        ParamType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
            other => Err(format!("'{}' is not a boolean", stringify(other))),
        },
        ParamType::Array => match value {
            Value::Array(_) => Ok(value),
            Value::String(s) => {
                // JSON array text first, comma-split second.
                if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(&s) {
                    Ok(parsed)
                } else {
                    Ok(Value::Array(
                        s.split(',')
                            .map(|part| Value::String(strip_quotes(part)))
                            .filter(|v| v.as_str().map(|s| !s.is_empty()).unwrap_or(true))
                            .collect(),
                    ))
                }
            }
            other => Ok(Value::Array(vec![other])),
        },
        ParamType::Object => match value {
            Value::Object(_) => Ok(value),
            Value::String(s) => serde_json::from_str::<Value>(&s)
                .ok()
                .filter(Value::is_object)
                .ok_or_else(|| format!("'{}' is not an object", s)),
            other => Err(format!("'{}' is not an object", stringify(&other))),
        },
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("test", "sample", "sample tool")
            .with_param("text", ParamType::String, "", true)
            .with_param("count", ParamType::Integer, "", false)
            .with_param("ratio", ParamType::Number, "", false)
            .with_param("flag", ParamType::Boolean, "", false)
            .with_param("items", ParamType::Array, "", false)
    }

    fn raw(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_required_is_error() {
        let result = coerce_arguments(&descriptor(), &raw(&[("count", json!(3))]));
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("text"));
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let result = coerce_arguments(&descriptor(), &raw(&[("text", json!(""))]));
        assert!(!result.is_valid());
    }

    #[test]
    fn quotes_are_stripped() {
        let result = coerce_arguments(&descriptor(), &raw(&[("text", json!("\"hello\""))]));
        assert!(result.is_valid());
        assert_eq!(result.args["text"], json!("hello"));
    }

    #[test]
    fn string_to_integer() {
        let result = coerce_arguments(
            &descriptor(),
            &raw(&[("text", json!("x")), ("count", json!("42"))]),
        );
        assert!(result.is_valid());
        assert_eq!(result.args["count"], json!(42));
    }

    #[test]
    fn bad_integer_is_error() {
        let result = coerce_arguments(
            &descriptor(),
            &raw(&[("text", json!("x")), ("count", json!("many"))]),
        );
        assert!(!result.is_valid());
    }

    #[test]
    fn boolean_spellings() {
        for (input, expected) in [("true", true), ("Yes", true), ("0", false), ("no", false)] {
            let result = coerce_arguments(
                &descriptor(),
                &raw(&[("text", json!("x")), ("flag", json!(input))]),
            );
            assert!(result.is_valid());
            assert_eq!(result.args["flag"], json!(expected), "input {}", input);
        }
    }

    #[test]
    fn array_from_json_and_csv() {
        let result = coerce_arguments(
            &descriptor(),
            &raw(&[("text", json!("x")), ("items", json!("[\"a\", \"b\"]"))]),
        );
        assert_eq!(result.args["items"], json!(["a", "b"]));

        let result = coerce_arguments(
            &descriptor(),
            &raw(&[("text", json!("x")), ("items", json!("a, b, c"))]),
        );
        assert_eq!(result.args["items"], json!(["a", "b", "c"]));
    }

    #[test]
    fn nulls_are_dropped() {
        let result = coerce_arguments(
            &descriptor(),
            &raw(&[("text", json!("x")), ("count", Value::Null)]),
        );
        assert!(result.is_valid());
        assert!(!result.args.contains_key("count"));
    }

    #[test]
    fn extras_pass_through() {
        let result = coerce_arguments(
            &descriptor(),
            &raw(&[("text", json!("x")), ("extra", json!("kept"))]),
        );
        assert_eq!(result.args["extra"], json!("kept"));
    }
}
