//! Function-call extraction from model output
//!
//! The model is instructed to emit `FUNCTION_CALL: tool(arg="value")` lines,
//! but real output drifts. Three parsers run in order per call: a strict
//! expression parse with literal keyword values, a regex extraction for
//! informal output, and a plain key=value split as the last resort. The
//! first strategy producing a non-empty mapping wins.

use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::warn;

/// One parsed invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub tool: String,
    pub args: Map<String, Value>,
}

/// Whether the response claims to contain calls at all.
pub fn contains_call_marker(response: &str) -> bool {
    response.contains("FUNCTION_CALL:")
}

/// Extract every parseable call from a model response.
pub fn extract_calls(response: &str) -> Vec<ParsedCall> {
    let line_regex =
        Regex::new(r"FUNCTION_CALL:\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)").expect("static regex");

    let mut calls = Vec::new();
    for captures in line_regex.captures_iter(response) {
        let tool = captures[1].to_string();
        let arg_text = captures[2].trim();

        if arg_text.is_empty() {
            calls.push(ParsedCall {
                tool,
                args: Map::new(),
            });
            continue;
        }

        let args = parse_expression_args(arg_text)
            .filter(|m| !m.is_empty())
            .or_else(|| parse_regex_args(arg_text).filter(|m| !m.is_empty()))
            .or_else(|| parse_keyvalue_args(arg_text).filter(|m| !m.is_empty()));

        match args {
            Some(args) => calls.push(ParsedCall { tool, args }),
            None => {
                warn!(tool, arg_text, "failed to parse function call arguments");
            }
        }
    }
    calls
}

// ---------------------------------------------------------------------------
// Strategy 1: strict keyword-argument expression parse
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    chars: Vec<char>,
    position: usize,
    source: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            source,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.position += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.position >= self.chars.len()
    }
}

fn parse_expression_args(text: &str) -> Option<Map<String, Value>> {
    let mut cursor = Cursor::new(text);
    let mut args = Map::new();

    loop {
        cursor.skip_ws();
        if cursor.at_end() {
            break;
        }
        let key = parse_ident(&mut cursor)?;
        cursor.skip_ws();
        if cursor.bump() != Some('=') {
            return None;
        }
        cursor.skip_ws();
        let value = parse_literal(&mut cursor)?;
        args.insert(key, value);

        cursor.skip_ws();
        match cursor.peek() {
            Some(',') => {
                cursor.bump();
            }
            None => break,
            Some(_) => return None,
        }
    }

    Some(args)
}

fn parse_ident(cursor: &mut Cursor) -> Option<String> {
    let mut ident = String::new();
    while let Some(c) = cursor.peek() {
        if c.is_alphanumeric() || c == '_' {
            ident.push(c);
            cursor.bump();
        } else {
            break;
        }
    }
    if ident.is_empty() || ident.chars().next()?.is_ascii_digit() {
        None
    } else {
        Some(ident)
    }
}

fn parse_literal(cursor: &mut Cursor) -> Option<Value> {
    cursor.skip_ws();
    match cursor.peek()? {
        '"' | '\'' => parse_quoted(cursor).map(Value::String),
        '[' => parse_array(cursor),
        c if c.is_ascii_digit() || c == '-' || c == '+' => parse_number(cursor),
        _ => parse_word(cursor),
    }
}

fn parse_quoted(cursor: &mut Cursor) -> Option<String> {
    let quote = cursor.bump()?;
    let mut text = String::new();
    loop {
        match cursor.bump()? {
            '\\' => match cursor.bump()? {
                'n' => text.push('\n'),
                't' => text.push('\t'),
                other => text.push(other),
            },
            c if c == quote => return Some(text),
            c => text.push(c),
        }
    }
}

fn parse_array(cursor: &mut Cursor) -> Option<Value> {
    cursor.bump(); // consume '['
    let mut items = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.peek() == Some(']') {
            cursor.bump();
            return Some(Value::Array(items));
        }
        items.push(parse_literal(cursor)?);
        cursor.skip_ws();
        match cursor.peek() {
            Some(',') => {
                cursor.bump();
            }
            Some(']') => {}
            _ => return None,
        }
    }
}

fn parse_number(cursor: &mut Cursor) -> Option<Value> {
    let mut text = String::new();
    if matches!(cursor.peek(), Some('-') | Some('+')) {
        text.push(cursor.bump()?);
    }
    while let Some(c) = cursor.peek() {
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
            text.push(c);
            cursor.bump();
        } else {
            break;
        }
    }
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_word(cursor: &mut Cursor) -> Option<Value> {
    let word = parse_ident(cursor)?;
    match word.as_str() {
        "true" | "True" => Some(Value::Bool(true)),
        "false" | "False" => Some(Value::Bool(false)),
        "null" | "None" => Some(Value::Null),
        // A bare word is treated as an unquoted string.
        _ => Some(Value::String(word)),
    }
}

// ---------------------------------------------------------------------------
// Strategy 2: regex extraction per parameter
// ---------------------------------------------------------------------------

fn parse_regex_args(text: &str) -> Option<Map<String, Value>> {
    let param_regex = Regex::new(
        r#"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(\[[^\]]*\]|"[^"]*"|'[^']*'|-?\d+(?:\.\d+)?|true|false|True|False)"#,
    )
    .expect("static regex");

    let mut args = Map::new();
    for captures in param_regex.captures_iter(text) {
        let key = captures[1].to_string();
        let raw = &captures[2];
        let value = if raw.starts_with('[') {
            serde_json::from_str::<Value>(&raw.replace('\'', "\"")).unwrap_or_else(|_| {
                Value::Array(
                    raw.trim_matches(['[', ']'])
                        .split(',')
                        .map(|part| Value::String(part.trim().trim_matches(['"', '\'']).to_string()))
                        .filter(|v| v.as_str().map(|s| !s.is_empty()).unwrap_or(true))
                        .collect(),
                )
            })
        } else if raw.starts_with('"') || raw.starts_with('\'') {
            Value::String(raw[1..raw.len() - 1].to_string())
        } else if raw.eq_ignore_ascii_case("true") {
            Value::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Value::Bool(false)
        } else if let Ok(integer) = raw.parse::<i64>() {
            Value::Number(integer.into())
        } else if let Some(number) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            Value::Number(number)
        } else {
            Value::String(raw.to_string())
        };
        args.insert(key, value);
    }
    Some(args)
}

// ---------------------------------------------------------------------------
// Strategy 3: naive key=value split
// ---------------------------------------------------------------------------

fn parse_keyvalue_args(text: &str) -> Option<Map<String, Value>> {
    let mut args = Map::new();
    for part in text.split(',') {
        let (key, value) = part.split_once('=')?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }
        let value = value.trim().trim_matches(['"', '\'']);
        args.insert(key.to_string(), Value::String(value.to_string()));
    }
    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_parse_with_literals() {
        let calls = extract_calls(
            r#"Sure, let me check.
FUNCTION_CALL: calc_calculate(expression="2 + 3 * 4")
FUNCTION_CALL: monitor_create_todos(todos=["A", "B"], urgent=true, count=3)"#,
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool, "calc_calculate");
        assert_eq!(calls[0].args["expression"], json!("2 + 3 * 4"));
        assert_eq!(calls[1].args["todos"], json!(["A", "B"]));
        assert_eq!(calls[1].args["urgent"], json!(true));
        assert_eq!(calls[1].args["count"], json!(3));
    }

    #[test]
    fn single_quotes_and_escapes() {
        let calls =
            extract_calls("FUNCTION_CALL: remote_write_file(filename='a.txt', content=\"line\\nnext\")");
        assert_eq!(calls[0].args["filename"], json!("a.txt"));
        assert_eq!(calls[0].args["content"], json!("line\nnext"));
    }

    #[test]
    fn regex_fallback_handles_informal_output() {
        // Trailing prose after the last argument defeats the strict parser.
        let calls = extract_calls(
            r#"FUNCTION_CALL: websearch_search_web(query="rust async" and that should work)"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args["query"], json!("rust async"));
    }

    #[test]
    fn keyvalue_fallback() {
        let calls = extract_calls("FUNCTION_CALL: calc_set_variable(name=x, value=ten)");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args["name"], json!("x"));
    }

    #[test]
    fn empty_arguments_are_a_valid_call() {
        let calls = extract_calls("FUNCTION_CALL: monitor_get_progress_summary()");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].args.is_empty());
    }

    #[test]
    fn marker_without_parse_yields_nothing() {
        let response = "FUNCTION_CALL: ???garbled???";
        assert!(contains_call_marker(response));
        assert!(extract_calls(response).is_empty());
    }

    #[test]
    fn no_calls_in_plain_text() {
        assert!(extract_calls("The answer is 42.").is_empty());
        assert!(!contains_call_marker("The answer is 42."));
    }

    #[test]
    fn negative_and_float_numbers() {
        let calls = extract_calls("FUNCTION_CALL: t_x(a=-5, b=2.5)");
        assert_eq!(calls[0].args["a"], json!(-5));
        assert_eq!(calls[0].args["b"], json!(2.5));
    }
}
