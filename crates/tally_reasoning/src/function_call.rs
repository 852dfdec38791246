//! Parse function calls out of plain-text model output.
//!
//! The model is instructed to call functions by emitting
//! `<function>{"name": "...", "parameters": {...}}</function>` spans.
//! Zero or more spans may appear in one reply; spans do not nest.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tally_core::config::CallDetection;

pub const CALL_OPEN: &str = "<function>";
pub const CALL_CLOSE: &str = "</function>";

static RE_CALL_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<function>(.*?)</function>").unwrap());

/// A function call parsed from generated text.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FunctionCallError {
    /// A delimited span whose payload is not a `{name, parameters}` record.
    #[error("malformed function call {payload:?}: {reason}")]
    Malformed { payload: String, reason: String },
    /// An opening marker without its closing marker.
    #[error("function call is not terminated")]
    Unterminated,
    #[error("no function call found")]
    NoCalls,
}

/// Whether `text` should be treated as a function call.
pub fn is_function_call(text: &str, detection: CallDetection) -> bool {
    match detection {
        CallDetection::Anywhere => text.contains(CALL_OPEN),
        CallDetection::Prefix => text.trim_start().starts_with(CALL_OPEN),
    }
}

/// `text` with every complete call span removed, trimmed.
pub fn strip_function_calls(text: &str) -> String {
    RE_CALL_SPAN.replace_all(text, "").trim().to_string()
}

/// Extract every function call from `text`, in order of appearance.
///
/// Fails on the first malformed span rather than skipping it, and refuses
/// text whose last call has not been closed yet.
pub fn parse_function_calls(text: &str) -> Result<Vec<FunctionCall>, FunctionCallError> {
    let mut calls = Vec::new();
    let mut consumed = 0;

    for caps in RE_CALL_SPAN.captures_iter(text) {
        let inner = caps.get(1).map_or("", |m| m.as_str());
        calls.push(parse_call_payload(inner.trim())?);
        if let Some(whole) = caps.get(0) {
            consumed = whole.end();
        }
    }

    if text[consumed..].contains(CALL_OPEN) {
        return Err(FunctionCallError::Unterminated);
    }
    if calls.is_empty() {
        return Err(FunctionCallError::NoCalls);
    }
    Ok(calls)
}

/// Parse one span payload. `arguments` is accepted in place of `parameters`;
/// a missing parameter object means the function takes none.
fn parse_call_payload(payload: &str) -> Result<FunctionCall, FunctionCallError> {
    let malformed = |reason: String| FunctionCallError::Malformed {
        payload: payload.to_string(),
        reason,
    };

    let value: Value = serde_json::from_str(payload).map_err(|e| malformed(e.to_string()))?;
    let map = value
        .as_object()
        .ok_or_else(|| malformed("payload is not an object".into()))?;

    let name = map
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| malformed("missing function name".into()))?
        .to_string();

    let parameters = match map.get("parameters").or_else(|| map.get("arguments")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => return Err(malformed("parameters must be an object".into())),
    };

    Ok(FunctionCall { name, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_marker_anywhere() {
        assert!(is_function_call(
            "Sure! <function>{\"name\":\"get_todo_list\"}</function>",
            CallDetection::Anywhere
        ));
        assert!(!is_function_call("Here is your list.", CallDetection::Anywhere));
    }

    #[test]
    fn test_prefix_detection_requires_leading_marker() {
        let text = "Sure! <function>{\"name\":\"get_todo_list\"}</function>";
        assert!(!is_function_call(text, CallDetection::Prefix));
        assert!(is_function_call(
            "  \n<function>{\"name\":\"get_todo_list\"}</function>",
            CallDetection::Prefix
        ));
    }

    #[test]
    fn test_partial_marker_is_not_a_call() {
        assert!(!is_function_call("<func", CallDetection::Anywhere));
    }

    #[test]
    fn test_parse_single_call() {
        let text = r#"<function>{"name": "add_todo", "parameters": {"title": "x"}}</function>"#;
        let calls = parse_function_calls(text).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "add_todo");
        assert_eq!(calls[0].parameters["title"], "x");
    }

    #[test]
    fn test_parse_multiple_calls_in_order() {
        let text = concat!(
            r#"<function>{"name":"add_todo","parameters":{"title":"milk"}}</function>"#,
            "\n",
            r#"<function>{"name":"add_todo","parameters":{"title":"eggs"}}</function>"#
        );
        let calls = parse_function_calls(text).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].parameters["title"], "milk");
        assert_eq!(calls[1].parameters["title"], "eggs");
    }

    #[test]
    fn test_two_calls_on_one_line_stay_separate() {
        let text = r#"<function>{"name":"a"}</function><function>{"name":"b"}</function>"#;
        let calls = parse_function_calls(text).unwrap();
        let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_payload_spanning_lines() {
        let text = "<function>{\n  \"name\": \"remove_todo\",\n  \"parameters\": {\"ids\": [1, 2]}\n}</function>";
        let calls = parse_function_calls(text).unwrap();
        assert_eq!(calls[0].parameters["ids"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_missing_parameters_defaults_to_empty() {
        let calls = parse_function_calls(r#"<function>{"name":"get_todo_list"}</function>"#).unwrap();
        assert!(calls[0].parameters.is_empty());
    }

    #[test]
    fn test_arguments_alias() {
        let text = r#"<function>{"name":"add_todo","arguments":{"title":"bread"}}</function>"#;
        let calls = parse_function_calls(text).unwrap();
        assert_eq!(calls[0].parameters["title"], "bread");
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = parse_function_calls("<function>not json</function>").unwrap_err();
        assert!(matches!(err, FunctionCallError::Malformed { .. }));
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let err =
            parse_function_calls(r#"<function>{"parameters":{"title":"x"}}</function>"#).unwrap_err();
        assert!(matches!(err, FunctionCallError::Malformed { .. }));
    }

    #[test]
    fn test_non_object_parameters_is_malformed() {
        let err = parse_function_calls(r#"<function>{"name":"add_todo","parameters":"x"}</function>"#)
            .unwrap_err();
        assert!(matches!(err, FunctionCallError::Malformed { .. }));
    }

    #[test]
    fn test_malformed_span_is_not_dropped() {
        // A good call followed by a bad one fails as a whole
        let text = r#"<function>{"name":"a"}</function><function>{oops}</function>"#;
        assert!(matches!(
            parse_function_calls(text),
            Err(FunctionCallError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unterminated_call() {
        let text = r#"<function>{"name":"add_todo","parameters":{"ti"#;
        assert_eq!(parse_function_calls(text), Err(FunctionCallError::Unterminated));
    }

    #[test]
    fn test_unterminated_after_complete_call() {
        let text = r#"<function>{"name":"a"}</function> <function>{"name":"#;
        assert_eq!(parse_function_calls(text), Err(FunctionCallError::Unterminated));
    }

    #[test]
    fn test_strip_keeps_prose_around_calls() {
        let text = format!(
            "Sure. {} and {} done.",
            r#"<function>{"name":"a"}</function>"#,
            r#"<function>{"name":"b"}</function>"#
        );
        assert_eq!(strip_function_calls(&text), "Sure.  and  done.");
        assert_eq!(strip_function_calls(r#"<function>{"name":"a"}</function>"#), "");
        // An open span is left alone
        assert_eq!(strip_function_calls("x <function>{"), "x <function>{");
    }

    #[test]
    fn test_no_calls() {
        assert_eq!(parse_function_calls("just text"), Err(FunctionCallError::NoCalls));
    }
}
