//! Lenient extraction of structured payloads from model text
//!
//! Models wrap JSON in prose or markdown fences often enough that strict
//! whole-body parsing loses usable responses. The helpers here find the
//! object, parse it, and reduce every failure to one error kind the retry
//! loops can count and report.

use serde_json::Value;
use thiserror::Error;

/// Why one attempt at interpreting a model response failed.
#[derive(Debug, Error)]
pub enum ParseFailure {
    /// The model call itself failed; there was no text to parse.
    #[error("model call failed: {0}")]
    Client(String),
    #[error("no JSON object found in response")]
    NoJson,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("expected a JSON object")]
    NotObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type")]
    WrongFieldType(&'static str),
}

/// Extract a JSON object from model response text.
///
/// Tries, in order: the whole trimmed body, a ```json fenced block, and the
/// outermost brace span. The result must be an object.
pub fn extract_object(text: &str) -> Result<Value, ParseFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::NoJson);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return require_object(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        return serde_json::from_str::<Value>(fenced)
            .map_err(|e| ParseFailure::InvalidJson(e.to_string()))
            .and_then(require_object);
    }

    let start = trimmed.find('{').ok_or(ParseFailure::NoJson)?;
    let end = trimmed.rfind('}').ok_or(ParseFailure::NoJson)?;
    if end <= start {
        return Err(ParseFailure::NoJson);
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .map_err(|e| ParseFailure::InvalidJson(e.to_string()))
        .and_then(require_object)
}

fn require_object(value: Value) -> Result<Value, ParseFailure> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ParseFailure::NotObject)
    }
}

/// Contents of the first ```...``` fence, with an optional language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// A string field, defaulting to empty when missing or non-string.
pub fn string_field(value: &Value, name: &str) -> String {
    value
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A list-of-strings field, defaulting to empty; non-string entries dropped.
pub fn string_list_field(value: &Value, name: &str) -> Vec<String> {
    value
        .get(name)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let value = extract_object(r#"{"final_answer": "Paris"}"#).unwrap();
        assert_eq!(value["final_answer"], "Paris");
    }

    #[test]
    fn test_extract_fenced_object() {
        let text = "Here you go:\n```json\n{\"final_answer\": \"Paris\"}\n```\nDone.";
        let value = extract_object(text).unwrap();
        assert_eq!(value["final_answer"], "Paris");
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = "The answer is {\"final_answer\": \"Paris\"} as requested.";
        let value = extract_object(text).unwrap();
        assert_eq!(value["final_answer"], "Paris");
    }

    #[test]
    fn test_reject_non_object() {
        assert!(matches!(
            extract_object(r#"["just", "a", "list"]"#),
            Err(ParseFailure::NotObject)
        ));
    }

    #[test]
    fn test_reject_prose() {
        assert!(matches!(
            extract_object("I could not produce an answer."),
            Err(ParseFailure::NoJson)
        ));
    }

    #[test]
    fn test_string_field_defaults() {
        let value: Value = serde_json::json!({"reasoning": 42});
        assert_eq!(string_field(&value, "reasoning"), "");
        assert_eq!(string_field(&value, "absent"), "");
    }

    #[test]
    fn test_string_list_drops_non_strings() {
        let value: Value = serde_json::json!({"bullet_ids": ["b-1", 7, "b-2", null]});
        assert_eq!(string_list_field(&value, "bullet_ids"), vec!["b-1", "b-2"]);
    }
}
