//! Best-effort parsing of model replies and upstream bodies.
//!
//! Fallback order for model replies:
//! 1. strip a surrounding fenced code block, if any;
//! 2. parse the remainder as a JSON object;
//! 3. failing that, parse the outermost `{ ... }` span.
//!
//! Upstream bodies are parsed as JSON and otherwise wrapped as
//! `{"response": <text>}`.

use serde_json::{Map, Value};

/// Remove a fenced code block wrapper (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() < 2 || !lines[lines.len() - 1].trim_start().starts_with("```") {
        return trimmed;
    }
    // Slice between the end of the opening fence line and the start of the closing one.
    let start = match trimmed.find('\n') {
        Some(pos) => pos + 1,
        None => return trimmed,
    };
    let end = match trimmed.rfind('\n') {
        Some(pos) if pos >= start => pos,
        _ => return "",
    };
    trimmed[start..end].trim()
}

/// Parse a model reply as a JSON object.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let body = strip_code_fence(text);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        return Some(map);
    }

    let open = body.find('{')?;
    let close = body.rfind('}')?;
    if close <= open {
        return None;
    }
    match serde_json::from_str::<Value>(&body[open..=close]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Parse an upstream response body: JSON when possible, else `{"response": text}`.
pub fn json_or_text(body: &str) -> Value {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(_) => {
            let mut map = Map::new();
            map.insert("response".to_string(), Value::String(body.to_string()));
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
        // unterminated fence is left alone
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "```json\n{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_object_with_prose() {
        let map = parse_json_object("Sure! Here you go: {\"petId\": 5} hope it helps").unwrap();
        assert_eq!(map.get("petId"), Some(&json!(5)));
        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_json_or_text() {
        assert_eq!(json_or_text("{\"id\": 5}"), json!({"id": 5}));
        assert_eq!(json_or_text("pong"), json!({"response": "pong"}));
        assert_eq!(json_or_text(""), json!({"response": ""}));
    }
}
