//! Content extraction from heterogeneous LLM response bodies.
//!
//! Providers disagree about response shape. The ladder: structured
//! OpenAI-style `choices` → common simple keys (`content`, `text`,
//! `message`, `result`, `output`, `data`) → any nested occurrence of those
//! keys → the raw body.

use serde_json::Value;

use crate::ProviderError;

const PRIORITY_FIELDS: [&str; 6] = ["content", "text", "message", "result", "output", "data"];

/// Extract the reply text from a raw response body.
pub fn extract_content(body: &str) -> Result<String, ProviderError> {
    let raw = body.trim();
    if raw.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    if let Some(content) = extract_from_possible_json(raw) {
        return Ok(content);
    }
    Ok(raw.to_string())
}

fn extract_from_possible_json(s: &str) -> Option<String> {
    let mut candidate = s.trim();

    // Some providers wrap JSON in markdown fences.
    if let Some(stripped) = strip_code_fence(candidate) {
        candidate = stripped;
    }

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        if let Some(content) = find_content(&value) {
            return Some(content);
        }
    }

    // Retry on the widest substring that looks like a JSON document.
    let first = candidate.find(['{', '['])?;
    let last = candidate.rfind(['}', ']'])?;
    if last <= first {
        return None;
    }
    let value: Value = serde_json::from_str(&candidate[first..=last]).ok()?;
    find_content(&value)
}

fn strip_code_fence(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("```")?;
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let end = rest.rfind("```")?;
    Some(rest[..end].trim())
}

fn find_content(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for field in PRIORITY_FIELDS {
                if let Some(Value::String(s)) = map.get(field) {
                    if !s.trim().is_empty() {
                        return Some(s.clone());
                    }
                }
            }

            if let Some(Value::Array(choices)) = map.get("choices") {
                if let Some(first) = choices.first() {
                    if let Some(content) = choice_content(first) {
                        return Some(content);
                    }
                }
            }

            map.values().find_map(find_content)
        }
        Value::Array(items) => items.iter().find_map(find_content),
        Value::String(s) => {
            let trimmed = s.trim();
            // A string that itself looks like JSON gets one more pass.
            if (trimmed.starts_with('{') && trimmed.ends_with('}'))
                || (trimmed.starts_with('[') && trimmed.ends_with(']'))
            {
                let inner: Value = serde_json::from_str(trimmed).ok()?;
                find_content(&inner)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn choice_content(choice: &Value) -> Option<String> {
    let as_nonempty = |v: &Value| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    };

    if let Some(content) = choice.pointer("/message/content").and_then(as_nonempty) {
        return Some(content);
    }
    if let Some(content) = choice.pointer("/delta/content").and_then(as_nonempty) {
        return Some(content);
    }
    if let Some(content) = choice.get("text").and_then(as_nonempty) {
        return Some(content);
    }
    choice.get("content").and_then(as_nonempty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_an_error() {
        assert_eq!(extract_content("  \n "), Err(ProviderError::EmptyResponse));
    }

    #[test]
    fn openai_choices_shape_is_recognized() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"the answer"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "the answer");
    }

    #[test]
    fn streaming_delta_shape_is_recognized() {
        let body = r#"{"choices":[{"delta":{"content":"partial"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "partial");
    }

    #[test]
    fn simple_keys_are_tried_in_priority_order() {
        assert_eq!(extract_content(r#"{"text":"t"}"#).unwrap(), "t");
        assert_eq!(extract_content(r#"{"output":"o"}"#).unwrap(), "o");
        assert_eq!(
            extract_content(r#"{"content":"c","data":"d"}"#).unwrap(),
            "c"
        );
    }

    #[test]
    fn nested_content_is_found_recursively() {
        let body = r#"{"wrapper":{"inner":{"content":"deep"}}}"#;
        assert_eq!(extract_content(body).unwrap(), "deep");
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let body = "```json\n{\"content\":\"fenced\"}\n```";
        assert_eq!(extract_content(body).unwrap(), "fenced");
    }

    #[test]
    fn json_embedded_in_prose_is_salvaged() {
        let body = "Here you go: {\"content\":\"embedded\"} hope it helps";
        assert_eq!(extract_content(body).unwrap(), "embedded");
    }

    #[test]
    fn stringified_json_gets_a_second_pass() {
        let body = r#"{"payload":"{\"content\":\"twice encoded\"}"}"#;
        assert_eq!(extract_content(body).unwrap(), "twice encoded");
    }

    #[test]
    fn non_json_body_passes_through_raw() {
        assert_eq!(
            extract_content("plain prose reply\n").unwrap(),
            "plain prose reply"
        );
    }

    #[test]
    fn empty_string_fields_are_skipped() {
        let body = r#"{"content":"","text":"fallback"}"#;
        assert_eq!(extract_content(body).unwrap(), "fallback");
    }
}
