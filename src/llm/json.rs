//! Recovery of structured data from generated text.
//!
//! The model is told to emit only JSON but routinely wraps it in code fences,
//! surrounds it with prose, or runs out of tokens mid-value. Strategies are
//! tried in order and the first that deserializes wins:
//!
//! 1. strip fence markers and parse directly
//! 2. extract the first balanced `{...}` / `[...]` span and parse it
//! 3. syntax-only repair: close an open string, drop dangling commas, close
//!    open brackets in LIFO order
//!
//! Repair never invents values. Anything still unparseable is an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::LlmError;

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("valid regex"));
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?[ \t]*```[ \t]*$").expect("valid regex"));
static GREEDY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}|\[.*\]").expect("valid regex"));

/// Which recovery step produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Direct,
    Extracted,
    Repaired,
}

/// Parse generated text into `T`, applying the recovery pipeline.
pub fn parse_generated<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    parse_with_recovery(raw).map(|(value, _)| value)
}

/// Like [`parse_generated`], also reporting which step succeeded.
pub fn parse_with_recovery<T: DeserializeOwned>(raw: &str) -> Result<(T, Recovery), LlmError> {
    let stripped = strip_fences(raw);
    let mut last_error = match serde_json::from_str::<T>(stripped) {
        Ok(value) => return Ok((value, Recovery::Direct)),
        Err(e) => e.to_string(),
    };

    if let Some(span) = extract_json_span(raw) {
        match serde_json::from_str::<T>(span) {
            Ok(value) => {
                tracing::debug!("Recovered generated JSON by span extraction");
                return Ok((value, Recovery::Extracted));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    if let Some(repaired) = repair_json(stripped) {
        match serde_json::from_str::<T>(&repaired) {
            Ok(value) => {
                tracing::debug!("Recovered generated JSON by structural repair");
                return Ok((value, Recovery::Repaired));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(LlmError::MalformedResponse {
        reason: format!("{} (raw: {})", last_error, preview(raw, 200)),
    })
}

/// Remove leading/trailing code-fence markers and surrounding whitespace.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let start = OPENING_FENCE.find(trimmed).map_or(0, |m| m.end());
    let body = &trimmed[start..];
    let end = CLOSING_FENCE.find(body).map_or(body.len(), |m| m.start());
    body[..end].trim()
}

/// First balanced `{...}` or `[...]` span in `text`, string-aware.
///
/// Falls back to the greedy first-opener-to-last-closer match when no
/// balanced span exists.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    GREEDY_SPAN.find(text).map(|m| m.as_str())
}

/// Close what truncation left open. Returns `None` if there is no JSON
/// container to repair.
pub fn repair_json(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let body = &text[start..];

    let mut out = String::with_capacity(body.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in body.chars() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                stack.push('}');
                out.push(ch);
            }
            '[' => {
                stack.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                strip_dangling_comma(&mut out);
                if stack.pop() != Some(ch) {
                    // Mismatched closer: not something syntax repair can fix.
                    return None;
                }
                out.push(ch);
                if stack.is_empty() {
                    // Anything after the top-level value is trailing prose.
                    break;
                }
            }
            _ => out.push(ch),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    strip_dangling_comma(&mut out);
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    Some(out)
}

fn strip_dangling_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
    }
}

/// First `max_chars` characters of `text`, for logs and error messages.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn test_repairs_unterminated_string_and_brace() {
        let repaired = repair_json(r#"{"a":1,"b":"hello"#).unwrap();
        assert_eq!(repaired, r#"{"a":1,"b":"hello"}"#);
        let value: Value = parse_generated(r#"{"a":1,"b":"hello"#).unwrap();
        assert_eq!(value, json!({"a": 1, "b": "hello"}));
    }

    #[test]
    fn test_repairs_trailing_comma() {
        assert_eq!(repair_json(r#"{"a":1,}"#).unwrap(), r#"{"a":1}"#);
        let value: Value = parse_generated(r#"{"a":1,}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_direct_parse_after_fence_strip() {
        let raw = "```json\n{\"ok\": true}\n```";
        let (value, step): (Value, _) = parse_with_recovery(raw).unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(step, Recovery::Direct);
    }

    #[test]
    fn test_extracts_span_from_prose() {
        let raw = "Sure! Here is the agenda:\n{\"items\": [1, 2]}\nLet me know if you need changes {maybe}.";
        let (value, step): (Value, _) = parse_with_recovery(raw).unwrap();
        assert_eq!(value, json!({"items": [1, 2]}));
        assert_eq!(step, Recovery::Extracted);
    }

    #[test]
    fn test_span_extraction_ignores_braces_in_strings() {
        let raw = r#"note {"text": "a } inside", "n": [1]} trailing"#;
        assert_eq!(
            extract_json_span(raw).unwrap(),
            r#"{"text": "a } inside", "n": [1]}"#
        );
    }

    #[test]
    fn test_repairs_truncated_nested_value() {
        let raw = "```json\n{\"slots\": [{\"start\": \"09:00\", \"score\": 0.9}, {\"start\": \"10:";
        let (value, step): (Value, _) = parse_with_recovery(raw).unwrap();
        assert_eq!(step, Recovery::Repaired);
        assert_eq!(
            value,
            json!({"slots": [{"start": "09:00", "score": 0.9}, {"start": "10:"}]})
        );
    }

    #[test]
    fn test_repair_handles_escaped_quotes() {
        let repaired = repair_json(r#"{"q": "she said \"hi\""#).unwrap();
        assert_eq!(repaired, r#"{"q": "she said \"hi\""}"#);

        let repaired = repair_json(r#"{"q": "ends with \"#).unwrap();
        assert_eq!(repaired, r#"{"q": "ends with "}"#);
    }

    #[test]
    fn test_repair_closes_in_lifo_order() {
        let repaired = repair_json(r#"[{"a": [1, 2"#).unwrap();
        assert_eq!(repaired, r#"[{"a": [1, 2]}]"#);
    }

    #[test]
    fn test_unrecoverable_is_malformed() {
        let result: Result<Value, _> = parse_generated("I cannot help with that.");
        assert!(matches!(result, Err(LlmError::MalformedResponse { .. })));

        // Dangling key: closing syntax alone cannot produce valid JSON.
        let result: Result<Value, _> = parse_generated(r#"{"a": 1, "b":"#);
        assert!(matches!(result, Err(LlmError::MalformedResponse { .. })));
    }

    #[test]
    fn test_shape_mismatch_is_malformed() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Expected {
            items: Vec<u32>,
        }
        let result: Result<Expected, _> = parse_generated(r#"{"other": 1}"#);
        assert!(matches!(result, Err(LlmError::MalformedResponse { .. })));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("hi", 5), "hi");
    }
}
