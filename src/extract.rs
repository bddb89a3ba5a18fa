//! Structured-block extraction
//!
//! Pulls call requests out of a model response. Only the first fenced
//! ```json block counts. Its interior is parsed permissively: line and block
//! comments are dropped, and anything after the first complete JSON value is
//! ignored. A response that cannot be parsed requests nothing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

lazy_static! {
    static ref JSON_BLOCK: Regex = Regex::new(r"(?s)```json\r?\n(.*?)\r?\n```").unwrap();
}

/// Extract call requests from the first fenced JSON block in `text`
///
/// An array yields one request per element, a lone object yields one
/// request. Absent blocks and parse failures yield an empty list.
pub fn extract_calls<T: DeserializeOwned>(text: &str) -> Vec<T> {
    let Some(block) = first_block(text) else {
        return Vec::new();
    };

    let cleaned = strip_comments(block);
    let value = match serde_json::Deserializer::from_str(&cleaned)
        .into_iter::<Value>()
        .next()
    {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            debug!("Structured block is not valid JSON: {}", e);
            return Vec::new();
        }
        None => return Vec::new(),
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            debug!(kind = ?other, "Structured block is neither array nor object");
            return Vec::new();
        }
    };

    // all-or-nothing: one malformed entry discards the whole block
    items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .unwrap_or_else(|e| {
            debug!("Structured block does not describe calls: {}", e);
            Vec::new()
        })
}

/// Interior of the first fenced JSON block, if any
pub fn first_block(text: &str) -> Option<&str> {
    JSON_BLOCK
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// Drop `//`, `#` and `/* */` comments that sit outside string literals
fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '#' => skip_line(&mut chars),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

fn skip_line<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    while let Some(&c) = chars.peek() {
        if c == '\n' {
            break;
        }
        chars.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentCallRequest, ToolCallRequest};
    use serde_json::json;

    #[test]
    fn test_request_inside_prose_is_extracted() {
        let text = "Let me look that up.\n```json\n[{\"name\": \"x\", \"arguments\": {\"a\": 1}}]\n```\nDone.";
        let calls: Vec<ToolCallRequest> = extract_calls(text);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "x");
        assert_eq!(
            serde_json::Value::Object(calls[0].arguments.clone()),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_no_block_means_no_calls() {
        let calls: Vec<ToolCallRequest> = extract_calls("<answer>KBANK is healthy</answer>");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_only_first_block_is_used() {
        let text = "```json\n[{\"name\": \"first\"}]\n```\nand\n```json\n[{\"name\": \"second\"}]\n```";
        let calls: Vec<ToolCallRequest> = extract_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "first");
    }

    #[test]
    fn test_malformed_block_means_no_calls() {
        let text = "```json\n[{\"name\": \"x\", ...]\n```";
        let calls: Vec<ToolCallRequest> = extract_calls(text);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_one_bad_entry_discards_whole_block() {
        let text = "```json\n[{\"name\": \"ok\"}, {\"arguments\": {}}]\n```";
        let calls: Vec<ToolCallRequest> = extract_calls(text);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_comments_and_trailing_commentary_are_tolerated() {
        let text = r#"```json
[
    // balance sheet first
    {"index": 1, "name": "Balance Sheet Agent", "prompt": "KBANK http://x/y"}, # inline
    /* the technical view */
    {"index": 2, "name": "Technical Agent", "prompt": "KBANK trend"}
]
that is all
```"#;
        let calls: Vec<AgentCallRequest> = extract_calls(text);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].prompt, "KBANK http://x/y");
        assert_eq!(calls[1].index, Some(2));
    }

    #[test]
    fn test_single_object_is_wrapped() {
        let text = "```json\n{\"name\": \"solo\", \"arguments\": {}}\n```";
        let calls: Vec<ToolCallRequest> = extract_calls(text);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let text = "```json\n[{\"name\": \"a\"}, {\"name\": \"b\"}]\n```";
        let first: Vec<ToolCallRequest> = extract_calls(text);
        let second: Vec<ToolCallRequest> = extract_calls(text);
        assert_eq!(first, second);
    }
}
