//! One-line summaries of normalized chat/completion requests

use serde_json::Value;

use crate::api::{FIELD_MESSAGES, FIELD_MODEL, FIELD_QUERY_ID, FIELD_STREAM};

/// Format a request log line in compact form, e.g.
/// `→ /v1/chat/completions model=m msgs=2 stream query_id=query_… "hello"`
pub fn format_request_log(path: &str, body: &Value) -> String {
    let model = body.get(FIELD_MODEL).and_then(Value::as_str).unwrap_or("unknown");

    let msg_count = body
        .get(FIELD_MESSAGES)
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0);

    let mut parts = vec![
        path.to_string(),
        format!("model={}", model),
        format!("msgs={}", msg_count),
    ];

    if body.get(FIELD_STREAM).and_then(Value::as_bool).unwrap_or(false) {
        parts.push("stream".to_string());
    }

    if let Some(query_id) = body.get(FIELD_QUERY_ID).and_then(Value::as_str) {
        parts.push(format!("query_id={}", query_id));
    }

    if let Some(msg) = first_user_message(body) {
        parts.push(format!("\"{}\"", msg));
    }

    format!("→ {}", parts.join(" "))
}

/// First user message, whitespace-collapsed and truncated
fn first_user_message(body: &Value) -> Option<String> {
    let messages = body.get(FIELD_MESSAGES)?.as_array()?;
    let msg = messages
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))?;

    let content = message_text(msg)?;
    Some(truncate_message(&collapse_whitespace(&content)))
}

/// Text of a message whose content is a string or an array of text parts
fn message_text(msg: &Value) -> Option<String> {
    let content = msg.get("content")?;

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    let texts: Vec<&str> = content
        .as_array()?
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    (!texts.is_empty()).then(|| texts.join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Up to 100 chars as-is, otherwise the first 25 + " ... " + the last 75
fn truncate_message(s: &str) -> String {
    const MAX_TOTAL: usize = 100;
    const PREFIX_LEN: usize = 25;
    const SUFFIX_LEN: usize = 75;

    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= MAX_TOTAL {
        return s.to_string();
    }

    let prefix: String = chars[..PREFIX_LEN].iter().collect();
    let suffix: String = chars[chars.len() - SUFFIX_LEN..].iter().collect();
    format!("{} ... {}", prefix, suffix)
}
