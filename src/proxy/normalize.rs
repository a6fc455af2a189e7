//! Fill-in rules for chat/completion request bodies

use serde_json::Value;

use super::error::ProxyError;
use crate::api::{
    new_query_id, ChatMessage, FIELD_MESSAGES, FIELD_MODEL, FIELD_QUERY_ID, FIELD_STREAM,
};
use crate::config::DefaultsConfig;

/// Apply the four normalization rules to a chat/completion body.
///
/// 1. missing or empty `query_id` gets a fresh `query_<uuid>`
/// 2. a `messages` array of exactly one entry gets an empty system message
///    prepended, whatever the role of that entry
/// 3. missing or empty `model` gets the configured default
/// 4. missing `stream` gets the configured default
///
/// Nothing else is inspected. Only a non-object body is rejected.
pub fn normalize_chat_body(body: Value, defaults: &DefaultsConfig) -> Result<Value, ProxyError> {
    let Value::Object(mut map) = body else {
        return Err(ProxyError::ClientInput(format!(
            "expected a JSON object, got {}",
            json_kind(&body)
        )));
    };

    if is_blank(map.get(FIELD_QUERY_ID)) {
        map.insert(FIELD_QUERY_ID.to_string(), Value::String(new_query_id()));
    }

    if let Some(Value::Array(messages)) = map.get_mut(FIELD_MESSAGES) {
        if messages.len() == 1 {
            let system = serde_json::to_value(ChatMessage::empty_system())
                .map_err(|e| ProxyError::ClientInput(e.to_string()))?;
            messages.insert(0, system);
        }
    }

    if is_blank(map.get(FIELD_MODEL)) {
        map.insert(FIELD_MODEL.to_string(), Value::String(defaults.model.clone()));
    }

    if !map.contains_key(FIELD_STREAM) {
        map.insert(FIELD_STREAM.to_string(), Value::Bool(defaults.stream));
    }

    Ok(Value::Object(map))
}

/// The `stream` flag as the dispatcher sees it. Anything but `true` is synchronous.
pub fn wants_stream(body: &Value) -> bool {
    body.get(FIELD_STREAM).and_then(Value::as_bool).unwrap_or(false)
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::QUERY_ID_PREFIX;
    use serde_json::json;

    fn defaults() -> DefaultsConfig {
        DefaultsConfig {
            model: "default-model".to_string(),
            stream: true,
        }
    }

    #[test]
    fn test_generates_query_id() {
        let body = normalize_chat_body(json!({"messages": []}), &defaults()).unwrap();
        let id = body["query_id"].as_str().unwrap();
        let uuid = id.strip_prefix(QUERY_ID_PREFIX).unwrap();
        assert!(uuid::Uuid::parse_str(uuid).is_ok());
    }

    #[test]
    fn test_replaces_empty_query_id() {
        let body = normalize_chat_body(json!({"query_id": ""}), &defaults()).unwrap();
        assert!(body["query_id"].as_str().unwrap().starts_with(QUERY_ID_PREFIX));
    }

    #[test]
    fn test_keeps_existing_query_id() {
        let body = normalize_chat_body(json!({"query_id": "mine"}), &defaults()).unwrap();
        assert_eq!(body["query_id"], "mine");
    }

    #[test]
    fn test_prepends_system_message_to_single_message() {
        let body = normalize_chat_body(
            json!({"messages": [{"role": "user", "content": "hi"}]}),
            &defaults(),
        )
        .unwrap();

        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": ""},
                {"role": "user", "content": "hi"}
            ])
        );
    }

    #[test]
    fn test_prepends_even_when_sole_message_is_system() {
        let body = normalize_chat_body(
            json!({"messages": [{"role": "system", "content": "be brief"}]}),
            &defaults(),
        )
        .unwrap();

        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": ""},
                {"role": "system", "content": "be brief"}
            ])
        );
    }

    #[test]
    fn test_leaves_other_message_counts_alone() {
        let two = json!([
            {"role": "user", "content": "a"},
            {"role": "assistant", "content": "b"}
        ]);
        let body = normalize_chat_body(json!({"messages": two.clone()}), &defaults()).unwrap();
        assert_eq!(body["messages"], two);

        let body = normalize_chat_body(json!({"messages": []}), &defaults()).unwrap();
        assert_eq!(body["messages"], json!([]));
    }

    #[test]
    fn test_defaults_model_and_stream() {
        let body = normalize_chat_body(json!({"model": ""}), &defaults()).unwrap();
        assert_eq!(body["model"], "default-model");
        assert_eq!(body["stream"], true);

        let body = normalize_chat_body(json!({}), &defaults()).unwrap();
        assert_eq!(body["model"], "default-model");
    }

    #[test]
    fn test_keeps_explicit_model_and_stream() {
        let body =
            normalize_chat_body(json!({"model": "gpt-x", "stream": false}), &defaults()).unwrap();
        assert_eq!(body["model"], "gpt-x");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_preserves_unknown_fields() {
        let body = normalize_chat_body(json!({"temperature": 0.2, "tools": []}), &defaults())
            .unwrap();
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["tools"], json!([]));
    }

    #[test]
    fn test_rejects_non_object() {
        let err = normalize_chat_body(json!([1, 2]), &defaults()).unwrap_err();
        assert!(matches!(err, ProxyError::ClientInput(_)));
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_wants_stream() {
        assert!(wants_stream(&json!({"stream": true})));
        assert!(!wants_stream(&json!({"stream": false})));
        assert!(!wants_stream(&json!({"stream": "yes"})));
        assert!(!wants_stream(&json!({})));
    }
}
