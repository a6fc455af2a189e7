//! Chat/completion request body fields touched by the proxy
//!
//! Bodies are otherwise handled as opaque `serde_json::Value`s so unknown
//! fields reach the upstream untouched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FIELD_QUERY_ID: &str = "query_id";
pub const FIELD_MESSAGES: &str = "messages";
pub const FIELD_MODEL: &str = "model";
pub const FIELD_STREAM: &str = "stream";

/// Prefix of generated correlation ids
pub const QUERY_ID_PREFIX: &str = "query_";

/// Single chat message
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// System message with empty content
    pub fn empty_system() -> Self {
        Self {
            role: "system".to_string(),
            content: String::new(),
        }
    }
}

/// Generate a fresh `query_<uuid>` correlation id
pub fn new_query_id() -> String {
    format!("{}{}", QUERY_ID_PREFIX, Uuid::new_v4())
}
