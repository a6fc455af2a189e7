//! Proxy error taxonomy and the client-visible error shapes

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::json;

/// Terminal frame closing every stream that ends on an error path
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Body on a specialized endpoint is not a JSON object
    #[error("invalid request body: {0}")]
    ClientInput(String),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// Connection refused, timeout, DNS failure
    #[error("upstream request failed: {0}")]
    UpstreamTransport(#[from] reqwest::Error),

    #[error("upstream did not respond within {}s", .0.as_secs())]
    UpstreamTimeout(std::time::Duration),

    #[error("upstream returned {status}: {body}")]
    UpstreamProtocol { status: StatusCode, body: String },

    /// Failure after the relay has started
    #[error("upstream stream failed: {0}")]
    StreamingRelay(String),
}

impl ProxyError {
    /// Status for the error envelope. Everything collapses to 500 unless
    /// `preserve_upstream_status` is set and the upstream answered with an error.
    pub fn status(&self, preserve_upstream_status: bool) -> StatusCode {
        match self {
            ProxyError::UpstreamProtocol { status, .. }
                if preserve_upstream_status
                    && (status.is_client_error() || status.is_server_error()) =>
            {
                *status
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_envelope(self, preserve_upstream_status: bool) -> Response {
        error_envelope(self.status(preserve_upstream_status), &self.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.into_envelope(false)
    }
}

/// `{"error": {"message": ..., "type": "server_error"}}`
pub fn envelope_body(message: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": "server_error",
        }
    })
}

pub fn error_envelope(status: StatusCode, message: &str) -> Response {
    let body = envelope_body(message).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Error event followed by the `[DONE]` sentinel
pub fn error_frames(message: &str) -> [Bytes; 2] {
    let event = json!({ "error": { "message": message } });
    [
        Bytes::from(format!("data: {}\n\n", event)),
        Bytes::from_static(DONE_FRAME.as_bytes()),
    ]
}
