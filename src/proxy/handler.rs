//! Handlers for the specialized chat/completion and models endpoints

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
};
use serde_json::Value;

use super::dispatch::{dispatch, upstream_url, OutboundBody, OutboundRequest};
use super::error::ProxyError;
use super::headers::chat_headers;
use super::normalize::{normalize_chat_body, wants_stream};
use super::server::{ProxyState, MAX_BODY_BYTES};
use crate::telemetry::format_request_log;

/// Upstream paths the specialized endpoints are forwarded to, whatever alias
/// the client used
pub const UPSTREAM_CHAT_PATH: &str = "/v1/chat/completions";
pub const UPSTREAM_COMPLETIONS_PATH: &str = "/v1/completions";
pub const UPSTREAM_MODELS_PATH: &str = "/v1/models";

/// Request handler for the specialized endpoints
pub struct ProxyHandler {
    state: ProxyState,
}

impl ProxyHandler {
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Chat or completion request: normalize the body, then dispatch
    /// synchronously or as a stream depending on its `stream` flag.
    pub async fn handle_completion(&self, req: Request<Body>, upstream_path: &str) -> Response {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let path = uri.path();
        let headers = req.headers().clone();
        let upstream = &self.state.config.upstream;

        tracing::debug!(method = %method, path = %path, "Processing completion request");

        let body_bytes = match to_bytes(req.into_body(), MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let e = ProxyError::BodyRead(e.to_string());
                tracing::error!(method = %method, path = %path, error = %e, "Failed to read request body");
                return e.into_envelope(self.state.config.errors.preserve_upstream_status);
            }
        };

        let url = upstream_url(upstream.base_url(), upstream_path, uri.query());

        let normalized = serde_json::from_slice::<Value>(&body_bytes)
            .map_err(|e| ProxyError::ClientInput(e.to_string()))
            .and_then(|json| normalize_chat_body(json, &self.state.config.defaults));

        let (outbound, streaming) = match normalized {
            Ok(body) => {
                let streaming = wants_stream(&body);
                tracing::info!("{}", format_request_log(path, &body));
                let headers = chat_headers(&headers, upstream, streaming);
                (
                    OutboundRequest::new(method, url, headers, OutboundBody::Json(body)),
                    streaming,
                )
            }
            Err(e) => {
                // Not ours to validate: the upstream gets the body as sent
                tracing::warn!(
                    method = %method,
                    path = %path,
                    error = %e,
                    "Request body not normalizable, forwarding unchanged"
                );
                let headers = chat_headers(&headers, upstream, false);
                (
                    OutboundRequest::new(method, url, headers, OutboundBody::Raw(body_bytes)),
                    false,
                )
            }
        };

        dispatch(&self.state, outbound, streaming, path).await
    }

    /// Model listing: a plain synchronous forward with translated credentials
    pub async fn handle_models(&self, req: Request<Body>) -> Response {
        let uri = req.uri().clone();
        let path = uri.path();
        let upstream = &self.state.config.upstream;

        tracing::debug!(path = %path, "Processing models request");

        let mut headers = chat_headers(req.headers(), upstream, false);
        headers.remove(header::CONTENT_TYPE);

        let url = upstream_url(upstream.base_url(), UPSTREAM_MODELS_PATH, uri.query());
        let outbound = OutboundRequest::new(Method::GET, url, headers, OutboundBody::Empty);

        dispatch(&self.state, outbound, false, path).await
    }
}
