//! Upstream dispatch: synchronous forward or streaming relay

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;

use super::error::ProxyError;
use super::server::ProxyState;
use super::streaming::StreamSession;
use crate::api::FIELD_STREAM;

/// Longest upstream error body quoted back to the client
const MAX_ERROR_BODY: usize = 2048;

#[derive(Debug, Clone)]
pub enum OutboundBody {
    Empty,
    Json(Value),
    Raw(Bytes),
}

/// Fully translated request, ready to send upstream
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

impl OutboundRequest {
    pub fn new(method: Method, url: String, headers: HeaderMap, body: OutboundBody) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// Make sure the upstream is told to stream, whatever the body said before
    pub fn force_stream(&mut self) {
        if let OutboundBody::Json(Value::Object(map)) = &mut self.body {
            map.insert(FIELD_STREAM.to_string(), Value::Bool(true));
        }
    }

    pub(crate) fn into_builder(self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let builder = client.request(self.method, &self.url).headers(self.headers);
        match self.body {
            OutboundBody::Empty => builder,
            OutboundBody::Json(json) => builder.json(&json),
            OutboundBody::Raw(bytes) => builder.body(bytes),
        }
    }
}

/// Upstream URL for `path`, keeping the query string as-is (no re-encoding)
pub fn upstream_url(base_url: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}{}?{}", base_url, path, q),
        _ => format!("{}{}", base_url, path),
    }
}

/// Single attempt with a bounded timeout. A 2xx answer is returned with its
/// status and body verbatim under `Content-Type: application/json`.
pub async fn forward_sync(
    client: &reqwest::Client,
    request: OutboundRequest,
    timeout: Duration,
) -> Result<Response, ProxyError> {
    let response = request.into_builder(client).timeout(timeout).send().await?;
    let status = response.status();

    tracing::debug!(status = %status, headers = ?response.headers(), "Received response from upstream");

    if !status.is_success() {
        return Err(protocol_error(response, timeout).await);
    }

    let body = response.bytes().await?;
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

/// Open the upstream stream. No timeout: completions may stream for as long
/// as the upstream keeps going. Anything but 200 rejects the stream before
/// the relay starts.
pub async fn forward_streaming(
    client: &reqwest::Client,
    mut request: OutboundRequest,
    path: &str,
    error_read_timeout: Duration,
) -> Result<StreamSession, ProxyError> {
    request.force_stream();
    let method = request.method.clone();

    let response = request.into_builder(client).send().await?;
    let status = response.status();

    tracing::debug!(status = %status, headers = ?response.headers(), "Upstream stream opened");

    if status != StatusCode::OK {
        return Err(protocol_error(response, error_read_timeout).await);
    }

    Ok(StreamSession::new(method, path, response.bytes_stream()))
}

/// Pick the forwarding strategy and turn its outcome into the client response.
///
/// Once `streaming` is chosen every failure is reported inside the event
/// stream (error frame + `[DONE]`), never as a JSON body.
pub async fn dispatch(
    state: &ProxyState,
    request: OutboundRequest,
    streaming: bool,
    path: &str,
) -> Response {
    let method = request.method.clone();
    let timeout = Duration::from_secs(state.config.upstream.timeout_seconds);

    tracing::debug!(
        method = %method,
        path = %path,
        upstream_url = %request.url,
        streaming = streaming,
        "Dispatching upstream request"
    );

    if streaming {
        match forward_streaming(&state.http_client, request, path, timeout).await {
            Ok(session) => session.into_response(),
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Upstream refused streaming request");
                StreamSession::rejected(method, path, &e).into_response()
            }
        }
    } else {
        match forward_sync(&state.http_client, request, timeout).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Upstream request failed");
                e.into_envelope(state.config.errors.preserve_upstream_status)
            }
        }
    }
}

async fn protocol_error(response: reqwest::Response, read_timeout: Duration) -> ProxyError {
    let status = response.status();
    let body = match tokio::time::timeout(read_timeout, response.text()).await {
        Ok(Ok(text)) => truncate(text, MAX_ERROR_BODY),
        Ok(Err(e)) => format!("<unreadable body: {}>", e),
        Err(_) => "<timed out reading body>".to_string(),
    };

    tracing::error!(status = %status, error_body = %body, "Upstream returned error response");
    ProxyError::UpstreamProtocol { status, body }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push('…');
    }
    text
}
