//! Catch-all passthrough for every endpoint without specialized handling
//!
//! Only headers are translated. Request and response bodies are relayed as
//! raw bytes and never decoded, so compressed or binary payloads survive.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;

use super::dispatch::{upstream_url, OutboundBody, OutboundRequest};
use super::error::ProxyError;
use super::headers::translate_headers;
use super::server::{ProxyState, MAX_BODY_BYTES};

/// Forward `req` to the same path on the upstream and relay the answer back.
///
/// The timeout bounds the wait for the upstream's response headers; the body
/// is then streamed through for as long as the upstream sends it.
pub async fn forward_passthrough(state: &ProxyState, req: Request<Body>) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path();
    let query = uri.query();
    let preserve_status = state.config.errors.preserve_upstream_status;

    tracing::debug!(method = %method, path = %path, query = ?query, "Pass-through request");

    let headers = translate_headers(req.headers(), &state.config.upstream);

    let body = if method == Method::GET || method == Method::HEAD {
        OutboundBody::Empty
    } else {
        match to_bytes(req.into_body(), MAX_BODY_BYTES).await {
            Ok(bytes) => OutboundBody::Raw(bytes),
            Err(e) => {
                let e = ProxyError::BodyRead(e.to_string());
                tracing::error!(method = %method, path = %path, error = %e, "Failed to read pass-through body");
                return e.into_envelope(preserve_status);
            }
        }
    };

    let url = upstream_url(state.config.upstream.base_url(), path, query);
    tracing::debug!(upstream_url = %url, "Building pass-through request");

    let timeout = Duration::from_secs(state.config.upstream.timeout_seconds);
    let send = OutboundRequest::new(method.clone(), url, headers, body)
        .into_builder(&state.http_client)
        .send();

    let upstream = match tokio::time::timeout(timeout, send).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            let e = ProxyError::from(e);
            tracing::error!(method = %method, path = %path, error = %e, "Pass-through request failed");
            return e.into_envelope(preserve_status);
        }
        Err(_) => {
            let e = ProxyError::UpstreamTimeout(timeout);
            tracing::error!(method = %method, path = %path, error = %e, "Pass-through request timed out");
            return e.into_envelope(preserve_status);
        }
    };

    let status = upstream.status();
    tracing::debug!(status = %status, "Pass-through response");

    let mut response = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        // Framing is redone by our own connection to the client
        if name == header::TRANSFER_ENCODING || name == header::CONNECTION {
            continue;
        }
        response = response.header(name, value);
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
