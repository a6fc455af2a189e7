//! Streaming (SSE) relay
//!
//! A [`StreamSession`] owns the upstream byte stream and is itself the client
//! response body. hyper pulls from it only when the client socket can take
//! more, so a slow client throttles upstream reads instead of growing a
//! buffer, and a disconnected client drops the session together with the
//! upstream response.

use axum::{
    body::Body,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{stream::BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::error::{error_frames, ProxyError};

/// Lifecycle of one streaming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Init,
    Relaying,
    /// Upstream stream ended normally
    ClosedOk,
    /// Upstream stream errored mid-flight
    ClosedErr,
    /// Upstream refused before any data; only the error frames are sent
    Rejected,
}

pub struct StreamSession {
    upstream: Option<BoxStream<'static, Result<Bytes, String>>>,
    pending: VecDeque<Bytes>,
    state: RelayState,
    method: Method,
    path: String,
    bytes_relayed: u64,
}

impl StreamSession {
    pub fn new<S, E>(method: Method, path: impl Into<String>, upstream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        Self {
            upstream: Some(upstream.map(|chunk| chunk.map_err(|e| e.to_string())).boxed()),
            pending: VecDeque::new(),
            state: RelayState::Init,
            method,
            path: path.into(),
            bytes_relayed: 0,
        }
    }

    /// Session for a stream that never started: error frame + `[DONE]` only
    pub fn rejected(method: Method, path: impl Into<String>, error: &ProxyError) -> Self {
        Self {
            upstream: None,
            pending: error_frames(&error.to_string()).into_iter().collect(),
            state: RelayState::Rejected,
            method,
            path: path.into(),
            bytes_relayed: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn fail(&mut self, error: String) {
        let error = ProxyError::StreamingRelay(error);
        tracing::error!(
            method = %self.method,
            path = %self.path,
            bytes_relayed = self.bytes_relayed,
            error = %error,
            "Upstream stream failed mid-flight"
        );
        self.upstream = None;
        self.state = RelayState::ClosedErr;
        self.pending.extend(error_frames(&error.to_string()));
    }
}

impl Stream for StreamSession {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Some(frame) = this.pending.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }

        loop {
            let Some(upstream) = this.upstream.as_mut() else {
                return Poll::Ready(None);
            };

            match upstream.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    this.state = RelayState::Relaying;
                    this.bytes_relayed += chunk.len() as u64;
                    tracing::trace!("Relaying SSE chunk ({} bytes)", chunk.len());
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.fail(e);
                    return Poll::Ready(this.pending.pop_front().map(Ok));
                }
                Poll::Ready(None) => {
                    this.upstream = None;
                    this.state = RelayState::ClosedOk;
                    tracing::debug!(
                        method = %this.method,
                        path = %this.path,
                        bytes_relayed = this.bytes_relayed,
                        "Upstream stream completed"
                    );
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.upstream.is_some() && self.state == RelayState::Relaying {
            tracing::info!(
                method = %self.method,
                path = %self.path,
                bytes_relayed = self.bytes_relayed,
                "Client disconnected mid-stream, releasing upstream connection"
            );
        }
    }
}

impl IntoResponse for StreamSession {
    fn into_response(mut self) -> Response {
        if self.state == RelayState::Init {
            self.state = RelayState::Relaying;
        }

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(self))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}
