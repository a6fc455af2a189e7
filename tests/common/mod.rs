//! Mock upstream completion service for integration tests
//!
//! Every request is recorded. Tests queue the responses the upstream should
//! give, in order; an empty queue answers `200 {}`.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::Response,
    Router,
};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use chat_relay::config::{
    AppConfig, DefaultsConfig, ErrorsConfig, RoutesConfig, ServerConfig, UpstreamConfig,
};

/// What the mock upstream answers with
#[derive(Debug, Clone)]
pub enum MockResponse {
    Full {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: Bytes,
    },
    /// SSE body sent chunk by chunk with a short pause between chunks,
    /// optionally aborting the connection after the last one
    Stream {
        chunks: Vec<&'static str>,
        reset_after: bool,
    },
}

impl MockResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self::Full {
            status: 200,
            headers: vec![("content-type", "application/json")],
            body: Bytes::from(body.into()),
        }
    }

    pub fn error(status: u16, body: impl Into<String>) -> Self {
        Self::Full {
            status,
            headers: vec![("content-type", "application/json")],
            body: Bytes::from(body.into()),
        }
    }

    pub fn stream(chunks: Vec<&'static str>) -> Self {
        Self::Stream {
            chunks,
            reset_after: false,
        }
    }

    pub fn stream_then_reset(chunks: Vec<&'static str>) -> Self {
        Self::Stream {
            chunks,
            reset_after: true,
        }
    }
}

/// A request received by the mock upstream
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReceivedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("upstream received a non-JSON body")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Default)]
pub struct BackendState {
    pub response_queue: VecDeque<MockResponse>,
    pub received_requests: Vec<ReceivedRequest>,
}

pub type SharedBackendState = Arc<Mutex<BackendState>>;

pub struct MockUpstream {
    pub url: String,
    pub state: SharedBackendState,
}

impl MockUpstream {
    /// Start a mock upstream on an ephemeral port
    pub async fn start() -> Self {
        let state: SharedBackendState = Arc::new(Mutex::new(BackendState::default()));

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock upstream failed");
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn queue(&self, response: MockResponse) {
        self.state.lock().unwrap().response_queue.push_back(response);
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.lock().unwrap().received_requests.clone()
    }

    pub fn single_request(&self) -> ReceivedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected one upstream request, got {:?}", requests);
        requests.into_iter().next().unwrap()
    }
}

async fn handle(State(state): State<SharedBackendState>, req: Request<Body>) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let headers = req.headers().clone();
    let body = to_bytes(req.into_body(), 10 * 1024 * 1024).await.unwrap_or_default();

    let mock = {
        let mut state = state.lock().unwrap();
        state.received_requests.push(ReceivedRequest {
            method,
            path,
            query,
            headers,
            body,
        });
        state
            .response_queue
            .pop_front()
            .unwrap_or_else(|| MockResponse::json("{}"))
    };

    match mock {
        MockResponse::Full {
            status,
            headers,
            body,
        } => {
            let mut response = Response::builder().status(StatusCode::from_u16(status).unwrap());
            for (name, value) in headers {
                response = response.header(name, value);
            }
            response.body(Body::from(body)).unwrap()
        }
        MockResponse::Stream {
            chunks,
            reset_after,
        } => {
            let stream = futures::stream::unfold(
                (chunks.into_iter(), reset_after),
                |(mut chunks, reset_after)| async move {
                    // Pause so each chunk is flushed on its own
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    match chunks.next() {
                        Some(chunk) => Some((Ok(Bytes::from(chunk)), (chunks, reset_after))),
                        None if reset_after => Some((
                            Err(std::io::Error::new(
                                std::io::ErrorKind::ConnectionReset,
                                "connection reset by mock upstream",
                            )),
                            (chunks, false),
                        )),
                        None => None,
                    }
                },
            );

            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .body(Body::from_stream(stream))
                .unwrap()
        }
    }
}

/// Config pointing at `upstream_url` with distinct client/upstream prefixes
pub fn test_config(upstream_url: &str) -> AppConfig {
    let mut upstream = UpstreamConfig {
        url: upstream_url.to_string(),
        timeout_seconds: 5,
        ..UpstreamConfig::default()
    };
    upstream.auth.client_prefix = "Bearer sk-".to_string();
    upstream.auth.upstream_prefix = "Bearer up-".to_string();

    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            shutdown_grace_seconds: 1,
        },
        upstream,
        defaults: DefaultsConfig {
            model: "default-model".to_string(),
            stream: false,
        },
        routes: RoutesConfig::default(),
        errors: ErrorsConfig::default(),
    }
}
