//! Main proxy server implementation

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handler::{ProxyHandler, UPSTREAM_CHAT_PATH, UPSTREAM_COMPLETIONS_PATH};
use super::passthrough::forward_passthrough;
use crate::config::AppConfig;

/// Largest inbound body read into memory
pub const MAX_BODY_BYTES: usize = 1024 * 1024 * 100;

/// Shared state for the proxy. Read-only after startup.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    /// Pooled client reused for every upstream call
    pub http_client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let http_client = build_http_client(&config)?;
        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }
}

/// Build an HTTP client with TLS configuration.
///
/// No overall timeout here: streaming requests are unbounded and the
/// synchronous paths set their own per request.
pub fn build_http_client(config: &AppConfig) -> Result<reqwest::Client, Box<dyn std::error::Error>> {
    let mut client_builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.upstream.timeout_seconds))
        .pool_max_idle_per_host(10)
        // 3xx answers go back to the client as-is
        .redirect(reqwest::redirect::Policy::none());

    if let Some(ref tls) = config.upstream.tls {
        if tls.accept_invalid_certs {
            client_builder = client_builder.danger_accept_invalid_certs(true);
            tracing::warn!("TLS: Accepting invalid certificates (use only for development/testing)");
        }

        if let Some(ref ca_path) = tls.ca_cert_path {
            let ca_cert = std::fs::read(ca_path)?;
            let ca_cert = reqwest::Certificate::from_pem(&ca_cert)?;
            client_builder = client_builder.add_root_certificate(ca_cert);
            tracing::info!("TLS: Loaded custom CA certificate from {}", ca_path);
        }

        // mTLS needs both halves
        if let (Some(cert_path), Some(key_path)) = (&tls.client_cert_path, &tls.client_key_path) {
            let cert_pem = std::fs::read(cert_path)?;
            let key_pem = std::fs::read(key_path)?;

            let identity = reqwest::Identity::from_pem(&[cert_pem, key_pem].concat())?;
            client_builder = client_builder.identity(identity);
            tracing::info!("TLS: Loaded client certificate from {} for mTLS", cert_path);
        }
    }

    Ok(client_builder.build()?)
}

/// Create the router with all routes configured.
///
/// Other methods on the specialized paths fall through to the catch-all
/// rather than answering 405.
pub fn create_router(state: ProxyState) -> Router {
    let chat_route = state.config.routes.chat_route();
    let models_route = state.config.routes.models_route();

    Router::new()
        .route("/health", get(health_handler))
        .route(&chat_route, post(chat_handler).fallback(passthrough_handler))
        .route(
            "/v1/completions",
            post(completions_handler).fallback(passthrough_handler),
        )
        .route(&models_route, get(models_handler).fallback(passthrough_handler))
        .fallback(passthrough_handler)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the proxy server until a shutdown signal, then drain in-flight
/// requests for at most `server.shutdown_grace_seconds`.
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let upstream_url = config.upstream.base_url().to_string();
    let chat_route = config.routes.chat_route();
    let models_route = config.routes.models_route();

    let state = ProxyState::new(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("chat-relay listening on {}", addr);
    tracing::info!("Proxying to {}", upstream_url);
    tracing::info!(
        chat = %chat_route,
        completions = "/v1/completions",
        models = %models_route,
        "Specialized routes"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(());
    tracing::info!(grace_seconds = grace.as_secs(), "Draining in-flight requests");

    match tokio::time::timeout(grace, &mut server_task).await {
        Ok(result) => {
            result??;
            tracing::info!("Proxy server shut down gracefully");
        }
        Err(_) => {
            tracing::warn!(
                grace_seconds = grace.as_secs(),
                "In-flight requests still running after grace period, aborting"
            );
            server_task.abort();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

/// Liveness of the proxy itself; not forwarded
async fn health_handler() -> &'static str {
    "OK"
}

async fn chat_handler(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    ProxyHandler::new(state)
        .handle_completion(req, UPSTREAM_CHAT_PATH)
        .await
}

async fn completions_handler(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    ProxyHandler::new(state)
        .handle_completion(req, UPSTREAM_COMPLETIONS_PATH)
        .await
}

async fn models_handler(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    ProxyHandler::new(state).handle_models(req).await
}

/// Catch-all for every route without specialized handling
async fn passthrough_handler(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    forward_passthrough(&state, req).await
}
