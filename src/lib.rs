//! chat-relay: reverse proxy for chat/completion APIs
//!
//! Features:
//! - Authorization prefix translation and workspace header injection
//! - Chat/completion body normalization (query_id, system message, defaults)
//! - Byte-transparent SSE relay with error/[DONE] termination
//! - Catch-all passthrough for every other endpoint

pub mod api;
pub mod config;
pub mod proxy;
pub mod telemetry;

pub use config::AppConfig;
pub use proxy::{create_router, run_server, ProxyState};
