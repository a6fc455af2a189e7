//! HTTP proxy server

pub mod dispatch;
pub mod error;
mod handler;
pub mod headers;
pub mod normalize;
mod passthrough;
pub mod server;
pub mod streaming;

pub use error::ProxyError;
pub use handler::ProxyHandler;
pub use server::{create_router, run_server, ProxyState};
pub use streaming::{RelayState, StreamSession};
