//! Logging setup and request log lines

mod request_log;

pub use request_log::*;

use clap::ValueEnum;

/// Output format of the process log
#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global tracing subscriber. Call once, before the server starts.
///
/// `level` wins over `RUST_LOG`; without either, `info` is used.
pub fn init_tracing(level: Option<&str>, format: LogFormat) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
