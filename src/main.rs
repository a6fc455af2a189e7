//! chat-relay: reverse proxy for chat/completion APIs
//!
//! Sits in front of an upstream completion service and:
//! - rewrites client credentials into the upstream's scheme
//! - fills in missing chat/completion body fields
//! - relays token streams byte-for-byte

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use chat_relay::{
    config::{AppConfig, AuthPolicy},
    proxy::headers::translate_authorization,
    run_server,
    telemetry::{init_tracing, LogFormat},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(version)]
#[command(about = "Reverse proxy that translates chat/completion requests for an upstream service")]
#[command(long_about = "
chat-relay accepts chat/completion API requests and forwards them to a
differently-configured upstream completion service:
  - Authorization prefix translation (token passthrough or static token)
  - query_id / model / stream defaults and single-message padding
  - Live SSE relay with error + [DONE] termination on failure
  - Verbatim passthrough for every other endpoint

Example usage:
  chat-relay run --config config.yaml
  chat-relay check-config --config config.yaml
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override upstream URL (e.g., "https://example.com:4234")
        #[arg(long)]
        upstream_url: Option<String>,
    },

    /// Validate configuration file
    CheckConfig,

    /// Test connection to the upstream service
    TestUpstream,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.map(|l| l.to_string());
    init_tracing(level.as_deref(), cli.log_format);

    match cli.command {
        Commands::Run { port, upstream_url } => {
            run_proxy(&cli.config, port, upstream_url).await?;
        }
        Commands::CheckConfig => {
            check_config(&cli.config)?;
        }
        Commands::TestUpstream => {
            test_upstream(&cli.config).await?;
        }
    }

    Ok(())
}

/// Run the proxy server
async fn run_proxy(
    config_path: &Path,
    port_override: Option<u16>,
    upstream_url_override: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = upstream_url_override {
        config.upstream.url = url;
        config.validate()?;
    }

    tracing::info!("Loaded configuration from {:?}", config_path);
    tracing::info!(
        auth_policy = ?config.upstream.auth.policy,
        workspace = config.upstream.workspace_id.is_some(),
        default_model = %config.defaults.model,
        default_stream = config.defaults.stream,
        "Translation configured"
    );

    run_server(config)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))
}

/// Validate configuration file
fn check_config(config_path: &Path) -> anyhow::Result<()> {
    match AppConfig::from_file(config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid\n");
            println!("Server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("  Shutdown grace: {}s", config.server.shutdown_grace_seconds);
            println!("\nUpstream:");
            println!("  URL: {}", config.upstream.url);
            println!("  TLS: {}", if config.upstream.is_tls() { "enabled" } else { "disabled" });
            if let Some(ref tls) = config.upstream.tls {
                if tls.accept_invalid_certs {
                    println!("  TLS: Accepting invalid certificates");
                }
                if let Some(ref ca) = tls.ca_cert_path {
                    println!("  TLS CA: {}", ca);
                }
                if let Some(ref cert) = tls.client_cert_path {
                    println!("  TLS Client Cert: {}", cert);
                }
            }
            println!("  Timeout: {}s", config.upstream.timeout_seconds);
            println!("  Auth policy: {:?}", config.upstream.auth.policy);
            println!("  Client prefix: {:?}", config.upstream.auth.client_prefix);
            println!("  Upstream prefix: {:?}", config.upstream.auth.upstream_prefix);
            if let Some(ref ws) = config.upstream.workspace_id {
                println!("  Workspace: {} = {}", config.upstream.workspace_header, ws);
            }
            println!("\nDefaults:");
            println!("  Model: {}", config.defaults.model);
            println!("  Stream: {}", config.defaults.stream);
            println!("\nRoutes:");
            println!("  Chat: POST {}", config.routes.chat_route());
            println!("  Completions: POST /v1/completions");
            println!("  Models: GET {}", config.routes.models_route());
            println!("  Everything else: passthrough");
            println!("\nErrors:");
            println!(
                "  Preserve upstream status: {}",
                config.errors.preserve_upstream_status
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Test connection to the upstream models endpoint
async fn test_upstream(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let models_url = format!("{}/v1/models", config.upstream.base_url());

    println!("Testing connection to upstream: {}", models_url);

    let client = chat_relay::proxy::server::build_http_client(&config)
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;

    let mut request = client
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5));

    // Only a static token can be tested without a client credential
    if config.upstream.auth.policy == AuthPolicy::Static {
        if let Some(auth) = translate_authorization(None, &config.upstream.auth) {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
    }
    if let Some(ref ws) = config.upstream.workspace_id {
        request = request.header(config.upstream.workspace_header.as_str(), ws);
    }

    match request.send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("✓ Upstream is reachable");
                println!("  Status: {}", resp.status());
                if let Ok(json) = resp.json::<serde_json::Value>().await {
                    if let Some(data) = json.get("data").and_then(|d| d.as_array()) {
                        println!("  Available models: {}", data.len());
                        for model in data.iter().take(5) {
                            if let Some(id) = model.get("id").and_then(|i| i.as_str()) {
                                println!("    - {}", id);
                            }
                        }
                    }
                }
            } else {
                println!("✗ Upstream returned error status: {}", resp.status());
            }
        }
        Err(e) => {
            println!("✗ Failed to connect to upstream: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config(config_path: &Path) -> anyhow::Result<AppConfig> {
    AppConfig::from_file(config_path).with_context(|| {
        format!(
            "failed to load {} (copy config.yaml.default to get started)",
            config_path.display()
        )
    })
}
