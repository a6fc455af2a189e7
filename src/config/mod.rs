mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub errors: ErrorsConfig,
}

/// Proxy listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// How long in-flight requests may keep running after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

fn default_shutdown_grace() -> u64 {
    30
}

/// Upstream completion service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Full upstream URL (e.g., "https://example.com:4234" or "http://localhost:8080")
    pub url: String,
    /// Timeout for non-streaming requests, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// TLS configuration options
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Workspace id injected into every upstream request when set
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default = "default_workspace_header")]
    pub workspace_header: String,
}

/// TLS configuration for upstream connections
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Accept invalid certificates (self-signed, expired)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Path to custom CA certificate (PEM format)
    pub ca_cert_path: Option<String>,
    /// Path to client certificate for mTLS
    pub client_cert_path: Option<String>,
    /// Path to client private key for mTLS
    pub client_key_path: Option<String>,
}

fn default_timeout() -> u64 {
    60
}

fn default_workspace_header() -> String {
    "x-workspace-id".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            timeout_seconds: default_timeout(),
            tls: None,
            auth: AuthConfig::default(),
            workspace_id: None,
            workspace_header: default_workspace_header(),
        }
    }
}

impl UpstreamConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.url.to_lowercase().starts_with("https://")
    }
}

/// Where the upstream credential comes from
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AuthPolicy {
    /// Reuse the client's token with the client prefix swapped for the upstream one
    #[default]
    Passthrough,
    /// Ignore the client's token and send `static_token` instead
    Static,
}

/// Authorization header translation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub policy: AuthPolicy,
    #[serde(default = "default_client_prefix")]
    pub client_prefix: String,
    #[serde(default = "default_upstream_prefix")]
    pub upstream_prefix: String,
    #[serde(default)]
    pub static_token: Option<String>,
}

fn default_client_prefix() -> String {
    "Bearer ".to_string()
}

fn default_upstream_prefix() -> String {
    "Bearer ".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            policy: AuthPolicy::default(),
            client_prefix: default_client_prefix(),
            upstream_prefix: default_upstream_prefix(),
            static_token: None,
        }
    }
}

/// Values filled into chat/completion bodies that omit them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub stream: bool,
}

fn default_model() -> String {
    "default".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            stream: false,
        }
    }
}

/// Client-facing path aliases for the specialized endpoints, relative to `/v1/`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutesConfig {
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_models_path")]
    pub models_path: String,
}

fn default_chat_path() -> String {
    "chat/completions".to_string()
}

fn default_models_path() -> String {
    "models".to_string()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            chat_path: default_chat_path(),
            models_path: default_models_path(),
        }
    }
}

impl RoutesConfig {
    /// Route for the chat endpoint, e.g. `/v1/chat/completions`
    pub fn chat_route(&self) -> String {
        format!("/v1/{}", self.chat_path.trim_matches('/'))
    }

    /// Route for the models endpoint, e.g. `/v1/models`
    pub fn models_route(&self) -> String {
        format!("/v1/{}", self.models_path.trim_matches('/'))
    }
}

/// Error envelope policy for the synchronous path
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ErrorsConfig {
    /// Report upstream error statuses as-is instead of collapsing them to 500
    #[serde(default)]
    pub preserve_upstream_status: bool,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.upstream.url).map_err(|e| {
            ConfigError::Validation(format!("invalid upstream url '{}': {}", self.upstream.url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "unsupported upstream url scheme '{}': only http and https are allowed",
                url.scheme()
            )));
        }

        if self.upstream.auth.policy == AuthPolicy::Static
            && self.upstream.auth.static_token.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::Validation(
                "upstream.auth.policy is 'static' but upstream.auth.static_token is not set"
                    .to_string(),
            ));
        }

        if let Some(ref workspace_id) = self.upstream.workspace_id {
            if axum::http::HeaderName::from_bytes(self.upstream.workspace_header.as_bytes()).is_err() {
                return Err(ConfigError::Validation(format!(
                    "invalid workspace header name '{}'",
                    self.upstream.workspace_header
                )));
            }
            if axum::http::HeaderValue::from_str(workspace_id).is_err() {
                return Err(ConfigError::Validation(format!(
                    "upstream.workspace_id {:?} is not a valid header value",
                    workspace_id
                )));
            }
        }

        let chat = self.routes.chat_path.trim_matches('/');
        let models = self.routes.models_path.trim_matches('/');
        if chat.is_empty() || models.is_empty() {
            return Err(ConfigError::Validation(
                "routes.chat_path and routes.models_path must not be empty".to_string(),
            ));
        }
        if chat == models || chat == "completions" || models == "completions" {
            return Err(ConfigError::Validation(format!(
                "route aliases must be distinct from each other and from 'completions' (chat_path={}, models_path={})",
                chat, models
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
pub(crate) fn test_config(upstream_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 8066,
            host: "127.0.0.1".to_string(),
            shutdown_grace_seconds: 1,
        },
        upstream: UpstreamConfig {
            url: upstream_url.to_string(),
            ..UpstreamConfig::default()
        },
        defaults: DefaultsConfig::default(),
        routes: RoutesConfig::default(),
        errors: ErrorsConfig::default(),
    }
}
