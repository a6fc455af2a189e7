//! Inbound → upstream header translation
//!
//! Everything here is a pure function of (inbound headers, config). The
//! client's `Host` never reaches the upstream (reqwest derives it from the
//! target URL) and `Authorization` is always rebuilt, never copied.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::{AuthConfig, AuthPolicy, UpstreamConfig};

/// Connection-level headers the HTTP client recomputes for the outbound hop
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "content-length",
    "upgrade",
];

/// Build the upstream `Authorization` value from the client's.
///
/// The client prefix is stripped when present, then the upstream prefix is
/// prepended to the remaining token (`Passthrough`) or to the configured
/// static token (`Static`). `Passthrough` without an inbound header yields
/// `None`.
pub fn translate_authorization(inbound: Option<&str>, auth: &AuthConfig) -> Option<String> {
    let token = match auth.policy {
        AuthPolicy::Passthrough => {
            let inbound = inbound?;
            inbound
                .strip_prefix(auth.client_prefix.as_str())
                .unwrap_or(inbound)
                .to_string()
        }
        AuthPolicy::Static => auth.static_token.clone().unwrap_or_default(),
    };

    Some(format!("{}{}", auth.upstream_prefix, token))
}

/// Header translation for the catch-all path: every inbound header survives
/// except `Host`, `Authorization` (rewritten) and hop-by-hop framing headers.
pub fn translate_headers(inbound: &HeaderMap, upstream: &UpstreamConfig) -> HeaderMap {
    let workspace = workspace_header(upstream);
    let mut headers = HeaderMap::with_capacity(inbound.len() + 2);

    for (name, value) in inbound.iter() {
        if name == header::HOST || name == header::AUTHORIZATION || is_hop_by_hop(name) {
            continue;
        }
        if matches!(&workspace, Some((ws_name, _)) if ws_name == name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    apply_credentials(&mut headers, inbound, upstream, workspace);
    headers
}

/// Headers for the specialized chat/completion/models endpoints. Only the
/// credentials and content negotiation are sent upstream.
pub fn chat_headers(inbound: &HeaderMap, upstream: &UpstreamConfig, streaming: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if streaming {
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
    }

    apply_credentials(&mut headers, inbound, upstream, workspace_header(upstream));
    headers
}

fn apply_credentials(
    headers: &mut HeaderMap,
    inbound: &HeaderMap,
    upstream: &UpstreamConfig,
    workspace: Option<(HeaderName, HeaderValue)>,
) {
    let inbound_auth = inbound
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if let Some(auth) = translate_authorization(inbound_auth, &upstream.auth) {
        match HeaderValue::from_str(&auth) {
            Ok(value) => {
                headers.insert(header::AUTHORIZATION, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Translated Authorization is not a valid header value, dropping it");
            }
        }
    }

    if let Some((name, value)) = workspace {
        headers.insert(name, value);
    }
}

fn workspace_header(upstream: &UpstreamConfig) -> Option<(HeaderName, HeaderValue)> {
    let id = upstream.workspace_id.as_deref()?;
    let name = HeaderName::from_bytes(upstream.workspace_header.as_bytes()).ok()?;
    let value = HeaderValue::from_str(id).ok()?;
    Some((name, value))
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(policy: AuthPolicy, static_token: Option<&str>) -> AuthConfig {
        AuthConfig {
            policy,
            client_prefix: "Bearer sk-".to_string(),
            upstream_prefix: "Bearer up-".to_string(),
            static_token: static_token.map(str::to_string),
        }
    }

    fn upstream(policy: AuthPolicy, workspace_id: Option<&str>) -> UpstreamConfig {
        UpstreamConfig {
            auth: auth(policy, Some("STATIC")),
            workspace_id: workspace_id.map(str::to_string),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_passthrough_swaps_prefix() {
        let result = translate_authorization(Some("Bearer sk-ABC"), &auth(AuthPolicy::Passthrough, None));
        assert_eq!(result.as_deref(), Some("Bearer up-ABC"));
    }

    #[test]
    fn test_passthrough_without_client_prefix_keeps_whole_value() {
        let result = translate_authorization(Some("ABC"), &auth(AuthPolicy::Passthrough, None));
        assert_eq!(result.as_deref(), Some("Bearer up-ABC"));
    }

    #[test]
    fn test_passthrough_without_inbound_header() {
        assert_eq!(translate_authorization(None, &auth(AuthPolicy::Passthrough, None)), None);
    }

    #[test]
    fn test_static_ignores_client_token() {
        let config = auth(AuthPolicy::Static, Some("XYZ"));
        assert_eq!(
            translate_authorization(Some("Bearer sk-ABC"), &config).as_deref(),
            Some("Bearer up-XYZ")
        );
        assert_eq!(
            translate_authorization(None, &config).as_deref(),
            Some("Bearer up-XYZ")
        );
    }

    #[test]
    fn test_translate_headers_strips_host_and_rewrites_auth() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("proxy.local:8066"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-ABC"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("17"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert("x-custom", HeaderValue::from_static("kept"));

        let headers = translate_headers(&inbound, &upstream(AuthPolicy::Passthrough, None));

        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer up-ABC");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
        assert!(headers.get("x-workspace-id").is_none());
    }

    #[test]
    fn test_translate_headers_preserves_multi_values_in_order() {
        let mut inbound = HeaderMap::new();
        inbound.append(header::ACCEPT, HeaderValue::from_static("application/json"));
        inbound.append(header::ACCEPT, HeaderValue::from_static("text/plain"));

        let headers = translate_headers(&inbound, &upstream(AuthPolicy::Passthrough, None));
        let values: Vec<_> = headers.get_all(header::ACCEPT).iter().collect();
        assert_eq!(values, vec!["application/json", "text/plain"]);
    }

    #[test]
    fn test_translate_headers_injects_workspace() {
        let mut inbound = HeaderMap::new();
        inbound.insert("x-workspace-id", HeaderValue::from_static("client-chosen"));

        let headers = translate_headers(&inbound, &upstream(AuthPolicy::Static, Some("ws-1")));
        let values: Vec<_> = headers.get_all("x-workspace-id").iter().collect();
        assert_eq!(values, vec!["ws-1"]);
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer up-STATIC");
    }

    #[test]
    fn test_chat_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-ABC"));
        inbound.insert("x-custom", HeaderValue::from_static("dropped"));
        inbound.insert(header::HOST, HeaderValue::from_static("proxy.local"));

        let headers = chat_headers(&inbound, &upstream(AuthPolicy::Passthrough, Some("ws-1")), true);
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer up-ABC");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "text/event-stream");
        assert_eq!(headers.get("x-workspace-id").unwrap(), "ws-1");
        assert!(headers.get("x-custom").is_none());
        assert!(headers.get(header::HOST).is_none());

        let headers = chat_headers(&inbound, &upstream(AuthPolicy::Passthrough, None), false);
        assert!(headers.get(header::ACCEPT).is_none());
    }
}
