//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the fetch gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Auth gate settings.
    pub auth: AuthConfig,

    /// CORS policy settings.
    pub cors: CorsConfig,

    /// Outbound engine selection and tuning.
    pub engine: EngineConfig,

    /// Response relay settings.
    pub relay: RelayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum inbound request body size in bytes.
    pub max_body_bytes: usize,

    /// Total request timeout in seconds (inbound side).
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 90,
        }
    }
}

/// Auth gate configuration.
///
/// No secret (or an empty one) puts the gate into open mode: every caller is
/// accepted. The secret can also be supplied via the `PROXY_AUTH_TOKEN`
/// environment variable, which takes precedence over the file value.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret callers must present.
    pub secret: Option<String>,
}

impl AuthConfig {
    /// Effective secret; `None` means open mode.
    pub fn effective_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// CORS policy configuration.
///
/// An empty `allowed_origins` list selects the wildcard (`*`) policy. A
/// non-empty list selects the dynamic policy: the caller's `Origin` is echoed
/// back only when it matches an entry exactly, or ends with an entry that
/// starts with a dot (suffix match, e.g. ".example.net").
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Trusted origins: exact values or leading-dot suffixes.
    pub allowed_origins: Vec<String>,
}

/// Which outbound strategy a deployment uses by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Direct HTTP client with a fixed default User-Agent.
    Plain,
    /// HTTP client with per-call randomized browser fingerprint headers.
    #[default]
    Fingerprint,
    /// Full headless-browser render via the DevTools protocol.
    Browser,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Plain => "plain",
            EngineKind::Fingerprint => "fingerprint",
            EngineKind::Browser => "browser",
        }
    }
}

/// Outbound engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine used when the request doesn't (or can't) pick one.
    pub default: EngineKind,

    /// Honor the per-request "v1" version flag (selects the plain engine).
    pub allow_version_switch: bool,

    /// Outbound request timeout in seconds (non-media).
    pub timeout_secs: u64,

    /// Extended timeout for media resources in seconds.
    pub media_timeout_secs: u64,

    /// Optional outbound proxy URL (http://, https:// or socks5://).
    pub outbound_proxy: Option<String>,

    /// Headless-browser engine settings.
    pub browser: BrowserConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default: EngineKind::Fingerprint,
            allow_version_switch: true,
            timeout_secs: 15,
            media_timeout_secs: 60,
            outbound_proxy: None,
            browser: BrowserConfig::default(),
        }
    }
}

/// Headless-browser engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome DevTools HTTP endpoint (e.g., "http://127.0.0.1:9222").
    pub devtools_url: String,

    /// Bound on page navigation, in seconds.
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            devtools_url: "http://127.0.0.1:9222".to_string(),
            navigation_timeout_secs: 30,
        }
    }
}

/// Response relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Stream upstream bodies instead of buffering (plain engine only;
    /// fingerprint and browser engines always buffer).
    pub streaming: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { streaming: true }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics exporter.
    pub metrics_enabled: bool,

    /// Address for the metrics exposition endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
