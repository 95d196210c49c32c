//! Outbound fetch engines.
//!
//! # Data Flow
//! ```text
//! sanitized ProxyRequest
//!     → mod.rs (select engine: version flag or configured default)
//!     → plain.rs | fingerprint.rs | browser.rs (one upstream strategy)
//!     → ProxyResponse (buffered bytes or a byte stream)
//! ```
//!
//! # Design Decisions
//! - One polymorphic seam (`FetchEngine`) instead of scattered branching
//! - Selection is deterministic given the same inputs; only the fingerprint
//!   profile *within* an engine is randomized
//! - Every engine converts its transport failures into the gateway error
//!   taxonomy; nothing upstream-related is allowed to panic the handler

pub mod browser;
pub mod fingerprint;
pub mod plain;

use async_trait::async_trait;

use crate::config::schema::{EngineConfig, EngineKind, GatewayConfig};
use crate::error::GatewayError;
use crate::gateway::payload::{InboundRequest, ProxyRequest};
use crate::relay::ProxyResponse;

pub use browser::BrowserEngine;
pub use fingerprint::FingerprintEngine;
pub use plain::PlainEngine;

/// One interchangeable upstream strategy.
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Engine name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Fetch the target resource on behalf of the caller.
    async fn fetch(
        &self,
        request: &ProxyRequest,
        ctx: &FetchContext,
    ) -> Result<ProxyResponse, GatewayError>;
}

/// Caller-side context an engine may fold into the upstream request.
#[derive(Debug, Default, Clone)]
pub struct FetchContext {
    /// Cookie inherited from the original caller (used only when the payload
    /// didn't set its own).
    pub cookie: Option<String>,
    /// Referer inherited from the original caller.
    pub referer: Option<String>,
    /// Caller's Range header, passed through for media resources.
    pub range: Option<String>,
    /// Per-request outbound proxy URL (`proxyOptions.proxyUrl`).
    pub proxy_url: Option<String>,
}

impl FetchContext {
    /// Capture the forwardable caller context off the inbound request.
    pub fn from_inbound(inbound: &InboundRequest) -> Self {
        let header = |name: &str| {
            inbound
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let proxy_url = inbound
            .param("proxyOptions")
            .and_then(|v| v.get("proxyUrl"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self {
            cookie: header("cookie"),
            referer: header("referer"),
            range: header("range"),
            proxy_url,
        }
    }
}

/// Decide which engine kind serves this request.
///
/// The `"v1"` version flag selects the lightweight plain engine when the
/// deployment permits per-request switching; anything else falls back to the
/// configured default. Deterministic given the same inputs.
pub fn select_kind(version: Option<&str>, config: &EngineConfig) -> EngineKind {
    if config.allow_version_switch && version == Some("v1") {
        EngineKind::Plain
    } else {
        config.default
    }
}

/// The constructed engines of a deployment, selected per request.
pub struct EngineSet {
    plain: PlainEngine,
    fingerprint: FingerprintEngine,
    browser: BrowserEngine,
    config: EngineConfig,
}

impl EngineSet {
    /// Build every engine once at startup.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            plain: PlainEngine::new(&config.engine, config.relay.streaming)?,
            fingerprint: FingerprintEngine::new(&config.engine)?,
            browser: BrowserEngine::new(config.engine.browser.clone()),
            config: config.engine.clone(),
        })
    }

    /// Resolve the engine for a request's version flag.
    pub fn select(&self, version: Option<&str>) -> &dyn FetchEngine {
        match select_kind(version, &self.config) {
            EngineKind::Plain => &self.plain,
            EngineKind::Fingerprint => &self.fingerprint,
            EngineKind::Browser => &self.browser,
        }
    }
}
