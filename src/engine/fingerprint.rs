//! Fingerprinted fetch engine.
//!
//! # Responsibilities
//! - Pick a browser/OS/device/locale tuple uniformly at random per call
//! - Synthesize a consistent header set from the chosen profile
//! - Issue the upstream request with a bounded timeout and zero retries
//! - Optionally route through an outbound proxy (http/socks5)
//!
//! # Design Decisions
//! - The profile is ephemeral: generated per outbound call, never persisted,
//!   never shared between requests
//! - Consistency within one call matters more than realism (realism is an
//!   explicit non-goal): a mobile Safari profile never carries sec-ch-ua
//! - Responses are always fully buffered; this engine trades latency for
//!   stability

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method};
use rand::seq::SliceRandom;

use crate::config::schema::EngineConfig;
use crate::error::GatewayError;
use crate::gateway::payload::ProxyRequest;
use crate::relay::ProxyResponse;

use super::plain::{convert_headers, map_transport_error};
use super::{FetchContext, FetchEngine};

const SUPPORTED_BROWSERS: &[Browser] = &[Browser::Chrome, Browser::Firefox, Browser::Safari, Browser::Edge];
const SUPPORTED_OS: &[Os] = &[Os::Windows, Os::Macos, Os::Linux, Os::Android, Os::Ios];
const SUPPORTED_DEVICES: &[Device] = &[Device::Desktop, Device::Mobile];
const SUPPORTED_LOCALES: &[&str] = &["en-US", "en", "zh-CN", "ja-JP"];

/// Fixed timeout for fingerprinted calls; retries are never attempted.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Windows,
    Macos,
    Linux,
    Android,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Desktop,
    Mobile,
}

/// An ephemeral browser identity, generated per outbound call.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintProfile {
    pub browser: Browser,
    pub os: Os,
    pub device: Device,
    pub locale: &'static str,
}

impl FingerprintProfile {
    /// Pick one of the supported tuples uniformly at random.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let browser = *SUPPORTED_BROWSERS.choose(&mut rng).unwrap();
        let device = *SUPPORTED_DEVICES.choose(&mut rng).unwrap();
        // A mobile device implies a mobile OS and vice versa, otherwise the
        // synthesized header set contradicts itself.
        let os = loop {
            let os = *SUPPORTED_OS.choose(&mut rng).unwrap();
            let mobile_os = matches!(os, Os::Android | Os::Ios);
            if mobile_os == (device == Device::Mobile) {
                break os;
            }
        };
        let locale = *SUPPORTED_LOCALES.choose(&mut rng).unwrap();
        Self {
            browser,
            os,
            device,
            locale,
        }
    }

    /// User-Agent string for this profile.
    pub fn user_agent(&self) -> String {
        let platform = match (self.os, self.device) {
            (Os::Windows, _) => "Windows NT 10.0; Win64; x64".to_string(),
            (Os::Macos, _) => "Macintosh; Intel Mac OS X 10_15_7".to_string(),
            (Os::Linux, _) => "X11; Linux x86_64".to_string(),
            (Os::Android, _) => "Linux; Android 14; Pixel 8".to_string(),
            (Os::Ios, _) => "iPhone; CPU iPhone OS 17_5 like Mac OS X".to_string(),
        };
        match self.browser {
            Browser::Chrome => format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 {}Safari/537.36",
                if self.device == Device::Mobile { "Mobile " } else { "" },
            ),
            Browser::Edge => format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0"
            ),
            Browser::Firefox => format!(
                "Mozilla/5.0 ({platform}; rv:127.0) Gecko/20100101 Firefox/127.0"
            ),
            Browser::Safari => format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 {}Safari/605.1.15",
                if self.device == Device::Mobile { "Mobile/15E148 " } else { "" },
            ),
        }
    }

    /// Accept-Language derived from the locale.
    pub fn accept_language(&self) -> String {
        match self.locale {
            "en-US" => "en-US,en;q=0.9".to_string(),
            "en" => "en;q=0.9".to_string(),
            other => format!("{other},en;q=0.8"),
        }
    }

    /// Synthesize the full header set for this identity.
    pub fn header_set(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent()).expect("static UA parts"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.accept_language()).expect("static locale parts"),
        );

        // Client hints exist only on chromium-family browsers.
        if matches!(self.browser, Browser::Chrome | Browser::Edge) {
            let brand = match self.browser {
                Browser::Chrome => "\"Not/A)Brand\";v=\"8\", \"Chromium\";v=\"126\", \"Google Chrome\";v=\"126\"",
                Browser::Edge => "\"Not/A)Brand\";v=\"8\", \"Chromium\";v=\"126\", \"Microsoft Edge\";v=\"126\"",
                _ => unreachable!(),
            };
            headers.insert("sec-ch-ua", HeaderValue::from_static(brand));
            headers.insert(
                "sec-ch-ua-mobile",
                HeaderValue::from_static(if self.device == Device::Mobile { "?1" } else { "?0" }),
            );
            let platform = match self.os {
                Os::Windows => "\"Windows\"",
                Os::Macos => "\"macOS\"",
                Os::Linux => "\"Linux\"",
                Os::Android => "\"Android\"",
                Os::Ios => "\"iOS\"",
            };
            headers.insert("sec-ch-ua-platform", HeaderValue::from_static(platform));
        }

        headers
    }
}

pub struct FingerprintEngine {
    client: reqwest::Client,
    /// Deployment-wide outbound proxy; a per-request proxy overrides it.
    outbound_proxy: Option<String>,
}

impl FingerprintEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::limited(10));
        if let Some(proxy) = &config.outbound_proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
            outbound_proxy: config.outbound_proxy.clone(),
        })
    }

    /// Client for one call: the shared one, unless the request carries its
    /// own proxy URL (proxies bind at client construction in reqwest).
    fn client_for(&self, ctx: &FetchContext) -> Result<reqwest::Client, GatewayError> {
        match &ctx.proxy_url {
            Some(url) if self.outbound_proxy.as_deref() != Some(url.as_str()) => {
                let proxy = reqwest::Proxy::all(url)
                    .map_err(|e| GatewayError::UpstreamFailure(format!("invalid proxy url: {e}")))?;
                reqwest::Client::builder()
                    .redirect(reqwest::redirect::Policy::limited(10))
                    .proxy(proxy)
                    .build()
                    .map_err(|e| GatewayError::UpstreamFailure(e.to_string()))
            }
            _ => Ok(self.client.clone()),
        }
    }
}

#[async_trait]
impl FetchEngine for FingerprintEngine {
    fn name(&self) -> &'static str {
        "fingerprint"
    }

    async fn fetch(
        &self,
        request: &ProxyRequest,
        ctx: &FetchContext,
    ) -> Result<ProxyResponse, GatewayError> {
        let profile = FingerprintProfile::random();
        tracing::debug!(
            browser = ?profile.browser,
            os = ?profile.os,
            device = ?profile.device,
            locale = profile.locale,
            "Fingerprint profile generated"
        );

        let mut headers = profile.header_set();
        // Payload headers (referer/cookie) override the synthesized set;
        // inherited caller values fill any remaining gap.
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }
        if !headers.contains_key("cookie") {
            if let Some(cookie) = ctx.cookie.as_deref().and_then(|c| HeaderValue::from_str(c).ok()) {
                headers.insert("cookie", cookie);
            }
        }
        if !headers.contains_key(REFERER) {
            if let Some(referer) = ctx.referer.as_deref().and_then(|r| HeaderValue::from_str(r).ok()) {
                headers.insert(REFERER, referer);
            }
        }

        let client = self.client_for(ctx)?;
        let mut outbound = client
            .request(request.method.clone(), &request.url)
            .headers(headers)
            .timeout(REQUEST_TIMEOUT);
        if request.method != Method::GET && request.method != Method::HEAD {
            if let Some(body) = &request.body {
                outbound = outbound.body(body.clone());
            }
        }

        // No retry on failure: a stuck upstream is abandoned at the timeout.
        let response = outbound.send().await.map_err(map_transport_error)?;

        let status = axum::http::StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
        let headers = convert_headers(response.headers());
        let bytes = response.bytes().await.map_err(map_transport_error)?;

        Ok(ProxyResponse::buffered(status, headers, bytes))
    }
}
