//! Plain fetch engine.
//!
//! # Responsibilities
//! - Direct HTTP call with a fixed default User-Agent
//! - Forward the allow-listed payload headers plus inherited cookie/referer
//! - Follow redirects; transport handles decompression
//! - Media tuning: Accept from the MIME table, Range passthrough, extended
//!   timeout for large media
//!
//! # Design Decisions
//! - This is also the "v1" lightweight engine: selection maps the version
//!   flag here, and the media-specific behavior lives with it
//! - Streamed delivery when configured (and the method has a body to
//!   stream); the fingerprint and browser engines always buffer
//! - A referer is not forwarded across an https→http downgrade

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_TYPE, RANGE, REFERER, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use futures_util::{StreamExt, TryStreamExt};

use crate::config::schema::EngineConfig;
use crate::error::GatewayError;
use crate::gateway::media;
use crate::gateway::payload::ProxyRequest;
use crate::relay::ProxyResponse;

use super::{FetchContext, FetchEngine};

/// Default User-Agent when the payload doesn't carry one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub struct PlainEngine {
    client: reqwest::Client,
    timeout: Duration,
    media_timeout: Duration,
    streaming: bool,
}

impl PlainEngine {
    pub fn new(config: &EngineConfig, streaming: bool) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            timeout: Duration::from_secs(config.timeout_secs),
            media_timeout: Duration::from_secs(config.media_timeout_secs),
            streaming,
        })
    }

    /// Assemble the outbound header set for a target.
    fn build_headers(&self, request: &ProxyRequest, ctx: &FetchContext, is_media: bool) -> HeaderMap {
        let mut headers = request.headers.clone();

        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        // Inherit caller cookie/referer only when the payload didn't set them.
        if !headers.contains_key("cookie") {
            if let Some(cookie) = ctx.cookie.as_deref().and_then(|c| HeaderValue::from_str(c).ok()) {
                headers.insert("cookie", cookie);
            }
        }
        if !headers.contains_key(REFERER) {
            if let Some(referer) = ctx.referer.as_deref() {
                // Don't leak an https referer to a plain-http target.
                let downgrade = request.url.starts_with("http://") && referer.starts_with("https://");
                if !downgrade {
                    if let Ok(value) = HeaderValue::from_str(referer) {
                        headers.insert(REFERER, value);
                    }
                }
            }
        }

        if is_media {
            let accept = media::mime_for_url(&request.url).unwrap_or("*/*");
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
            if let Some(range) = ctx.range.as_deref().and_then(|r| HeaderValue::from_str(r).ok()) {
                headers.insert(RANGE, range);
            }
        } else {
            headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
        }

        // Plain-http targets tend to be legacy servers: no brotli, no
        // browser fetch-metadata headers. reqwest still decodes gzip and
        // deflate responses; brotli is just never advertised.
        if request.url.starts_with("http://") {
            headers.remove("upgrade-insecure-requests");
            let fetch_metadata: Vec<HeaderName> = headers
                .keys()
                .filter(|name| name.as_str().starts_with("sec-fetch-"))
                .cloned()
                .collect();
            for name in fetch_metadata {
                headers.remove(name);
            }
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        }

        headers
    }
}

#[async_trait]
impl FetchEngine for PlainEngine {
    fn name(&self) -> &'static str {
        "plain"
    }

    async fn fetch(
        &self,
        request: &ProxyRequest,
        ctx: &FetchContext,
    ) -> Result<ProxyResponse, GatewayError> {
        let is_media = media::is_media_url(&request.url);
        let timeout = if is_media { self.media_timeout } else { self.timeout };
        let headers = self.build_headers(request, ctx, is_media);

        let mut outbound = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(headers)
            .timeout(timeout);
        if request.method != Method::GET && request.method != Method::HEAD {
            if let Some(body) = &request.body {
                outbound = outbound.body(body.clone());
            }
        }

        let response = outbound.send().await.map_err(map_transport_error)?;

        let status = axum::http::StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
        let mut headers = convert_headers(response.headers());

        if is_media && status.is_success() {
            headers.insert(
                CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            );
            if !headers.contains_key(CONTENT_TYPE) {
                if let Some(mime) = media::mime_for_url(&request.url) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime));
                }
            }
        }

        if self.streaming && request.method != Method::HEAD {
            let stream = response
                .bytes_stream()
                .map_err(|e| -> axum::BoxError { Box::new(e) })
                .boxed();
            Ok(ProxyResponse::streamed(status, headers, stream))
        } else {
            let bytes = response.bytes().await.map_err(map_transport_error)?;
            Ok(ProxyResponse::buffered(status, headers, bytes))
        }
    }
}

/// Classify a reqwest failure: timeouts get their own status, everything else
/// is an upstream failure. Non-2xx statuses never reach this path.
pub(crate) fn map_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::UpstreamTimeout
    } else {
        GatewayError::UpstreamFailure(error.to_string())
    }
}

/// Convert reqwest's header map into the serving layer's.
pub(crate) fn convert_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut converted = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            converted.append(name, value);
        }
    }
    converted
}
