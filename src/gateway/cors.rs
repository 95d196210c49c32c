//! CORS policy.
//!
//! # Responsibilities
//! - Produce the CORS header set for every response, success or failure
//! - Echo trusted origins only (dynamic policy), or wildcard when no
//!   allow-list is configured
//! - Always set `Vary: Origin` under the dynamic policy to prevent cache
//!   poisoning across origins
//!
//! # Design Decisions
//! - On an untrusted origin the allow-origin header is omitted entirely; the
//!   browser then blocks the response on its own
//! - Never a blanket wildcard when an allow-list is configured, since cookies
//!   may be forwarded through the gateway

use axum::http::header::{HeaderName, HeaderValue, VARY};

use crate::config::schema::CorsConfig;

const ALLOW_ORIGIN: HeaderName = HeaderName::from_static("access-control-allow-origin");
const ALLOW_METHODS: HeaderName = HeaderName::from_static("access-control-allow-methods");
const ALLOW_HEADERS: HeaderName = HeaderName::from_static("access-control-allow-headers");

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, x-proxy-token, x-proxy-version";

/// Compute the CORS header set for a request origin.
///
/// With an empty allow-list every origin gets `*`. Otherwise the origin is
/// echoed back only on an exact match, or a suffix match against entries with
/// a leading dot.
pub fn cors_headers(origin: Option<&str>, config: &CorsConfig) -> Vec<(HeaderName, HeaderValue)> {
    let mut headers = vec![
        (ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS)),
        (ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS)),
    ];

    if config.allowed_origins.is_empty() {
        headers.push((ALLOW_ORIGIN, HeaderValue::from_static("*")));
        return headers;
    }

    // Dynamic policy: responses differ by Origin, caches must know.
    headers.push((VARY, HeaderValue::from_static("Origin")));

    if let Some(origin) = origin {
        if is_trusted(origin, &config.allowed_origins) {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.push((ALLOW_ORIGIN, value));
            }
        }
    }

    headers
}

fn is_trusted(origin: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|entry| {
        if entry.starts_with('.') {
            // Leading-dot entries match on a label boundary only, so
            // ".trusted.net" accepts "a.trusted.net" but not "evil-trusted.net".
            origin.ends_with(entry.as_str())
        } else {
            origin == entry
        }
    })
}
