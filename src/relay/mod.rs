//! Response relay.
//!
//! # Responsibilities
//! - Carry the upstream response as an explicit tagged union: fully buffered
//!   bytes or a lazy byte stream, decided once by the engine
//! - Filter upstream headers to the caching/range-safe allow-list
//! - Convert to the serving layer's response type, with CORS headers merged
//! - Encode buffered bodies for string-only transports (base64 + flag)
//!
//! # Design Decisions
//! - Streamed bodies go through `Body::from_stream`; hyper propagates
//!   backpressure, and a mid-stream error aborts the connection since the
//!   headers are already on the wire and cannot be re-sent
//! - `content-encoding`/`transfer-encoding` never survive: the transport has
//!   already decoded, and framing is recomputed by the serving layer

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// A lazy upstream byte stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, axum::BoxError>>;

/// Upstream body, decided once by the engine and never inferred downstream.
pub enum ResponseBody {
    Buffered(Bytes),
    Streamed(ByteStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            ResponseBody::Streamed(_) => write!(f, "Streamed(..)"),
        }
    }
}

/// The upstream response as the gateway relays it.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ProxyResponse {
    pub fn buffered(status: StatusCode, headers: HeaderMap, bytes: Bytes) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(bytes),
        }
    }

    pub fn streamed(status: StatusCode, headers: HeaderMap, stream: ByteStream) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Streamed(stream),
        }
    }
}

/// Headers that survive relaying: the set needed for correct browser caching
/// and byte-range behavior. Everything else, transport framing above all,
/// is dropped.
const RESPONSE_HEADER_ALLOWLIST: &[&str] = &[
    "content-type",
    "content-length",
    "content-disposition",
    "cache-control",
    "accept-ranges",
    "content-range",
    "etag",
    "vary",
    "last-modified",
    "expires",
];

/// Filter upstream headers down to the relay allow-list. Idempotent.
pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if RESPONSE_HEADER_ALLOWLIST.contains(&name.as_str()) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Build the final caller-facing response: filtered upstream headers plus the
/// CORS set, body delivered per its mode.
pub fn into_response(proxy: ProxyResponse, cors: &[(HeaderName, HeaderValue)]) -> Response {
    let mut response = match proxy.body {
        ResponseBody::Buffered(bytes) => Response::new(Body::from(bytes)),
        ResponseBody::Streamed(stream) => Response::new(Body::from_stream(stream)),
    };
    *response.status_mut() = proxy.status;

    let headers = response.headers_mut();
    for (name, value) in filter_response_headers(&proxy.headers) {
        if let Some(name) = name {
            headers.append(name, value);
        }
    }
    for (name, value) in cors {
        headers.insert(name.clone(), value.clone());
    }
    response
}

/// Content-type prefixes treated as binary for string-only transports.
const BINARY_TYPE_PREFIXES: &[&str] = &[
    "image/",
    "audio/",
    "video/",
    "font/",
    "application/octet-stream",
    "application/pdf",
    "application/zip",
];

/// A response shaped for a transport that can only carry strings.
#[derive(Debug, Clone, PartialEq)]
pub struct TextTransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub is_base64_encoded: bool,
}

/// Encode a buffered response for a string-only transport.
///
/// Binary bodies (by content-type prefix, or any bytes that aren't UTF-8)
/// are base64-encoded with the out-of-band flag set; textual bodies pass
/// through unchanged.
pub fn text_transport(status: StatusCode, headers: &HeaderMap, body: &Bytes) -> TextTransportResponse {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let is_binary = BINARY_TYPE_PREFIXES
        .iter()
        .any(|prefix| content_type.starts_with(prefix));

    let (body, is_base64_encoded) = if is_binary {
        (BASE64.encode(body), true)
    } else {
        match std::str::from_utf8(body) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (BASE64.encode(body), true),
        }
    };

    TextTransportResponse {
        status: status.as_u16(),
        headers: filter_response_headers(headers),
        body,
        is_base64_encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("image/png"));
        headers.insert("content-encoding", HeaderValue::from_static("gzip"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("etag", HeaderValue::from_static("\"abc\""));
        headers.insert("x-upstream-secret", HeaderValue::from_static("leak"));
        headers
    }

    #[test]
    fn test_transport_headers_dropped() {
        let filtered = filter_response_headers(&upstream_headers());
        assert!(filtered.get("content-encoding").is_none());
        assert!(filtered.get("transfer-encoding").is_none());
        assert!(filtered.get("x-upstream-secret").is_none());
        assert_eq!(filtered.get("content-type").unwrap(), "image/png");
        assert_eq!(filtered.get("etag").unwrap(), "\"abc\"");
    }

    #[test]
    fn test_filtering_idempotent() {
        let once = filter_response_headers(&upstream_headers());
        let twice = filter_response_headers(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_range_headers_survive() {
        let mut headers = HeaderMap::new();
        headers.insert("content-range", HeaderValue::from_static("bytes 0-99/1000"));
        headers.insert("accept-ranges", HeaderValue::from_static("bytes"));
        let filtered = filter_response_headers(&headers);
        assert_eq!(filtered.get("content-range").unwrap(), "bytes 0-99/1000");
        assert_eq!(filtered.get("accept-ranges").unwrap(), "bytes");
    }

    #[test]
    fn test_text_transport_binary_is_base64() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("image/png"));
        let body = Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]);

        let out = text_transport(StatusCode::OK, &headers, &body);
        assert!(out.is_base64_encoded);
        assert_eq!(BASE64.decode(&out.body).unwrap(), body.as_ref());
    }

    #[test]
    fn test_text_transport_text_passthrough() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        let body = Bytes::from_static(br#"{"ok":true}"#);

        let out = text_transport(StatusCode::OK, &headers, &body);
        assert!(!out.is_base64_encoded);
        assert_eq!(out.body, r#"{"ok":true}"#);
    }

    #[test]
    fn test_text_transport_non_utf8_without_type_is_base64() {
        let headers = HeaderMap::new();
        let body = Bytes::from_static(&[0xff, 0xfe, 0x00]);

        let out = text_transport(StatusCode::OK, &headers, &body);
        assert!(out.is_base64_encoded);
    }

    #[test]
    fn test_into_response_merges_cors() {
        let proxy = ProxyResponse::buffered(
            StatusCode::PARTIAL_CONTENT,
            upstream_headers(),
            Bytes::from_static(b"chunk"),
        );
        let cors = vec![(
            HeaderName::from_static("access-control-allow-origin"),
            HeaderValue::from_static("*"),
        )];
        let response = into_response(proxy, &cors);
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );
        assert!(response.headers().get("content-encoding").is_none());
    }
}
