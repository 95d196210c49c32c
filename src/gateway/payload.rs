//! Payload sanitization.
//!
//! # Responsibilities
//! - Extract {url, method, headers, body} from the inbound request,
//!   regardless of transport encoding (query string vs JSON body)
//! - Validate the target URL before any engine is invoked
//! - Enforce the outbound method allow-list
//! - Filter caller-supplied headers down to the forwardable subset
//!
//! # Design Decisions
//! - GET/HEAD draw parameters from the query string; POST/PUT/PATCH from a
//!   parsed JSON body; an unparseable body is treated as absent parameters
//! - Only `referer` and `cookie` survive the header filter. This is a
//!   deliberate anti-abuse boundary, not an oversight: arbitrary
//!   caller-chosen headers would let callers break engine fingerprint
//!   consistency or smuggle hop-by-hop fields
//! - Structured bodies are serialized to JSON; POST without an explicit
//!   content-type gets `application/json`

use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Caller headers that may be forwarded upstream.
const FORWARDABLE_HEADERS: &[&str] = &["referer", "cookie"];

/// Outbound methods the gateway will issue.
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "HEAD"];

const URL_REQUIRED: &str = r#"A valid "url" parameter starting with http(s) is required."#;

/// The inbound request, decoded off its transport.
///
/// Built once by the HTTP layer; the auth gate and the sanitizer both read
/// from it so the body is parsed exactly once.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    /// Decoded query-string parameters.
    pub query: Map<String, Value>,
    /// JSON-object body fields; empty when the body is absent or not an object.
    pub body: Map<String, Value>,
}

impl InboundRequest {
    /// Decode an inbound request from its raw parts.
    pub fn from_parts(method: Method, headers: HeaderMap, query: Option<&str>, body: &[u8]) -> Self {
        let query = query.map(parse_query).unwrap_or_default();
        let body = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            method,
            headers,
            query,
            body,
        }
    }

    /// Look up a parameter: query string first, then body field.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.query.get(name).or_else(|| self.body.get(name))
    }

    /// Caller token: `x-proxy-token` header wins over the `token` parameter.
    pub fn token(&self) -> Option<&str> {
        self.headers
            .get("x-proxy-token")
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.param("token").and_then(Value::as_str))
    }

    /// Engine version flag: `x-proxy-version` header wins over `version`.
    pub fn version(&self) -> Option<&str> {
        self.headers
            .get("x-proxy-version")
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.param("version").and_then(Value::as_str))
    }

    /// The caller's `Origin` header, for CORS.
    pub fn origin(&self) -> Option<&str> {
        self.headers.get("origin").and_then(|v| v.to_str().ok())
    }

    /// Parameter source for this verb: query for GET/HEAD, body otherwise.
    fn payload_source(&self) -> &Map<String, Value> {
        if self.method == Method::GET || self.method == Method::HEAD {
            &self.query
        } else {
            &self.body
        }
    }
}

fn parse_query(query: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// A validated outbound request, ready for an engine.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Target URL; scheme-validated, host present.
    pub url: String,
    /// Outbound method; upper-cased, allow-listed.
    pub method: Method,
    /// Filtered caller headers (forwardable subset only).
    pub headers: HeaderMap,
    /// Outbound body, if any.
    pub body: Option<Bytes>,
}

/// Extract and validate a [`ProxyRequest`] from the inbound request.
pub fn sanitize(inbound: &InboundRequest) -> Result<ProxyRequest, GatewayError> {
    let source = inbound.payload_source();

    let url = match source.get("url").and_then(Value::as_str) {
        Some(u) if u.starts_with("http://") || u.starts_with("https://") => u.to_string(),
        _ => return Err(GatewayError::InvalidPayload(URL_REQUIRED.into())),
    };
    // Stricter than the prefix check: the URL must actually parse and carry
    // a hostname, or engines would fail in less explicable ways.
    match url::Url::parse(&url) {
        Ok(parsed) if parsed.host_str().is_some() => {}
        _ => return Err(GatewayError::InvalidPayload(URL_REQUIRED.into())),
    }

    let method_str = source
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_ascii_uppercase();
    if !ALLOWED_METHODS.contains(&method_str.as_str()) {
        return Err(GatewayError::MethodNotAllowed(method_str));
    }
    let method = Method::from_bytes(method_str.as_bytes())
        .map_err(|_| GatewayError::MethodNotAllowed(method_str.clone()))?;

    let mut headers = filter_caller_headers(source.get("headers"));

    let body = extract_body(source.get("body"), inbound.method == Method::POST, &mut headers);

    Ok(ProxyRequest {
        url,
        method,
        headers,
        body,
    })
}

/// Filter a caller-supplied `headers` value down to the forwardable subset.
///
/// Accepts a JSON object or a JSON-encoded string of one (the query-string
/// transport can only carry strings); anything else is silently empty.
/// Filtering is idempotent.
pub fn filter_caller_headers(value: Option<&Value>) -> HeaderMap {
    let parsed;
    let object = match value {
        Some(Value::Object(map)) => Some(map),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => {
                parsed = map;
                Some(&parsed)
            }
            _ => None,
        },
        _ => None,
    };

    let mut headers = HeaderMap::new();
    if let Some(object) = object {
        for (key, value) in object {
            let name = key.to_ascii_lowercase();
            if !FORWARDABLE_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if let (Ok(name), Some(Ok(value))) = (
                HeaderName::from_bytes(name.as_bytes()),
                value.as_str().map(HeaderValue::from_str),
            ) {
                headers.insert(name, value);
            }
        }
    }
    headers
}

fn extract_body(value: Option<&Value>, inbound_is_post: bool, headers: &mut HeaderMap) -> Option<Bytes> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(Bytes::from(s.clone())),
        Some(structured @ (Value::Object(_) | Value::Array(_))) => {
            // Structured body: serialize, and default the content-type for
            // POST callers that didn't set one.
            let text = structured.to_string();
            if inbound_is_post && !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Some(Bytes::from(text))
        }
        Some(scalar) => Some(Bytes::from(scalar.to_string())),
    }
}
