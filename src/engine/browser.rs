//! Headless-browser fetch engine.
//!
//! # Responsibilities
//! - Render the target URL in an isolated browser page per request
//! - Extract the main document's status, headers and body after load
//! - Inject the caller's cookie via a dedicated header-injection call
//! - Tear the page down on every exit path: success, error, timeout
//!
//! # Data Flow
//! ```text
//! devtools HTTP endpoint (/json/version)
//!     → browser websocket (tokio-tungstenite)
//!     → Target.createTarget (isolated page)
//!     → Target.attachToTarget → Network/Page.enable → Page.navigate
//!     → Network.responseReceived (Document) + Page.loadEventFired
//!     → Network.getResponseBody
//!     → Target.closeTarget (unconditional)
//! ```
//!
//! # Design Decisions
//! - The browser itself is provisioned externally; this engine only drives
//!   an already-running instance over the DevTools protocol
//! - Navigation runs inside a bounded timeout; the close call sits after it
//!   on the one exit path that every outcome funnels through
//! - Responses are always buffered: the protocol hands the body over whole

use std::collections::VecDeque;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::schema::BrowserConfig;
use crate::error::GatewayError;
use crate::gateway::payload::ProxyRequest;
use crate::relay::ProxyResponse;

use super::{FetchContext, FetchEngine};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct BrowserEngine {
    config: BrowserConfig,
    http: reqwest::Client,
}

impl BrowserEngine {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Resolve the browser's websocket endpoint from the DevTools HTTP API.
    async fn discover_websocket(&self) -> Result<String, GatewayError> {
        let url = format!(
            "{}/json/version",
            self.config.devtools_url.trim_end_matches('/')
        );
        let version: Value = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamFailure(format!("devtools unreachable: {e}")))?
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamFailure(format!("devtools version parse: {e}")))?;

        version
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::UpstreamFailure("devtools endpoint reported no websocket URL".into())
            })
    }
}

#[async_trait]
impl FetchEngine for BrowserEngine {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(
        &self,
        request: &ProxyRequest,
        ctx: &FetchContext,
    ) -> Result<ProxyResponse, GatewayError> {
        let ws_url = self.discover_websocket().await?;
        let (ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| GatewayError::UpstreamFailure(format!("devtools connect: {e}")))?;
        let mut conn = CdpConnection::new(ws);

        let target_id = conn.create_target().await?;

        // Everything fallible past this point funnels through here so the
        // target is closed on success, failure, and timeout alike.
        let timeout = std::time::Duration::from_secs(self.config.navigation_timeout_secs);
        let outcome = tokio::time::timeout(timeout, render(&mut conn, &target_id, request, ctx)).await;

        if let Err(e) = conn.close_target(&target_id).await {
            tracing::warn!(target_id = %target_id, error = %e, "Failed to close browser target");
        }

        match outcome {
            Err(_elapsed) => Err(GatewayError::UpstreamTimeout),
            Ok(result) => result,
        }
    }
}

/// Navigate an attached page and capture the main document response.
async fn render(
    conn: &mut CdpConnection,
    target_id: &str,
    request: &ProxyRequest,
    ctx: &FetchContext,
) -> Result<ProxyResponse, GatewayError> {
    let attached = conn
        .call(
            "Target.attachToTarget",
            json!({"targetId": target_id, "flatten": true}),
            None,
        )
        .await?;
    let session = attached
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::UpstreamFailure("attach returned no session".into()))?
        .to_string();

    conn.call("Network.enable", json!({}), Some(&session)).await?;
    conn.call("Page.enable", json!({}), Some(&session)).await?;

    // Cookie/referer injection happens before navigation so the document
    // request itself carries them.
    let mut extra = serde_json::Map::new();
    let cookie = request
        .headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| ctx.cookie.clone());
    if let Some(cookie) = cookie {
        extra.insert("Cookie".into(), Value::String(cookie));
    }
    let referer = request
        .headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| ctx.referer.clone());
    if let Some(referer) = referer {
        extra.insert("Referer".into(), Value::String(referer));
    }
    if !extra.is_empty() {
        conn.call(
            "Network.setExtraHTTPHeaders",
            json!({"headers": Value::Object(extra)}),
            Some(&session),
        )
        .await?;
    }

    let navigated = conn
        .call("Page.navigate", json!({"url": request.url}), Some(&session))
        .await?;
    if let Some(error_text) = navigated.get("errorText").and_then(Value::as_str) {
        return Err(GatewayError::UpstreamFailure(format!("navigation failed: {error_text}")));
    }

    // Wait for the main document response and the load event.
    let mut document: Option<Value> = None;
    let mut loaded = false;
    while document.is_none() || !loaded {
        let event = conn.next_event().await?;
        match event.get("method").and_then(Value::as_str) {
            Some("Network.responseReceived") if document.is_none() => {
                let params = &event["params"];
                if params.get("type").and_then(Value::as_str) == Some("Document") {
                    document = Some(params.clone());
                }
            }
            Some("Page.loadEventFired") => loaded = true,
            _ => {}
        }
    }
    let document = document.ok_or_else(|| {
        GatewayError::UpstreamFailure("load completed without a document response".into())
    })?;

    let status = document["response"]["status"]
        .as_u64()
        .and_then(|s| StatusCode::from_u16(s as u16).ok())
        .unwrap_or(StatusCode::OK);
    let headers = headers_from_cdp(&document["response"]["headers"]);

    let request_id = document
        .get("requestId")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::UpstreamFailure("document response had no request id".into()))?;
    let body = conn
        .call(
            "Network.getResponseBody",
            json!({"requestId": request_id}),
            Some(&session),
        )
        .await?;

    let raw = body.get("body").and_then(Value::as_str).unwrap_or("");
    let bytes = if body.get("base64Encoded").and_then(Value::as_bool).unwrap_or(false) {
        Bytes::from(
            BASE64
                .decode(raw)
                .map_err(|e| GatewayError::UpstreamFailure(format!("body decode: {e}")))?,
        )
    } else {
        Bytes::from(raw.to_string())
    };

    Ok(ProxyResponse::buffered(status, headers, bytes))
}

/// Convert a CDP headers object (string → string) into a header map.
fn headers_from_cdp(value: &Value) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(object) = value.as_object() {
        for (name, value) in object {
            if let (Ok(name), Some(Ok(value))) = (
                HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()),
                value.as_str().map(HeaderValue::from_str),
            ) {
                headers.append(name, value);
            }
        }
    }
    headers
}

/// A DevTools protocol connection: JSON-RPC over one websocket, with events
/// interleaved between command responses.
struct CdpConnection {
    ws: WsStream,
    next_id: u64,
    pending_events: VecDeque<Value>,
}

impl CdpConnection {
    fn new(ws: WsStream) -> Self {
        Self {
            ws,
            next_id: 0,
            pending_events: VecDeque::new(),
        }
    }

    async fn create_target(&mut self) -> Result<String, GatewayError> {
        let created = self
            .call("Target.createTarget", json!({"url": "about:blank"}), None)
            .await?;
        created
            .get("targetId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::UpstreamFailure("createTarget returned no target id".into()))
    }

    async fn close_target(&mut self, target_id: &str) -> Result<(), GatewayError> {
        self.call("Target.closeTarget", json!({"targetId": target_id}), None)
            .await
            .map(|_| ())
    }

    /// Issue one command and wait for its response, parking any events that
    /// arrive in between.
    async fn call(
        &mut self,
        method: &str,
        params: Value,
        session: Option<&str>,
    ) -> Result<Value, GatewayError> {
        self.next_id += 1;
        let id = self.next_id;
        let mut message = json!({"id": id, "method": method, "params": params});
        if let Some(session) = session {
            message["sessionId"] = json!(session);
        }
        self.ws
            .send(Message::Text(message.to_string().into()))
            .await
            .map_err(|e| GatewayError::UpstreamFailure(format!("devtools send: {e}")))?;

        loop {
            let value = self.next_json().await?;
            if value.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(error) = value.get("error") {
                    return Err(GatewayError::UpstreamFailure(format!(
                        "devtools {method}: {error}"
                    )));
                }
                return Ok(value.get("result").cloned().unwrap_or(Value::Null));
            }
            self.pending_events.push_back(value);
        }
    }

    /// Next protocol event, draining parked ones first.
    async fn next_event(&mut self) -> Result<Value, GatewayError> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }
        self.next_json().await
    }

    async fn next_json(&mut self) -> Result<Value, GatewayError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).map_err(|e| {
                        GatewayError::UpstreamFailure(format!("devtools message parse: {e}"))
                    });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(GatewayError::UpstreamFailure(format!("devtools read: {e}")))
                }
                None => {
                    return Err(GatewayError::UpstreamFailure(
                        "devtools connection closed".into(),
                    ))
                }
            }
        }
    }
}
