//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (tracing, timeout, body limit)
//! - Answer CORS preflights before anything else runs
//! - Dispatch requests through the gateway pipeline
//! - Render gateway errors as JSON with CORS attached
//! - Observability (metrics, request ids)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::engine::EngineSet;
use crate::error::GatewayError;
use crate::gateway::{self, cors, InboundRequest};
use crate::observability::metrics;
use crate::relay;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub engines: Arc<EngineSet>,
}

/// HTTP server for the fetch gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Engines (and their HTTP clients) are constructed once here and shared
    /// across requests; per-request state like fingerprint profiles stays
    /// inside each call.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let engines = Arc::new(EngineSet::from_config(&config)?);
        let state = AppState {
            config: Arc::new(config.clone()),
            engines,
        };
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/proxy", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Stops on Ctrl+C or when the shutdown channel fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Main gateway handler.
/// Computes CORS, answers preflights, then runs the gateway pipeline.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    // Set by the request-id layer: caller-supplied or generated per request.
    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let origin = parts.headers.get("origin").and_then(|v| v.to_str().ok());
    let cors = cors::cors_headers(origin, &state.config.cors);

    // Preflights never reach the auth gate.
    if parts.method == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        for (name, value) in &cors {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        metrics::record_request("OPTIONS", 204, "none", start);
        return response;
    }

    let method = parts.method.clone();
    let body_bytes = match axum::body::to_bytes(body, state.config.listener.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let error = GatewayError::PayloadTooLarge;
            tracing::warn!(
                request_id = %request_id,
                status = error.status().as_u16(),
                "Request body rejected"
            );
            metrics::record_request(method.as_str(), error.status().as_u16(), "none", start);
            return error_response(&error, &cors);
        }
    };
    let inbound =
        InboundRequest::from_parts(method.clone(), parts.headers, parts.uri.query(), &body_bytes);

    match gateway::dispatch(&inbound, &state.config, &state.engines).await {
        Ok((proxy, engine)) => {
            let status = proxy.status;
            tracing::info!(
                request_id = %request_id,
                engine = engine,
                status = status.as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request relayed"
            );
            metrics::record_request(method.as_str(), status.as_u16(), engine, start);
            relay::into_response(proxy, &cors)
        }
        Err(error) => {
            tracing::warn!(
                request_id = %request_id,
                status = error.status().as_u16(),
                error = %error,
                "Request rejected"
            );
            metrics::record_request(method.as_str(), error.status().as_u16(), "none", start);
            error_response(&error, &cors)
        }
    }
}

/// Render a gateway error as a JSON response with CORS attached.
fn error_response(
    error: &GatewayError,
    cors: &[(axum::http::HeaderName, HeaderValue)],
) -> Response {
    let body = serde_json::to_vec(&error.body()).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = error.status();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in cors {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    response
}

/// Wait for shutdown: Ctrl+C or the coordinator's broadcast.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if result.is_err() {
                tracing::error!("Failed to install Ctrl+C handler");
            }
        }
        _ = shutdown.recv() => {}
    }
    tracing::info!("Shutdown signal received");
}
