//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, engine
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Labels carry the *engine* rather than the target host: target URLs are
//!   caller-controlled and would explode cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_counter!(
                "gateway_requests_total",
                "Total requests handled, by method, status and engine"
            );
            describe_histogram!(
                "gateway_request_duration_seconds",
                "End-to-end request latency in seconds"
            );
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics exporter");
        }
    }
}

/// Record one handled request.
pub fn record_request(method: &str, status: u16, engine: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("engine", engine.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}
