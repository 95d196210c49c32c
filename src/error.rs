//! Gateway error taxonomy.
//!
//! Every failure the request pipeline can produce maps onto one of these
//! variants, and every variant maps onto exactly one HTTP status and one
//! JSON error body. Upstream responses with non-2xx statuses are NOT
//! errors: they relay through with their original status.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// A request-pipeline failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The caller's payload failed sanitization.
    #[error("{0}")]
    InvalidPayload(String),

    /// Auth is enforced and the caller's token is missing or wrong.
    #[error("Unauthorized. Invalid or missing token.")]
    Unauthorized,

    /// The requested outbound method is outside the allow-list.
    #[error("Method {0} not allowed.")]
    MethodNotAllowed(String),

    /// The inbound body exceeded the configured size limit or could not
    /// be read off the wire.
    #[error("Request body too large.")]
    PayloadTooLarge,

    /// The upstream fetch exceeded its deadline.
    #[error("Request timed out.")]
    UpstreamTimeout,

    /// The upstream fetch failed at the transport level.
    #[error("Proxy request failed.")]
    UpstreamFailure(String),
}

/// The JSON body an error renders as.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl GatewayError {
    /// The HTTP status this error responds with.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UpstreamTimeout => StatusCode::REQUEST_TIMEOUT,
            GatewayError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// The JSON body this error responds with.
    ///
    /// Transport details ride in a separate `details` field so the `error`
    /// message stays stable for callers that match on it.
    pub fn body(&self) -> ErrorBody {
        let details = match self {
            GatewayError::UpstreamFailure(details) => Some(details.clone()),
            _ => None,
        };
        ErrorBody {
            error: self.to_string(),
            details,
        }
    }
}
