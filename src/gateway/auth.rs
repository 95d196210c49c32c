//! Auth gate.
//!
//! # Responsibilities
//! - Compare the caller token against the configured secret
//! - Run strictly before sanitization and any upstream call
//!
//! # Design Decisions
//! - No secret configured means open mode: every caller passes
//! - OPTIONS preflights never reach this gate; the HTTP layer answers them
//! - Comparison is exact string equality, matching the source system; the
//!   timing side channel is a known, documented trade-off

use crate::config::schema::AuthConfig;
use crate::error::GatewayError;
use crate::gateway::payload::InboundRequest;

/// Check the caller's token against configuration.
pub fn check(inbound: &InboundRequest, config: &AuthConfig) -> Result<(), GatewayError> {
    let Some(secret) = config.effective_secret() else {
        return Ok(());
    };

    match inbound.token() {
        Some(token) if token == secret => Ok(()),
        _ => Err(GatewayError::Unauthorized),
    }
}
