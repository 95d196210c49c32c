//! Request gateway subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → auth.rs (token gate; OPTIONS never gets this far)
//!     → payload.rs (sanitize {url, method, headers, body})
//!     → engine selection (version flag or deployment default)
//!     → engine fetch (one upstream strategy)
//!     → relay (CORS merged in by the serving layer)
//! ```
//!
//! # Design Decisions
//! - Auth strictly precedes sanitization, which strictly precedes any
//!   engine call; a bad token never learns whether its url was valid
//! - All failures convert to the error taxonomy here; the serving layer
//!   only renders them

pub mod auth;
pub mod cors;
pub mod media;
pub mod payload;

use crate::config::GatewayConfig;
use crate::engine::{EngineSet, FetchContext};
use crate::error::GatewayError;
use crate::relay::ProxyResponse;

pub use payload::{InboundRequest, ProxyRequest};

/// Run the gate-sanitize-fetch pipeline for one inbound request.
///
/// Returns the upstream response and the name of the engine that served it.
pub async fn dispatch(
    inbound: &InboundRequest,
    config: &GatewayConfig,
    engines: &EngineSet,
) -> Result<(ProxyResponse, &'static str), GatewayError> {
    auth::check(inbound, &config.auth)?;

    let request = payload::sanitize(inbound)?;
    let ctx = FetchContext::from_inbound(inbound);

    let engine = engines.select(inbound.version());
    tracing::debug!(
        engine = engine.name(),
        method = %request.method,
        url = %request.url,
        "Dispatching upstream fetch"
    );

    let response = engine.fetch(&request, &ctx).await?;
    Ok((response, engine.name()))
}
