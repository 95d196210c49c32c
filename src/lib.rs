//! Pluggable outbound-fetch gateway library.

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
