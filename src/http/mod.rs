//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, request id)
//!     → gateway (auth → sanitize → engine fetch)
//!     → relay (filtered headers + CORS)
//!     → Send to client
//! ```

pub mod server;

pub use server::HttpServer;
