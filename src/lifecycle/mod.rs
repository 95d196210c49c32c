//! Lifecycle management subsystem.
//!
//! # Design Decisions
//! - Shutdown is a broadcast: every long-running task subscribes once
//! - The server stops accepting, in-flight requests drain, then exit

pub mod shutdown;

pub use shutdown::Shutdown;
