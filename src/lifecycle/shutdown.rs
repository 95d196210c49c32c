//! Shutdown coordination.
//!
//! One broadcast channel: the serving loop subscribes, and either Ctrl+C
//! (in production) or the test harness triggers it.

use tokio::sync::broadcast;

/// Handle for stopping a running gateway.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// New receiver for a task that should stop on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
