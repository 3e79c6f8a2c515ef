//! Status text published to the presentation surface.

use std::sync::Arc;
use tokio::sync::watch;

/// Initial status before any scan.
pub const IDLE_STATUS: &str = "Press Start Scan to find your SeatMonitor";

/// Single-value status channel for the presentation layer.
///
/// Only the latest text is kept; slow readers skip intermediate updates.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<String>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Create a board showing [`IDLE_STATUS`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(IDLE_STATUS.to_string());
        Self { tx: Arc::new(tx) }
    }

    /// Replace the displayed text.
    pub fn show(&self, text: impl Into<String>) {
        self.tx.send_replace(text.into());
    }

    /// The current text.
    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    /// Receiver for status updates.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}
