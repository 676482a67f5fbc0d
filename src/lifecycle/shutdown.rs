//! Manual shutdown trigger for a server.

use std::sync::Arc;
use tokio::sync::watch;

/// Latched, cloneable shutdown trigger.
///
/// `trigger` never blocks and may be called any number of times from any
/// task; only the first call has an effect.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the shutdown. Returns true if this call was the first one.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Whether `trigger` has been called.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the shutdown has been triggered.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
