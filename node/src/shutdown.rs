//! Cooperative shutdown for the node's background loops.
//!
//! Loops subscribe and `select!` on the receiver next to their interval.
//! Triggering is one-shot: later calls are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every subscriber. Returns false if shutdown was already
    /// triggered.
    pub fn shutdown(&self) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_is_notified() {
        let controller = ShutdownController::new();
        let mut forging = controller.subscribe();
        let mut sync = controller.subscribe();
        assert!(controller.shutdown());
        assert!(forging.recv().await.is_ok());
        assert!(sync.recv().await.is_ok());
    }

    #[test]
    fn triggering_twice_is_a_no_op() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shutdown());
        assert!(controller.shutdown());
        assert!(!controller.shutdown());
        assert!(controller.is_shutdown());
    }
}
