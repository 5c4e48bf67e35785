//! Chain events for rebroadcast and local subscribers.

use kestrel_ledger::Block;
use kestrel_transactions::Transaction;
use kestrel_types::{ForkEvent, Signature, TransactionId};
use std::sync::RwLock;
use tracing::warn;

#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// A block was applied and became the new tip.
    NewBlock { block: Block, broadcast: bool },
    /// The tip was removed; its transactions are unconfirmed again.
    DeletedBlock { block: Block },
    /// A transaction entered the pool.
    UnconfirmedTransaction {
        transaction: Transaction,
        broadcast: bool,
    },
    /// A co-signature was attached to a pooled transaction.
    Signature {
        transaction_id: TransactionId,
        signature: Signature,
    },
    /// A round closed at `height`.
    FinishRound { round: u64, height: u64 },
    /// A competing block was rejected.
    Fork(ForkEvent),
}

type Listener = Box<dyn Fn(&ChainEvent) + Send + Sync>;

/// Synchronous fan-out event bus.
///
/// Listeners run inline on the emitting thread, which is usually the
/// sequencer; keep handlers short and never emit from inside one.
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Listener) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(_) => warn!("event bus lock poisoned, listener dropped"),
        }
    }

    pub fn emit(&self, event: &ChainEvent) {
        match self.listeners.read() {
            Ok(listeners) => {
                for listener in listeners.iter() {
                    listener(event);
                }
            }
            Err(_) => warn!("event bus lock poisoned, event dropped"),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |event| {
            if matches!(event, ChainEvent::FinishRound { round: 3, .. }) {
                c2.fetch_add(10, Ordering::SeqCst);
            }
        }));

        bus.emit(&ChainEvent::FinishRound { round: 3, height: 303 });
        assert_eq!(counter.load(Ordering::SeqCst), 11);
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn emit_with_no_listeners_is_noop() {
        let bus = EventBus::new();
        bus.emit(&ChainEvent::FinishRound { round: 1, height: 1 });
    }
}
