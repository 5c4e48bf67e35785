//! One admission queue: insertion-ordered, keyed by transaction id.
//!
//! The order index makes every listing cost proportional to the number of
//! entries returned, whichever end it is read from.

use crate::error::PoolError;
use kestrel_transactions::Transaction;
use kestrel_types::{TransactionId, Timestamp};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Statically valid, not yet checked against account state.
    Received,
    /// Applies cleanly against account state.
    Validated,
    /// Waiting for multisignature co-signatures.
    Pending,
    /// Eligible for the next block.
    Ready,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Pending => "pending",
            Self::Ready => "ready",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PooledTransaction {
    pub transaction: Transaction,
    /// When the transaction entered the pool.
    pub received_at: Timestamp,
}

struct Slot {
    sequence: u64,
    entry: PooledTransaction,
}

pub struct TransactionQueue {
    kind: QueueKind,
    capacity: usize,
    next_sequence: u64,
    order: BTreeMap<u64, TransactionId>,
    entries: HashMap<TransactionId, Slot>,
}

impl TransactionQueue {
    pub fn new(kind: QueueKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            next_sequence: 0,
            order: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &TransactionId) -> Option<&PooledTransaction> {
        self.entries.get(id).map(|slot| &slot.entry)
    }

    /// Replace the stored transaction of `id`, keeping its position.
    pub fn update(&mut self, transaction: Transaction) -> bool {
        match self.entries.get_mut(&transaction.id) {
            Some(slot) => {
                slot.entry.transaction = transaction;
                true
            }
            None => false,
        }
    }

    /// Append `entry` at the back of the queue.
    pub fn push(&mut self, entry: PooledTransaction) -> Result<(), PoolError> {
        let id = entry.transaction.id;
        if self.entries.contains_key(&id) {
            return Err(PoolError::Duplicate(id));
        }
        if self.is_full() {
            return Err(PoolError::QueueFull {
                queue: self.kind,
                limit: self.capacity,
            });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.order.insert(sequence, id);
        self.entries.insert(id, Slot { sequence, entry });
        Ok(())
    }

    pub fn remove(&mut self, id: &TransactionId) -> Option<PooledTransaction> {
        let slot = self.entries.remove(id)?;
        self.order.remove(&slot.sequence);
        Some(slot.entry)
    }

    /// Up to `limit` entries, oldest first or newest first.
    pub fn list(&self, reverse: bool, limit: usize) -> Vec<&PooledTransaction> {
        let ids: Box<dyn Iterator<Item = &TransactionId>> = if reverse {
            Box::new(self.order.values().rev())
        } else {
            Box::new(self.order.values())
        };
        ids.take(limit)
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Every entry, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PooledTransaction> + '_ {
        self.order.values().filter_map(|id| self.get(id))
    }

    /// Remove and return up to `limit` of the oldest entries.
    pub fn take_front(&mut self, limit: usize) -> Vec<PooledTransaction> {
        let ids: Vec<TransactionId> = self.order.values().take(limit).copied().collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_transactions::{TransactionAsset, TransferAsset};
    use kestrel_types::{PublicKey, Signature};

    fn entry(id: u64) -> PooledTransaction {
        PooledTransaction {
            transaction: Transaction {
                id: TransactionId(id),
                timestamp: Timestamp::new(0),
                sender_public_key: PublicKey([1; 32]),
                requester_public_key: None,
                recipient_id: None,
                amount: id,
                fee: 0,
                asset: TransactionAsset::Transfer(TransferAsset::default()),
                signature: Signature([0; 64]),
                sign_signature: None,
                signatures: Vec::new(),
            },
            received_at: Timestamp::new(0),
        }
    }

    fn ids(entries: Vec<&PooledTransaction>) -> Vec<u64> {
        entries.iter().map(|e| e.transaction.id.0).collect()
    }

    #[test]
    fn lists_in_both_directions() {
        let mut queue = TransactionQueue::new(QueueKind::Received, 10);
        for id in 1..=5 {
            queue.push(entry(id)).unwrap();
        }
        queue.remove(&TransactionId(3));
        assert_eq!(ids(queue.list(false, 3)), vec![1, 2, 4]);
        assert_eq!(ids(queue.list(true, 2)), vec![5, 4]);
    }

    #[test]
    fn rejects_duplicates_and_overflow() {
        let mut queue = TransactionQueue::new(QueueKind::Ready, 2);
        queue.push(entry(1)).unwrap();
        assert!(matches!(queue.push(entry(1)), Err(PoolError::Duplicate(_))));
        queue.push(entry(2)).unwrap();
        assert!(matches!(
            queue.push(entry(3)),
            Err(PoolError::QueueFull {
                queue: QueueKind::Ready,
                limit: 2
            })
        ));
    }

    #[test]
    fn take_front_drains_oldest() {
        let mut queue = TransactionQueue::new(QueueKind::Validated, 10);
        for id in 1..=4 {
            queue.push(entry(id)).unwrap();
        }
        let taken: Vec<u64> = queue.take_front(3).iter().map(|e| e.transaction.id.0).collect();
        assert_eq!(taken, vec![1, 2, 3]);
        assert_eq!(queue.len(), 1);
    }
}
