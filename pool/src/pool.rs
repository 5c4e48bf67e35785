//! The unconfirmed transaction pool.
//!
//! Transactions move `received -> validated -> (pending ->) ready`. Static
//! checks happen on admission, state checks in [`TransactionPool::verify_received`],
//! and the signature count decides between `pending` and `ready` in
//! [`TransactionPool::fill_pool`]. Only `ready` transactions are offered to
//! the forger.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::queue::{PooledTransaction, QueueKind, TransactionQueue};
use kestrel_ledger::{ProcessTransactions, SignatureOutcome, VerifyContext};
use kestrel_store::{Account, Storage};
use kestrel_transactions::{Transaction, TransactionResponse};
use kestrel_types::{PublicKey, Signature, Timestamp, TransactionId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transactions pending or carrying co-signatures live this many times
/// longer than plain ones.
const SIGNED_TIMEOUT_FACTOR: u32 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub received: usize,
    pub validated: usize,
    pub pending: usize,
    pub ready: usize,
}

impl PoolCounts {
    pub fn total(&self) -> usize {
        self.received + self.validated + self.pending + self.ready
    }
}

pub struct TransactionPool {
    config: PoolConfig,
    engine: Arc<ProcessTransactions>,
    storage: Arc<dyn Storage>,
    received: TransactionQueue,
    validated: TransactionQueue,
    pending: TransactionQueue,
    ready: TransactionQueue,
}

impl TransactionPool {
    pub fn new(config: PoolConfig, engine: Arc<ProcessTransactions>, storage: Arc<dyn Storage>) -> Self {
        let capacity = config.max_transactions_per_queue;
        Self {
            config,
            engine,
            storage,
            received: TransactionQueue::new(QueueKind::Received, capacity),
            validated: TransactionQueue::new(QueueKind::Validated, capacity),
            pending: TransactionQueue::new(QueueKind::Pending, capacity),
            ready: TransactionQueue::new(QueueKind::Ready, capacity),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    // ── Queue plumbing ─────────────────────────────────────────────────

    /// Queues in forging priority order.
    fn queues(&self) -> [&TransactionQueue; 4] {
        [&self.ready, &self.pending, &self.validated, &self.received]
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut TransactionQueue {
        match kind {
            QueueKind::Received => &mut self.received,
            QueueKind::Validated => &mut self.validated,
            QueueKind::Pending => &mut self.pending,
            QueueKind::Ready => &mut self.ready,
        }
    }

    fn locate(&self, id: &TransactionId) -> Option<(QueueKind, &PooledTransaction)> {
        self.queues()
            .into_iter()
            .find_map(|queue| queue.get(id).map(|entry| (queue.kind(), entry)))
    }

    fn remove_everywhere(&mut self, id: &TransactionId) -> Option<PooledTransaction> {
        let mut removed = None;
        for kind in [
            QueueKind::Received,
            QueueKind::Validated,
            QueueKind::Pending,
            QueueKind::Ready,
        ] {
            if let Some(entry) = self.queue_mut(kind).remove(id) {
                removed = Some(entry);
            }
        }
        removed
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.locate(id).is_some()
    }

    pub fn queue_of(&self, id: &TransactionId) -> Option<QueueKind> {
        self.locate(id).map(|(kind, _)| kind)
    }

    pub fn counts(&self) -> PoolCounts {
        PoolCounts {
            received: self.received.len(),
            validated: self.validated.len(),
            pending: self.pending.len(),
            ready: self.ready.len(),
        }
    }

    // ── Admission ──────────────────────────────────────────────────────

    fn next_height(&self) -> Result<u64, PoolError> {
        Ok(self.storage.last_block()?.map_or(1, |record| record.height + 1))
    }

    /// Transactions a new one is verified on top of, so that spending is
    /// checked against everything already admitted.
    fn admitted_transactions(&self) -> Vec<Transaction> {
        [&self.ready, &self.pending, &self.validated]
            .into_iter()
            .flat_map(|queue| queue.iter().map(|entry| entry.transaction.clone()))
            .collect()
    }

    /// Duplicate, confirmed and static checks shared by every admission path.
    fn check_admissible(&self, tx: &Transaction) -> Result<(), PoolError> {
        if self.contains(&tx.id) {
            return Err(PoolError::Duplicate(tx.id));
        }
        if self.storage.transaction_exists(&tx.id)? {
            return Err(PoolError::AlreadyConfirmed(tx.id));
        }
        let response = self
            .engine
            .validate_transactions(std::slice::from_ref(tx))
            .into_iter()
            .next()
            .unwrap_or_else(|| TransactionResponse::ok(tx.id));
        rejection(response)
    }

    /// Admit a batch of gossiped transactions into `received`.
    ///
    /// Each transaction gets its own result; one rejection never affects
    /// the rest of the batch.
    pub fn receive_transactions(
        &mut self,
        txs: Vec<Transaction>,
        now: Timestamp,
    ) -> Vec<Result<TransactionId, PoolError>> {
        txs.into_iter()
            .map(|tx| -> Result<TransactionId, PoolError> {
                let id = tx.id;
                self.check_admissible(&tx)?;
                self.received.push(PooledTransaction {
                    transaction: tx,
                    received_at: now,
                })?;
                debug!(transaction_id = %id, "transaction received");
                Ok(id)
            })
            .collect()
    }

    /// Verify up to `verify_batch_size` received transactions against
    /// account state. Survivors move to `validated`; failures are dropped.
    pub fn verify_received(&mut self, now: Timestamp) -> Result<Vec<TransactionResponse>, PoolError> {
        if self.received.is_empty() {
            return Ok(Vec::new());
        }
        let height = self.next_height()?;
        let batch = self.received.take_front(self.config.verify_batch_size);
        let txs: Vec<Transaction> = batch.iter().map(|entry| entry.transaction.clone()).collect();
        let pooled = self.admitted_transactions();
        let responses = self.engine.verify_transactions(
            self.storage.as_ref(),
            &txs,
            &VerifyContext {
                height,
                now,
                pooled: &pooled,
            },
        )?;

        for (entry, response) in batch.into_iter().zip(responses.iter()) {
            if response.is_ok() || response.is_pending() {
                if let Err(err) = self.validated.push(entry) {
                    warn!(transaction_id = %response.id, error = %err, "dropping verified transaction");
                }
            } else {
                debug!(transaction_id = %response.id, reason = %response.reason(), "received transaction failed verification");
            }
        }
        Ok(responses)
    }

    /// Run the complete admission cycle for one locally submitted
    /// transaction and place it in `validated`.
    pub fn process_unconfirmed_transaction(
        &mut self,
        tx: Transaction,
        now: Timestamp,
    ) -> Result<TransactionId, PoolError> {
        let id = tx.id;
        self.check_admissible(&tx)?;
        let height = self.next_height()?;
        let pooled = self.admitted_transactions();
        let response = self
            .engine
            .verify_transactions(
                self.storage.as_ref(),
                std::slice::from_ref(&tx),
                &VerifyContext {
                    height,
                    now,
                    pooled: &pooled,
                },
            )?
            .into_iter()
            .next()
            .unwrap_or_else(|| TransactionResponse::ok(id));
        if !response.is_ok() && !response.is_pending() {
            self.remove_everywhere(&id);
            debug!(transaction_id = %id, reason = %response.reason(), "unconfirmed transaction rejected");
            return Err(PoolError::Rejected {
                id,
                errors: response.errors,
            });
        }
        self.validated.push(PooledTransaction {
            transaction: tx,
            received_at: now,
        })?;
        debug!(transaction_id = %id, "unconfirmed transaction validated");
        Ok(id)
    }

    fn sender_account(&self, tx: &Transaction) -> Result<Account, PoolError> {
        let address = tx.sender_address();
        Ok(self
            .storage
            .get_account(&address)?
            .unwrap_or_else(|| Account::new(address)))
    }

    /// Promote pending transactions that became ready, then move up to
    /// `fill_batch_size` validated transactions to `ready` or `pending`.
    /// Returns how many transactions entered `ready`.
    pub fn fill_pool(&mut self) -> Result<usize, PoolError> {
        let mut promoted = 0;

        let mut completed = Vec::new();
        for entry in self.pending.iter() {
            if entry.transaction.is_ready(&self.sender_account(&entry.transaction)?) {
                completed.push(entry.transaction.id);
            }
        }
        for id in completed {
            if self.ready.is_full() {
                break;
            }
            if let Some(entry) = self.pending.remove(&id) {
                self.ready.push(entry)?;
                promoted += 1;
            }
        }

        let room = self
            .config
            .max_transactions_per_queue
            .saturating_sub(self.ready.len());
        let batch = self.validated.take_front(self.config.fill_batch_size.min(room));
        for entry in batch {
            let id = entry.transaction.id;
            let sender = self.sender_account(&entry.transaction)?;
            let target = if entry.transaction.is_ready(&sender) {
                QueueKind::Ready
            } else {
                QueueKind::Pending
            };
            match self.queue_mut(target).push(entry) {
                Ok(()) if target == QueueKind::Ready => promoted += 1,
                Ok(()) => {}
                Err(err) => warn!(transaction_id = %id, error = %err, "dropping transaction during fill"),
            }
        }

        if promoted > 0 {
            debug!(promoted, ready = self.ready.len(), "pool filled");
        }
        Ok(promoted)
    }

    /// Attach a co-signature to a pooled transaction. A pending transaction
    /// that collects its last signature moves to `ready`.
    pub fn process_signature(
        &mut self,
        id: &TransactionId,
        signature: Signature,
    ) -> Result<SignatureOutcome, PoolError> {
        let (kind, entry) = self.locate(id).ok_or(PoolError::NotFound(*id))?;
        let outcome = self
            .engine
            .process_signature(self.storage.as_ref(), &entry.transaction, signature)?;

        self.queue_mut(kind).update(outcome.transaction.clone());
        if outcome.ready && kind == QueueKind::Pending && !self.ready.is_full() {
            if let Some(entry) = self.pending.remove(id) {
                self.ready.push(entry)?;
                info!(transaction_id = %id, "multisignature transaction ready");
            }
        }
        Ok(outcome)
    }

    // ── Chain feedback ─────────────────────────────────────────────────

    /// Drop transactions a new block confirmed.
    pub fn on_confirmed_transactions(&mut self, ids: &[TransactionId]) -> usize {
        ids.iter()
            .filter(|id| self.remove_everywhere(id).is_some())
            .count()
    }

    /// Give the transactions of a deleted block another chance: they go
    /// back through `received` and full verification.
    pub fn on_deleted_transactions(&mut self, txs: Vec<Transaction>, now: Timestamp) -> usize {
        let mut readmitted = 0;
        for tx in txs {
            let id = tx.id;
            self.remove_everywhere(&id);
            match self.received.push(PooledTransaction {
                transaction: tx,
                received_at: now,
            }) {
                Ok(()) => readmitted += 1,
                Err(err) => warn!(transaction_id = %id, error = %err, "cannot re-admit deleted transaction"),
            }
        }
        readmitted
    }

    fn timeout_secs(&self, kind: QueueKind, tx: &Transaction) -> u32 {
        let base = self.engine.params().unconfirmed_transaction_timeout;
        if let Some(hours) = tx.multisignature_lifetime_hours() {
            u32::from(hours) * 3600
        } else if kind == QueueKind::Pending || !tx.signatures.is_empty() {
            base.saturating_mul(SIGNED_TIMEOUT_FACTOR)
        } else {
            base
        }
    }

    /// Remove every transaction that outlived its timeout.
    pub fn expire_transactions(&mut self, now: Timestamp) -> Vec<TransactionId> {
        let mut expired = Vec::new();
        for queue in self.queues() {
            let kind = queue.kind();
            for entry in queue.iter() {
                let timeout = self.timeout_secs(kind, &entry.transaction);
                if entry.received_at.has_expired(timeout, now) {
                    expired.push(entry.transaction.id);
                }
            }
        }
        for id in &expired {
            self.remove_everywhere(id);
            info!(transaction_id = %id, "expired unconfirmed transaction");
        }
        expired
    }

    // ── Lookups ────────────────────────────────────────────────────────

    pub fn get_unconfirmed_transaction(&self, id: &TransactionId) -> Option<&Transaction> {
        self.locate(id).map(|(_, entry)| &entry.transaction)
    }

    /// Received and validated transactions, not yet sorted by signatures.
    pub fn get_queued_transaction_list(&self, reverse: bool, limit: usize) -> Vec<&Transaction> {
        collect_listed(&[&self.received, &self.validated], reverse, limit)
    }

    /// Transactions waiting for co-signatures.
    pub fn get_multisignature_transaction_list(&self, reverse: bool, limit: usize) -> Vec<&Transaction> {
        collect_listed(&[&self.pending], reverse, limit)
    }

    pub fn get_ready_transaction_list(&self, reverse: bool, limit: usize) -> Vec<&Transaction> {
        collect_listed(&[&self.ready], reverse, limit)
    }

    /// Every pooled transaction, ready ones first.
    pub fn get_merged_transaction_list(&self, reverse: bool, limit: usize) -> Vec<&Transaction> {
        collect_listed(&self.queues(), reverse, limit)
    }

    /// Oldest ready transactions, for the next forged block.
    pub fn ready_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.ready
            .list(false, limit)
            .into_iter()
            .map(|entry| entry.transaction.clone())
            .collect()
    }

    pub fn pooled_transactions_from_sender(&self, sender: &PublicKey) -> Vec<&Transaction> {
        self.queues()
            .into_iter()
            .flat_map(|queue| queue.iter())
            .map(|entry| &entry.transaction)
            .filter(|tx| &tx.sender_public_key == sender)
            .collect()
    }
}

fn rejection(response: TransactionResponse) -> Result<(), PoolError> {
    if response.is_ok() || response.is_pending() {
        Ok(())
    } else {
        Err(PoolError::Rejected {
            id: response.id,
            errors: response.errors,
        })
    }
}

fn collect_listed<'a>(queues: &[&'a TransactionQueue], reverse: bool, limit: usize) -> Vec<&'a Transaction> {
    let mut listed = Vec::new();
    for queue in queues {
        let remaining = limit - listed.len();
        if remaining == 0 {
            break;
        }
        listed.extend(queue.list(reverse, remaining).into_iter().map(|entry| &entry.transaction));
    }
    listed
}
