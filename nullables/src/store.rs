//! Nullable store: thread-safe in-memory storage for testing.
//!
//! All tables sit behind one mutex, so a [`WriteBatch`] is applied to a copy
//! and swapped in only if every operation succeeds.

use kestrel_store::{
    Account, AccountStore, BatchOp, BlockRecord, BlockStore, DappRecord, DappStore, ForkStore,
    RoundStore, Storage, StoreError, StoredBlock, TransactionStore, VoteDelta, WriteBatch,
};
use kestrel_types::{Address, BlockId, ForkEvent, PublicKey, TransactionId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Default)]
struct Tables {
    accounts: HashMap<Address, Account>,
    blocks: BTreeMap<u64, StoredBlock>,
    block_heights: HashMap<BlockId, u64>,
    transactions: HashMap<TransactionId, BlockId>,
    block_transactions: HashMap<BlockId, Vec<TransactionId>>,
    vote_deltas: BTreeMap<u64, Vec<VoteDelta>>,
    round_archives: BTreeMap<u64, Vec<VoteDelta>>,
    delegate_snapshots: BTreeMap<u64, Vec<PublicKey>>,
    dapps: HashMap<TransactionId, DappRecord>,
    out_transfers: HashSet<TransactionId>,
    inert_transactions: HashSet<TransactionId>,
    forks: Vec<ForkEvent>,
}

impl Tables {
    fn append_block(
        &mut self,
        record: &BlockRecord,
        bytes: &[u8],
        transaction_ids: &[TransactionId],
    ) -> Result<(), StoreError> {
        if self.block_heights.contains_key(&record.id) {
            return Err(StoreError::Duplicate(format!("block {}", record.id)));
        }
        if self.blocks.contains_key(&record.height) {
            return Err(StoreError::Duplicate(format!("height {}", record.height)));
        }
        for id in transaction_ids {
            if self.transactions.contains_key(id) {
                return Err(StoreError::Duplicate(format!("transaction {id}")));
            }
        }
        self.blocks.insert(
            record.height,
            StoredBlock {
                record: record.clone(),
                bytes: bytes.to_vec(),
            },
        );
        self.block_heights.insert(record.id, record.height);
        for id in transaction_ids {
            self.transactions.insert(*id, record.id);
        }
        self.block_transactions
            .insert(record.id, transaction_ids.to_vec());
        Ok(())
    }

    fn delete_block(&mut self, id: &BlockId) -> Result<(), StoreError> {
        let height = self
            .block_heights
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("block {id}")))?;
        self.blocks.remove(&height);
        for tx in self.block_transactions.remove(id).unwrap_or_default() {
            self.transactions.remove(&tx);
        }
        Ok(())
    }

    fn apply(&mut self, op: BatchOp) -> Result<(), StoreError> {
        match op {
            BatchOp::PutAccount(account) => {
                self.accounts.insert(account.address, account);
            }
            BatchOp::AppendBlock {
                record,
                bytes,
                transaction_ids,
            } => self.append_block(&record, &bytes, &transaction_ids)?,
            BatchOp::DeleteBlock(id) => self.delete_block(&id)?,
            BatchOp::AppendVoteDeltas(deltas) => {
                for delta in deltas {
                    self.vote_deltas.entry(delta.round).or_default().push(delta);
                }
            }
            BatchOp::ReplaceVoteDeltas { round, deltas } => {
                if deltas.is_empty() {
                    self.vote_deltas.remove(&round);
                } else {
                    self.vote_deltas.insert(round, deltas);
                }
            }
            BatchOp::PutRoundArchive { height, deltas } => {
                self.round_archives.insert(height, deltas);
            }
            BatchOp::DeleteRoundArchive(height) => {
                self.round_archives.remove(&height);
            }
            BatchOp::PutDelegateSnapshot { round, delegates } => {
                self.delegate_snapshots.insert(round, delegates);
            }
            BatchOp::DeleteDelegateSnapshot(round) => {
                self.delegate_snapshots.remove(&round);
            }
            BatchOp::PutDapp(record) => {
                self.dapps.insert(record.transaction_id, record);
            }
            BatchOp::DeleteDapp(id) => {
                self.dapps.remove(&id);
            }
            BatchOp::PutOutTransfer(id) => {
                self.out_transfers.insert(id);
            }
            BatchOp::DeleteOutTransfer(id) => {
                self.out_transfers.remove(&id);
            }
            BatchOp::PutInertTransaction(id) => {
                self.inert_transactions.insert(id);
            }
            BatchOp::DeleteInertTransaction(id) => {
                self.inert_transactions.remove(&id);
            }
        }
        Ok(())
    }
}

/// An in-memory implementation of every storage trait.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<Tables>,
    fail_next_write: AtomicBool,
    fail_next_fork_record: AtomicBool,
    batches_written: AtomicUsize,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))
    }

    /// Make the next batch write fail with a backend error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Make the next fork record fail with a backend error.
    pub fn fail_next_fork_record(&self) {
        self.fail_next_fork_record.store(true, Ordering::SeqCst);
    }

    /// Number of batches applied so far.
    pub fn batches_written(&self) -> usize {
        self.batches_written.load(Ordering::SeqCst)
    }

    /// Every stored account, ordered by address.
    pub fn all_accounts(&self) -> Vec<Account> {
        let Ok(tables) = self.tables() else {
            return Vec::new();
        };
        let mut accounts: Vec<Account> = tables.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.address);
        accounts
    }

    pub fn fork_count(&self) -> usize {
        self.tables().map(|t| t.forks.len()).unwrap_or(0)
    }
}

impl AccountStore for NullStore {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        Ok(self.tables()?.accounts.get(address).cloned())
    }

    fn get_account_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables()?
            .accounts
            .values()
            .find(|a| a.username.as_deref() == Some(username))
            .cloned())
    }

    fn get_account_by_public_key(
        &self,
        public_key: &PublicKey,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables()?
            .accounts
            .values()
            .find(|a| a.public_key.as_ref() == Some(public_key))
            .cloned())
    }

    fn upsert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.tables()?
            .accounts
            .insert(account.address, account.clone());
        Ok(())
    }

    fn top_delegates(&self, limit: usize) -> Result<Vec<Account>, StoreError> {
        let mut delegates: Vec<Account> = self
            .tables()?
            .accounts
            .values()
            .filter(|a| a.is_delegate && a.public_key.is_some())
            .cloned()
            .collect();
        delegates.sort_by(|a, b| b.vote.cmp(&a.vote).then(a.public_key.cmp(&b.public_key)));
        delegates.truncate(limit);
        Ok(delegates)
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.tables()?.accounts.len() as u64)
    }
}

impl BlockStore for NullStore {
    fn append_block(
        &self,
        record: &BlockRecord,
        block_bytes: &[u8],
        transaction_ids: &[TransactionId],
    ) -> Result<(), StoreError> {
        self.tables()?
            .append_block(record, block_bytes, transaction_ids)
    }

    fn delete_block(&self, id: &BlockId) -> Result<(), StoreError> {
        self.tables()?.delete_block(id)
    }

    fn get_block(&self, id: &BlockId) -> Result<Option<StoredBlock>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .block_heights
            .get(id)
            .and_then(|h| tables.blocks.get(h))
            .cloned())
    }

    fn get_block_record(&self, id: &BlockId) -> Result<Option<BlockRecord>, StoreError> {
        Ok(self.get_block(id)?.map(|b| b.record))
    }

    fn block_at_height(&self, height: u64) -> Result<Option<BlockRecord>, StoreError> {
        Ok(self
            .tables()?
            .blocks
            .get(&height)
            .map(|b| b.record.clone()))
    }

    fn get_blocks_range(&self, offset: u64, limit: usize) -> Result<Vec<StoredBlock>, StoreError> {
        Ok(self
            .tables()?
            .blocks
            .range(offset..)
            .take(limit)
            .map(|(_, b)| b.clone())
            .collect())
    }

    fn records_in_height_range(&self, from: u64, to: u64) -> Result<Vec<BlockRecord>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .tables()?
            .blocks
            .range(from..=to)
            .map(|(_, b)| b.record.clone())
            .collect())
    }

    fn last_block(&self) -> Result<Option<BlockRecord>, StoreError> {
        Ok(self
            .tables()?
            .blocks
            .values()
            .next_back()
            .map(|b| b.record.clone()))
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        Ok(self.tables()?.blocks.len() as u64)
    }
}

impl RoundStore for NullStore {
    fn vote_deltas(&self, round: u64) -> Result<Vec<VoteDelta>, StoreError> {
        Ok(self
            .tables()?
            .vote_deltas
            .get(&round)
            .cloned()
            .unwrap_or_default())
    }

    fn round_archive(&self, height: u64) -> Result<Option<Vec<VoteDelta>>, StoreError> {
        Ok(self.tables()?.round_archives.get(&height).cloned())
    }

    fn delegate_snapshot(&self, round: u64) -> Result<Option<Vec<PublicKey>>, StoreError> {
        Ok(self.tables()?.delegate_snapshots.get(&round).cloned())
    }
}

impl TransactionStore for NullStore {
    fn transaction_exists(&self, id: &TransactionId) -> Result<bool, StoreError> {
        Ok(self.tables()?.transactions.contains_key(id))
    }

    fn transaction_block(&self, id: &TransactionId) -> Result<Option<BlockId>, StoreError> {
        Ok(self.tables()?.transactions.get(id).copied())
    }

    fn is_inert_transaction(&self, id: &TransactionId) -> Result<bool, StoreError> {
        Ok(self.tables()?.inert_transactions.contains(id))
    }
}

impl DappStore for NullStore {
    fn get_dapp(&self, id: &TransactionId) -> Result<Option<DappRecord>, StoreError> {
        Ok(self.tables()?.dapps.get(id).cloned())
    }

    fn dapp_by_name(&self, name: &str) -> Result<Option<DappRecord>, StoreError> {
        Ok(self
            .tables()?
            .dapps
            .values()
            .find(|d| d.name == name)
            .cloned())
    }

    fn dapp_by_link(&self, link: &str) -> Result<Option<DappRecord>, StoreError> {
        Ok(self
            .tables()?
            .dapps
            .values()
            .find(|d| d.link == link)
            .cloned())
    }

    fn out_transfer_exists(&self, source: &TransactionId) -> Result<bool, StoreError> {
        Ok(self.tables()?.out_transfers.contains(source))
    }
}

impl ForkStore for NullStore {
    fn record_fork(&self, event: &ForkEvent) -> Result<(), StoreError> {
        if self.fail_next_fork_record.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected fork record failure".into()));
        }
        self.tables()?.forks.push(event.clone());
        Ok(())
    }

    fn recent_forks(&self, limit: usize) -> Result<Vec<ForkEvent>, StoreError> {
        Ok(self
            .tables()?
            .forks
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

impl Storage for NullStore {
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        let mut tables = self.tables()?;
        let mut next = tables.clone();
        for op in batch.into_ops() {
            next.apply(op)?;
        }
        *tables = next;
        self.batches_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
