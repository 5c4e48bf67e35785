//! Transactional view over account, round, transaction and dapp state.
//!
//! A `StateStore` reads through to the backend on first reference, keeps
//! every change in memory, and writes them in one atomic batch on
//! [`StateStore::commit`]. A read-only store accepts changes (dry runs need
//! them) but refuses to commit.
//!
//! Every in-memory change is journaled. [`StateStore::create_snapshot`]
//! marks the journal and [`StateStore::restore_snapshot`] rewinds to the most
//! recent mark, so snapshots nest. Staged block, archive and delegate-snapshot
//! operations are outside the journal: they belong to block processing, never
//! to a dry run.

use crate::account::Account;
use crate::batch::{BatchOp, WriteBatch};
use crate::block::BlockRecord;
use crate::dapp::DappRecord;
use crate::round::{RoundSummary, VoteDelta};
use crate::{summarize, Storage, StoreError};
use kestrel_types::slots::{first_height_of_round, last_height_of_round};
use kestrel_types::{Address, BlockId, PublicKey, TransactionId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateMode {
    Mutate,
    ReadOnly,
}

/// Rows to load before a batch of transactions is processed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrepareRequest {
    pub addresses: Vec<Address>,
    pub usernames: Vec<String>,
    pub dapps: Vec<TransactionId>,
    pub out_transfers: Vec<TransactionId>,
}

impl PrepareRequest {
    pub fn extend(&mut self, other: PrepareRequest) {
        self.addresses.extend(other.addresses);
        self.usernames.extend(other.usernames);
        self.dapps.extend(other.dapps);
        self.out_transfers.extend(other.out_transfers);
    }
}

enum JournalEntry {
    Account {
        address: Address,
        previous: Option<Account>,
        was_dirty: bool,
    },
    VoteDeltaAdded {
        round: u64,
    },
    RoundFlushed {
        round: u64,
        previous_added: Vec<VoteDelta>,
        was_flushed: bool,
    },
    TransactionAdded,
    TransactionRemoved {
        index: usize,
        id: TransactionId,
    },
    Dapp {
        id: TransactionId,
        previous: Option<Option<DappRecord>>,
        was_dirty: bool,
    },
    OutTransfer {
        id: TransactionId,
        previous: Option<bool>,
        was_dirty: bool,
    },
    Inert {
        id: TransactionId,
        previous: Option<bool>,
        was_dirty: bool,
    },
}

pub struct StateStore<'a> {
    storage: &'a dyn Storage,
    mode: StateMode,

    accounts: HashMap<Address, Account>,
    dirty_accounts: BTreeSet<Address>,

    /// Deltas added in this unit of work, per round.
    added_deltas: BTreeMap<u64, Vec<VoteDelta>>,
    /// Rounds whose persisted deltas were consumed by a land.
    flushed_rounds: BTreeSet<u64>,

    /// Transactions applied in this unit of work, in order.
    transactions: Vec<TransactionId>,

    dapps: HashMap<TransactionId, Option<DappRecord>>,
    dirty_dapps: BTreeSet<TransactionId>,
    out_transfers: HashMap<TransactionId, bool>,
    dirty_out_transfers: BTreeSet<TransactionId>,
    inert: HashMap<TransactionId, bool>,
    dirty_inert: BTreeSet<TransactionId>,

    staged: Vec<BatchOp>,

    journal: Vec<JournalEntry>,
    snapshots: Vec<usize>,
}

impl<'a> StateStore<'a> {
    pub fn new(storage: &'a dyn Storage, mode: StateMode) -> Self {
        Self {
            storage,
            mode,
            accounts: HashMap::new(),
            dirty_accounts: BTreeSet::new(),
            added_deltas: BTreeMap::new(),
            flushed_rounds: BTreeSet::new(),
            transactions: Vec::new(),
            dapps: HashMap::new(),
            dirty_dapps: BTreeSet::new(),
            out_transfers: HashMap::new(),
            dirty_out_transfers: BTreeSet::new(),
            inert: HashMap::new(),
            dirty_inert: BTreeSet::new(),
            staged: Vec::new(),
            journal: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn mutating(storage: &'a dyn Storage) -> Self {
        Self::new(storage, StateMode::Mutate)
    }

    pub fn read_only(storage: &'a dyn Storage) -> Self {
        Self::new(storage, StateMode::ReadOnly)
    }

    pub fn mode(&self) -> StateMode {
        self.mode
    }

    pub fn storage(&self) -> &'a dyn Storage {
        self.storage
    }

    // ── Preparation ─────────────────────────────────────────────────────

    /// Load every row `request` names in as few backend calls as possible.
    pub fn prepare(&mut self, request: &PrepareRequest) -> Result<(), StoreError> {
        let missing: Vec<Address> = request
            .addresses
            .iter()
            .filter(|a| !self.accounts.contains_key(a))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            for account in self.storage.get_accounts(&missing)? {
                self.accounts.insert(account.address, account);
            }
            for address in missing {
                self.accounts
                    .entry(address)
                    .or_insert_with(|| Account::new(address));
            }
        }

        for username in &request.usernames {
            self.account_by_username(username)?;
        }
        for id in &request.dapps {
            self.get_dapp(id)?;
        }
        for id in &request.out_transfers {
            self.out_transfer_exists(id)?;
        }
        Ok(())
    }

    // ── Accounts ────────────────────────────────────────────────────────

    /// The account at `address`, created empty if it was never referenced.
    pub fn get_account(&mut self, address: &Address) -> Result<Account, StoreError> {
        if let Some(account) = self.accounts.get(address) {
            return Ok(account.clone());
        }
        let account = self
            .storage
            .get_account(address)?
            .unwrap_or_else(|| Account::new(*address));
        self.accounts.insert(*address, account.clone());
        Ok(account)
    }

    pub fn set_account(&mut self, account: Account) {
        let address = account.address;
        let previous = self.accounts.insert(address, account);
        let was_dirty = !self.dirty_accounts.insert(address);
        self.journal.push(JournalEntry::Account {
            address,
            previous,
            was_dirty,
        });
    }

    /// The account registered under `username`, as seen by this unit of work.
    pub fn account_by_username(&mut self, username: &str) -> Result<Option<Account>, StoreError> {
        let matches = |a: &Account| {
            a.username.as_deref() == Some(username) || a.u_username.as_deref() == Some(username)
        };
        if let Some(account) = self.accounts.values().find(|a| matches(a)) {
            return Ok(Some(account.clone()));
        }
        match self.storage.get_account_by_username(username)? {
            // The cached copy is newer and no longer carries the name.
            Some(stored) if self.accounts.contains_key(&stored.address) => Ok(None),
            Some(stored) => {
                self.accounts.insert(stored.address, stored.clone());
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    /// Accounts changed since journal `position`, with their state at that point.
    pub fn accounts_changed_since(&self, position: usize) -> Vec<(Address, Account)> {
        let mut before: BTreeMap<Address, Account> = BTreeMap::new();
        for entry in self.journal.get(position..).unwrap_or(&[]) {
            if let JournalEntry::Account {
                address, previous, ..
            } = entry
            {
                before.entry(*address).or_insert_with(|| {
                    previous.clone().unwrap_or_else(|| Account::new(*address))
                });
            }
        }
        before.into_iter().collect()
    }

    pub fn journal_position(&self) -> usize {
        self.journal.len()
    }

    // ── Vote deltas ─────────────────────────────────────────────────────

    pub fn add_vote_delta(&mut self, delta: VoteDelta) {
        if delta.amount == 0 {
            return;
        }
        let round = delta.round;
        self.added_deltas.entry(round).or_default().push(delta);
        self.journal.push(JournalEntry::VoteDeltaAdded { round });
    }

    /// Pending deltas of `round`: persisted rows (unless flushed) then new rows.
    pub fn vote_deltas(&self, round: u64) -> Result<Vec<VoteDelta>, StoreError> {
        let mut rows = if self.flushed_rounds.contains(&round) {
            Vec::new()
        } else {
            self.storage.vote_deltas(round)?
        };
        if let Some(added) = self.added_deltas.get(&round) {
            rows.extend(added.iter().cloned());
        }
        Ok(rows)
    }

    /// Net pending delta per delegate for `round`. Zero totals are omitted.
    pub fn vote_totals(&self, round: u64) -> Result<BTreeMap<PublicKey, i64>, StoreError> {
        let mut totals: BTreeMap<PublicKey, i64> = BTreeMap::new();
        for row in self.vote_deltas(round)? {
            *totals.entry(row.delegate).or_default() += row.amount;
        }
        totals.retain(|_, amount| *amount != 0);
        Ok(totals)
    }

    /// Remove and return every pending delta of `round`.
    pub fn flush_round(&mut self, round: u64) -> Result<Vec<VoteDelta>, StoreError> {
        let rows = self.vote_deltas(round)?;
        let previous_added = self.added_deltas.remove(&round).unwrap_or_default();
        let was_flushed = !self.flushed_rounds.insert(round);
        self.journal.push(JournalEntry::RoundFlushed {
            round,
            previous_added,
            was_flushed,
        });
        Ok(rows)
    }

    /// Make `rows` the complete set of pending deltas of `round`.
    pub fn restore_round(&mut self, round: u64, rows: Vec<VoteDelta>) -> Result<(), StoreError> {
        self.flush_round(round)?;
        for mut row in rows {
            row.round = round;
            self.add_vote_delta(row);
        }
        Ok(())
    }

    // ── Transactions ────────────────────────────────────────────────────

    pub fn add_transaction(&mut self, id: TransactionId) {
        self.transactions.push(id);
        self.journal.push(JournalEntry::TransactionAdded);
    }

    pub fn remove_transaction(&mut self, id: &TransactionId) {
        if let Some(index) = self.transactions.iter().position(|t| t == id) {
            self.transactions.remove(index);
            self.journal
                .push(JournalEntry::TransactionRemoved { index, id: *id });
        }
    }

    pub fn is_transaction_pending(&self, id: &TransactionId) -> bool {
        self.transactions.contains(id)
    }

    /// Whether `id` was confirmed as an exception without effect.
    pub fn is_inert_transaction(&mut self, id: &TransactionId) -> Result<bool, StoreError> {
        if let Some(inert) = self.inert.get(id) {
            return Ok(*inert);
        }
        let inert = self.storage.is_inert_transaction(id)?;
        self.inert.insert(*id, inert);
        Ok(inert)
    }

    pub fn set_inert_transaction(&mut self, id: TransactionId, inert: bool) {
        let previous = self.inert.insert(id, inert);
        let was_dirty = !self.dirty_inert.insert(id);
        self.journal.push(JournalEntry::Inert {
            id,
            previous,
            was_dirty,
        });
    }

    /// Transactions applied in this unit of work, in order.
    pub fn pending_transactions(&self) -> &[TransactionId] {
        &self.transactions
    }

    // ── Dapps ───────────────────────────────────────────────────────────

    pub fn get_dapp(&mut self, id: &TransactionId) -> Result<Option<DappRecord>, StoreError> {
        if let Some(cached) = self.dapps.get(id) {
            return Ok(cached.clone());
        }
        let record = self.storage.get_dapp(id)?;
        self.dapps.insert(*id, record.clone());
        Ok(record)
    }

    pub fn dapp_by_name(&mut self, name: &str) -> Result<Option<DappRecord>, StoreError> {
        let stored = self.storage.dapp_by_name(name)?;
        self.find_dapp(|d| d.name == name, stored)
    }

    pub fn dapp_by_link(&mut self, link: &str) -> Result<Option<DappRecord>, StoreError> {
        let stored = self.storage.dapp_by_link(link)?;
        self.find_dapp(|d| d.link == link, stored)
    }

    fn find_dapp(
        &mut self,
        matches: impl Fn(&DappRecord) -> bool,
        stored: Option<DappRecord>,
    ) -> Result<Option<DappRecord>, StoreError> {
        if let Some(record) = self.dapps.values().flatten().find(|d| matches(d)) {
            return Ok(Some(record.clone()));
        }
        match stored {
            Some(record) if self.dapps.contains_key(&record.transaction_id) => Ok(None),
            Some(record) => {
                self.dapps.insert(record.transaction_id, Some(record.clone()));
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn put_dapp(&mut self, record: DappRecord) {
        let id = record.transaction_id;
        self.set_dapp(id, Some(record));
    }

    pub fn remove_dapp(&mut self, id: &TransactionId) {
        self.set_dapp(*id, None);
    }

    fn set_dapp(&mut self, id: TransactionId, value: Option<DappRecord>) {
        let previous = self.dapps.insert(id, value);
        let was_dirty = !self.dirty_dapps.insert(id);
        self.journal.push(JournalEntry::Dapp {
            id,
            previous,
            was_dirty,
        });
    }

    pub fn out_transfer_exists(&mut self, source: &TransactionId) -> Result<bool, StoreError> {
        if let Some(exists) = self.out_transfers.get(source) {
            return Ok(*exists);
        }
        let exists = self.storage.out_transfer_exists(source)?;
        self.out_transfers.insert(*source, exists);
        Ok(exists)
    }

    pub fn set_out_transfer(&mut self, source: TransactionId, exists: bool) {
        let previous = self.out_transfers.insert(source, exists);
        let was_dirty = !self.dirty_out_transfers.insert(source);
        self.journal.push(JournalEntry::OutTransfer {
            id: source,
            previous,
            was_dirty,
        });
    }

    // ── Staged block-level operations ───────────────────────────────────

    /// Stage the block together with every transaction applied so far.
    pub fn stage_block_append(&mut self, record: BlockRecord, bytes: Vec<u8>) {
        self.staged.push(BatchOp::AppendBlock {
            record,
            bytes,
            transaction_ids: self.transactions.clone(),
        });
    }

    pub fn stage_block_delete(&mut self, id: BlockId) {
        self.staged.push(BatchOp::DeleteBlock(id));
    }

    pub fn stage_round_archive(&mut self, height: u64, deltas: Vec<VoteDelta>) {
        self.staged.push(BatchOp::PutRoundArchive { height, deltas });
    }

    /// Remove and return the archive written when a round closed at `height`.
    pub fn take_round_archive(&mut self, height: u64) -> Result<Vec<VoteDelta>, StoreError> {
        let staged = self.staged.iter().rev().find_map(|op| match op {
            BatchOp::PutRoundArchive { height: h, deltas } if *h == height => {
                Some(deltas.clone())
            }
            _ => None,
        });
        let deltas = match staged {
            Some(deltas) => deltas,
            None => self
                .storage
                .round_archive(height)?
                .ok_or_else(|| StoreError::NotFound(format!("round archive at height {height}")))?,
        };
        self.staged.push(BatchOp::DeleteRoundArchive(height));
        Ok(deltas)
    }

    pub fn stage_delegate_snapshot(&mut self, round: u64, delegates: Vec<PublicKey>) {
        self.staged
            .push(BatchOp::PutDelegateSnapshot { round, delegates });
    }

    pub fn stage_delegate_snapshot_removal(&mut self, round: u64) {
        self.staged.push(BatchOp::DeleteDelegateSnapshot(round));
    }

    pub fn staged_operations(&self) -> &[BatchOp] {
        &self.staged
    }

    /// Round totals over persisted blocks merged with staged appends.
    pub fn sum_round(&self, round: u64, active_delegates: u64) -> Result<RoundSummary, StoreError> {
        let first = first_height_of_round(round, active_delegates);
        let last = last_height_of_round(round, active_delegates);
        let deleted: BTreeSet<BlockId> = self
            .staged
            .iter()
            .filter_map(|op| match op {
                BatchOp::DeleteBlock(id) => Some(*id),
                _ => None,
            })
            .collect();

        let mut records: Vec<BlockRecord> = self
            .storage
            .records_in_height_range(first, last)?
            .into_iter()
            .filter(|r| !deleted.contains(&r.id))
            .collect();
        for op in &self.staged {
            if let BatchOp::AppendBlock { record, .. } = op {
                if (first..=last).contains(&record.height) && !deleted.contains(&record.id) {
                    records.push(record.clone());
                }
            }
        }
        records.sort_by_key(|r| r.height);
        Ok(summarize(records.iter()))
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    pub fn create_snapshot(&mut self) {
        self.snapshots.push(self.journal.len());
    }

    /// Undo every journaled change made since the most recent snapshot.
    pub fn restore_snapshot(&mut self) -> Result<(), StoreError> {
        let mark = self.snapshots.pop().ok_or(StoreError::NoSnapshot)?;
        while self.journal.len() > mark {
            if let Some(entry) = self.journal.pop() {
                self.revert(entry);
            }
        }
        Ok(())
    }

    /// Drop the most recent snapshot, keeping the changes made since.
    pub fn release_snapshot(&mut self) -> Result<(), StoreError> {
        self.snapshots.pop().map(|_| ()).ok_or(StoreError::NoSnapshot)
    }

    fn revert(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Account {
                address,
                previous,
                was_dirty,
            } => {
                match previous {
                    Some(account) => self.accounts.insert(address, account),
                    None => self.accounts.remove(&address),
                };
                if !was_dirty {
                    self.dirty_accounts.remove(&address);
                }
            }
            JournalEntry::VoteDeltaAdded { round } => {
                if let Some(rows) = self.added_deltas.get_mut(&round) {
                    rows.pop();
                    if rows.is_empty() {
                        self.added_deltas.remove(&round);
                    }
                }
            }
            JournalEntry::RoundFlushed {
                round,
                previous_added,
                was_flushed,
            } => {
                if previous_added.is_empty() {
                    self.added_deltas.remove(&round);
                } else {
                    self.added_deltas.insert(round, previous_added);
                }
                if !was_flushed {
                    self.flushed_rounds.remove(&round);
                }
            }
            JournalEntry::TransactionAdded => {
                self.transactions.pop();
            }
            JournalEntry::TransactionRemoved { index, id } => {
                let index = index.min(self.transactions.len());
                self.transactions.insert(index, id);
            }
            JournalEntry::Dapp {
                id,
                previous,
                was_dirty,
            } => {
                match previous {
                    Some(value) => self.dapps.insert(id, value),
                    None => self.dapps.remove(&id),
                };
                if !was_dirty {
                    self.dirty_dapps.remove(&id);
                }
            }
            JournalEntry::OutTransfer {
                id,
                previous,
                was_dirty,
            } => {
                match previous {
                    Some(value) => self.out_transfers.insert(id, value),
                    None => self.out_transfers.remove(&id),
                };
                if !was_dirty {
                    self.dirty_out_transfers.remove(&id);
                }
            }
            JournalEntry::Inert {
                id,
                previous,
                was_dirty,
            } => {
                match previous {
                    Some(value) => self.inert.insert(id, value),
                    None => self.inert.remove(&id),
                };
                if !was_dirty {
                    self.dirty_inert.remove(&id);
                }
            }
        }
    }

    // ── Commit ──────────────────────────────────────────────────────────

    /// Everything this unit of work would write, in application order.
    pub fn into_batch(mut self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for address in std::mem::take(&mut self.dirty_accounts) {
            if let Some(account) = self.accounts.remove(&address) {
                batch.put_account(account);
            }
        }

        let rounds: BTreeSet<u64> = self
            .added_deltas
            .keys()
            .chain(self.flushed_rounds.iter())
            .copied()
            .collect();
        for round in rounds {
            let deltas = self.added_deltas.remove(&round).unwrap_or_default();
            if self.flushed_rounds.contains(&round) {
                batch.push(BatchOp::ReplaceVoteDeltas { round, deltas });
            } else if !deltas.is_empty() {
                batch.push(BatchOp::AppendVoteDeltas(deltas));
            }
        }

        for id in std::mem::take(&mut self.dirty_dapps) {
            match self.dapps.remove(&id).flatten() {
                Some(record) => batch.push(BatchOp::PutDapp(record)),
                None => batch.push(BatchOp::DeleteDapp(id)),
            }
        }
        for id in std::mem::take(&mut self.dirty_out_transfers) {
            if self.out_transfers.get(&id).copied().unwrap_or(false) {
                batch.push(BatchOp::PutOutTransfer(id));
            } else {
                batch.push(BatchOp::DeleteOutTransfer(id));
            }
        }
        for id in std::mem::take(&mut self.dirty_inert) {
            if self.inert.get(&id).copied().unwrap_or(false) {
                batch.push(BatchOp::PutInertTransaction(id));
            } else {
                batch.push(BatchOp::DeleteInertTransaction(id));
            }
        }

        for op in self.staged {
            batch.push(op);
        }
        batch
    }

    /// Write every change atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        if self.mode == StateMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }
        let storage = self.storage;
        let batch = self.into_batch();
        debug!(operations = batch.len(), "committing state store");
        storage.write_batch(batch)
    }
}
