//! Storage contracts for kestrel.
//!
//! Every storage backend (relational, key-value, in-memory for testing)
//! implements these traits. The rest of the codebase depends only on the
//! traits, and mutates state exclusively through [`StateStore`].

pub mod account;
pub mod batch;
pub mod block;
pub mod dapp;
pub mod error;
pub mod fork;
pub mod round;
pub mod state_store;
pub mod transaction;

pub use account::{Account, AccountStore};
pub use batch::{BatchOp, WriteBatch};
pub use block::{BlockRecord, BlockStore, StoredBlock};
pub use dapp::{DappRecord, DappStore};
pub use error::StoreError;
pub use fork::ForkStore;
pub use round::{RoundStore, RoundSummary, VoteDelta};
pub use state_store::{PrepareRequest, StateMode, StateStore};
pub use transaction::TransactionStore;

use kestrel_types::slots::{first_height_of_round, last_height_of_round};

/// A complete storage backend.
pub trait Storage:
    AccountStore + BlockStore + RoundStore + TransactionStore + DappStore + ForkStore + Send + Sync
{
    /// Apply every operation of `batch`, or none of them.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Fees, rewards and generators of the persisted blocks of `round`.
    fn sum_round(&self, round: u64, active_delegates: u64) -> Result<RoundSummary, StoreError> {
        let records = self.records_in_height_range(
            first_height_of_round(round, active_delegates),
            last_height_of_round(round, active_delegates),
        )?;
        Ok(summarize(records.iter()))
    }
}

pub(crate) fn summarize<'a>(records: impl Iterator<Item = &'a BlockRecord>) -> RoundSummary {
    let mut summary = RoundSummary::default();
    for record in records {
        summary.fees = summary.fees.saturating_add(record.total_fee);
        summary.rewards.push(record.reward);
        summary.delegates.push(record.generator_public_key);
    }
    summary
}
