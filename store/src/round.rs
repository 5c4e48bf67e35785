//! Round bookkeeping storage: pending vote deltas, land archives and
//! per-round delegate snapshots.

use crate::StoreError;
use kestrel_types::{Address, PublicKey};
use serde::{Deserialize, Serialize};

/// A change in the vote weight a voter contributes to a delegate.
///
/// Deltas accumulate per round and are folded into delegate vote weights
/// when the round lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDelta {
    pub round: u64,
    pub delegate: PublicKey,
    pub voter: Address,
    pub amount: i64,
}

/// Totals of the blocks that make up one round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub fees: u64,
    /// Reward of each block in height order.
    pub rewards: Vec<u64>,
    /// Generator of each block in height order.
    pub delegates: Vec<PublicKey>,
}

pub trait RoundStore {
    /// Vote deltas not yet folded into delegate weights.
    fn vote_deltas(&self, round: u64) -> Result<Vec<VoteDelta>, StoreError>;

    /// Deltas consumed when the round closed at `height`.
    fn round_archive(&self, height: u64) -> Result<Option<Vec<VoteDelta>>, StoreError>;

    /// The ordered delegate list a landed round was forged with.
    fn delegate_snapshot(&self, round: u64) -> Result<Option<Vec<PublicKey>>, StoreError>;
}
