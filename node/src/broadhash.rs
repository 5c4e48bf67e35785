//! Broadhash: a digest of the most recent block ids.
//!
//! Peers on the same chain report the same broadhash, so the share of peers
//! agreeing with ours measures how far the network is in consensus with us.

use kestrel_crypto::sha256;
use kestrel_store::{BlockStore, StoreError};
use std::sync::RwLock;

/// Blocks covered by the broadhash.
pub const BROADHASH_DEPTH: u64 = 5;

pub type Broadhash = [u8; 32];

/// Digest of `ids`, newest first.
pub fn compute_broadhash(ids: &[kestrel_types::BlockId]) -> Broadhash {
    let mut bytes = Vec::with_capacity(ids.len() * 8);
    for id in ids {
        bytes.extend_from_slice(&id.to_be_bytes());
    }
    sha256(&bytes)
}

/// Percentage of `peers` reporting `ours`, rounded to two decimals.
/// Zero when there are no peers.
pub fn consensus_percentage(ours: &Broadhash, peers: &[Broadhash]) -> f64 {
    if peers.is_empty() {
        return 0.0;
    }
    let matching = peers.iter().filter(|hash| *hash == ours).count();
    let percentage = matching as f64 / peers.len() as f64 * 100.0;
    (percentage * 100.0).round() / 100.0
}

/// The node's current broadhash, refreshed whenever the tip changes.
#[derive(Default)]
pub struct BroadhashTracker {
    current: RwLock<Broadhash>,
}

impl BroadhashTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Broadhash {
        self.current.read().map(|hash| *hash).unwrap_or_default()
    }

    /// Recompute from the last blocks below and including `tip_height`.
    pub fn refresh<S: BlockStore + ?Sized>(&self, blocks: &S, tip_height: u64) -> Result<Broadhash, StoreError> {
        let from = tip_height.saturating_sub(BROADHASH_DEPTH - 1).max(1);
        let mut records = blocks.records_in_height_range(from, tip_height)?;
        records.sort_by(|a, b| b.height.cmp(&a.height));
        let ids: Vec<_> = records.iter().map(|record| record.id).collect();
        let hash = compute_broadhash(&ids);
        if let Ok(mut current) = self.current.write() {
            *current = hash;
        }
        Ok(hash)
    }

    pub fn consensus(&self, peers: &[Broadhash]) -> f64 {
        consensus_percentage(&self.current(), peers)
    }
}
