//! Chain parameters.
//!
//! Unlike node configuration, these values are fixed per network: every peer
//! must agree on them or forging order and block validity diverge.

use crate::network::NetworkId;
use crate::slots;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Raw units per whole token.
pub const UNIT: u64 = 100_000_000;

/// Fixed fee per transaction kind, in raw units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub transfer: u64,
    pub second_signature: u64,
    pub delegate: u64,
    pub vote: u64,
    /// Charged once per keysgroup member plus once for the sender.
    pub multisignature: u64,
    pub dapp: u64,
    pub in_transfer: u64,
    pub out_transfer: u64,
}

impl FeeSchedule {
    /// Fee for registering a multisignature group of `keys` members.
    pub fn multisignature_fee(&self, keys: usize) -> u64 {
        self.multisignature.saturating_mul(keys as u64 + 1)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            transfer: UNIT / 10,
            second_signature: 5 * UNIT,
            delegate: 25 * UNIT,
            vote: UNIT,
            multisignature: 5 * UNIT,
            dapp: 25 * UNIT,
            in_transfer: UNIT / 10,
            out_transfer: UNIT / 10,
        }
    }
}

/// Block reward milestones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    /// Reward per block for each milestone, in raw units.
    pub milestones: Vec<u64>,
    /// First height that earns a reward.
    pub offset: u64,
    /// Heights between milestones.
    pub distance: u64,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            milestones: vec![5 * UNIT, 4 * UNIT, 3 * UNIT, 2 * UNIT, UNIT],
            offset: 2160,
            distance: 3_000_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network: NetworkId,

    // ── Forging ─────────────────────────────────────────────────────────
    /// Delegates per round, and the length of a round in blocks.
    pub active_delegates: u64,
    /// Seconds per forging slot.
    pub block_time: u32,
    /// How many slots back a network block may be before it is ignored.
    pub block_slot_window: u64,

    // ── Blocks ──────────────────────────────────────────────────────────
    pub block_version: u32,
    pub max_transactions_per_block: u32,
    pub max_payload_length: u32,

    // ── Transactions ────────────────────────────────────────────────────
    pub max_votes_per_transaction: usize,
    pub max_votes_per_account: usize,
    pub max_shared_transaction_data: usize,
    pub multisig_min_keys: usize,
    pub multisig_max_keys: usize,
    pub multisig_min_lifetime_hours: u8,
    pub multisig_max_lifetime_hours: u8,
    /// Seconds an ordinary unconfirmed transaction may wait in the pool.
    pub unconfirmed_transaction_timeout: u32,

    // ── Economics ───────────────────────────────────────────────────────
    pub total_supply: u64,
    pub fees: FeeSchedule,
    pub rewards: RewardSchedule,
}

impl ChainParams {
    pub fn for_network(network: NetworkId) -> Self {
        Self {
            network,
            active_delegates: 101,
            block_time: 10,
            block_slot_window: 5,
            block_version: 0,
            max_transactions_per_block: 25,
            max_payload_length: 1024 * 1024,
            max_votes_per_transaction: 33,
            max_votes_per_account: 101,
            max_shared_transaction_data: 64,
            multisig_min_keys: 1,
            multisig_max_keys: 15,
            multisig_min_lifetime_hours: 1,
            multisig_max_lifetime_hours: 72,
            unconfirmed_transaction_timeout: 10_800,
            total_supply: 100_000_000 * UNIT,
            fees: FeeSchedule::default(),
            rewards: RewardSchedule::default(),
        }
    }

    /// Unix time of this network's epoch.
    pub fn epoch_unix_secs(&self) -> u64 {
        self.network.epoch_unix_secs()
    }

    pub fn calc_round(&self, height: u64) -> u64 {
        slots::calc_round(height, self.active_delegates)
    }

    pub fn slot_number(&self, timestamp: Timestamp) -> u64 {
        slots::slot_number(timestamp, self.block_time)
    }

    pub fn slot_time(&self, slot: u64) -> Timestamp {
        slots::slot_time(slot, self.block_time)
    }

    pub fn is_round_finish(&self, height: u64) -> bool {
        slots::is_round_finish(height, self.active_delegates)
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::for_network(NetworkId::Dev)
    }
}
