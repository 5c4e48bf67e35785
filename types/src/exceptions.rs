//! Per-network historical exceptions.
//!
//! Blocks and transactions accepted by earlier software versions must keep
//! validating after the rules tightened. These lists are fixed data: they are
//! never inferred or extended at runtime.

use crate::id::{BlockId, TransactionId};
use crate::network::NetworkId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reward and fee adjustment applied when a particular round lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundException {
    pub rewards_factor: u64,
    pub fees_factor: u64,
    pub fees_bonus: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkExceptions {
    /// Transactions whose failing validation/apply responses are forced to OK.
    pub transactions: BTreeSet<TransactionId>,
    /// Rounds whose delegate list is never cached.
    pub ignore_delegate_list_cache_for_rounds: BTreeSet<u64>,
    /// Rounds that land with adjusted rewards and fees.
    pub rounds: BTreeMap<u64, RoundException>,
    /// Blocks whose reward field is accepted regardless of the schedule.
    pub block_rewards: BTreeSet<BlockId>,
}

const LIVE_TRANSACTIONS: &[u64] = &[
    5252526207733553499,
    5676385569187187158,
    5384302058030309746,
    9352922026980330230,
    14122550998639658526,
    5524930565698900323,
    11613486949732674475,
    14164736566386539093,
];

const LIVE_ROUNDS: &[(u64, RoundException)] = &[(
    27040,
    RoundException {
        rewards_factor: 2,
        fees_factor: 2,
        fees_bonus: 10_000_000,
    },
)];

const TEST_TRANSACTIONS: &[u64] = &[
    16394286522174687330,
    12298100805070303137,
    2351316418063454736,
];

const TEST_IGNORED_CACHE_ROUNDS: &[u64] = &[
    19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40,
];

const TEST_BLOCK_REWARDS: &[u64] = &[15019653617563325745];

impl NetworkExceptions {
    pub fn for_network(network: NetworkId) -> Self {
        match network {
            NetworkId::Live => Self {
                transactions: LIVE_TRANSACTIONS.iter().copied().map(TransactionId).collect(),
                rounds: LIVE_ROUNDS.iter().copied().collect(),
                ..Self::default()
            },
            NetworkId::Test => Self {
                transactions: TEST_TRANSACTIONS.iter().copied().map(TransactionId).collect(),
                ignore_delegate_list_cache_for_rounds: TEST_IGNORED_CACHE_ROUNDS
                    .iter()
                    .copied()
                    .collect(),
                block_rewards: TEST_BLOCK_REWARDS.iter().copied().map(BlockId).collect(),
                ..Self::default()
            },
            NetworkId::Dev => Self::default(),
        }
    }

    pub fn is_transaction_exempt(&self, id: &TransactionId) -> bool {
        self.transactions.contains(id)
    }

    pub fn is_delegate_list_cacheable(&self, round: u64) -> bool {
        !self.ignore_delegate_list_cache_for_rounds.contains(&round)
    }

    pub fn round(&self, round: u64) -> Option<&RoundException> {
        self.rounds.get(&round)
    }

    pub fn is_block_reward_exempt(&self, id: &BlockId) -> bool {
        self.block_rewards.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_round_exception() {
        let ex = NetworkExceptions::for_network(NetworkId::Live);
        let round = ex.round(27040).unwrap();
        assert_eq!(round.rewards_factor, 2);
        assert_eq!(round.fees_factor, 2);
        assert_eq!(round.fees_bonus, 10_000_000);
        assert!(ex.round(27041).is_none());
    }

    #[test]
    fn dev_network_has_no_exceptions() {
        let ex = NetworkExceptions::for_network(NetworkId::Dev);
        assert!(ex.transactions.is_empty());
        assert!(ex.is_delegate_list_cacheable(20));
    }

    #[test]
    fn test_network_skips_cache_for_listed_rounds() {
        let ex = NetworkExceptions::for_network(NetworkId::Test);
        assert!(!ex.is_delegate_list_cacheable(20));
        assert!(ex.is_delegate_list_cacheable(41));
    }
}
