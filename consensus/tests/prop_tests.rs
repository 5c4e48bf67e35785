use proptest::prelude::*;

use kestrel_consensus::{shuffle_delegates, BlockReward, RoundChanges};
use kestrel_store::RoundSummary;
use kestrel_types::{PublicKey, RewardSchedule};

fn keys(count: usize) -> Vec<PublicKey> {
    (0..count)
        .map(|i| {
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&(i as u64).to_be_bytes());
            PublicKey(bytes)
        })
        .collect()
}

proptest! {
    /// The shuffle is a permutation of its input.
    #[test]
    fn shuffle_is_a_permutation(round in 1u64..1_000_000, count in 1usize..202) {
        let input = keys(count);
        let mut shuffled = shuffle_delegates(round, input.clone());
        prop_assert_eq!(shuffled.len(), count);
        shuffled.sort();
        prop_assert_eq!(shuffled, input);
    }

    /// Same round and candidates, same order.
    #[test]
    fn shuffle_is_deterministic(round in 1u64..1_000_000) {
        let input = keys(101);
        prop_assert_eq!(
            shuffle_delegates(round, input.clone()),
            shuffle_delegates(round, input)
        );
    }

    /// A full round hands out exactly the fees it collected.
    #[test]
    fn fees_are_conserved(fees in 0u64..10_000_000_000_000, active in 1u64..202) {
        let summary = RoundSummary {
            fees,
            rewards: vec![0; active as usize],
            delegates: keys(active as usize),
        };
        let changes = RoundChanges::new(&summary, None, active);
        let share = changes.at(0);
        prop_assert!(share.fees_remaining < active);
        prop_assert_eq!(share.fees * active + share.fees_remaining, fees);
    }

    /// Supply grows by exactly the reward of each new block.
    #[test]
    fn supply_advances_by_block_reward(height in 1u64..20_000_000) {
        let reward = BlockReward::new(RewardSchedule::default());
        let initial = 1_000_000;
        prop_assert_eq!(
            reward.calc_supply(height + 1, initial),
            reward.calc_supply(height, initial) + reward.calc_reward(height + 1)
        );
    }
}
