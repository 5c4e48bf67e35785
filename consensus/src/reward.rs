//! Block reward schedule.
//!
//! Rewards start at `offset` and step down through the milestones every
//! `distance` heights, staying at the last milestone forever after.

use kestrel_types::RewardSchedule;

pub struct BlockReward {
    schedule: RewardSchedule,
}

impl BlockReward {
    pub fn new(schedule: RewardSchedule) -> Self {
        Self { schedule }
    }

    /// Index of the milestone in force at `height`.
    pub fn calc_milestone(&self, height: u64) -> usize {
        let last = self.schedule.milestones.len().saturating_sub(1);
        if height < self.schedule.offset || self.schedule.distance == 0 {
            return 0;
        }
        let location = (height - self.schedule.offset) / self.schedule.distance;
        usize::try_from(location).map_or(last, |location| location.min(last))
    }

    pub fn calc_reward(&self, height: u64) -> u64 {
        if height < self.schedule.offset {
            return 0;
        }
        self.schedule
            .milestones
            .get(self.calc_milestone(height))
            .copied()
            .unwrap_or(0)
    }

    /// Supply after the block at `height`, starting from `initial_supply`.
    pub fn calc_supply(&self, height: u64, initial_supply: u64) -> u64 {
        if height < self.schedule.offset {
            return initial_supply;
        }
        let milestone = self.calc_milestone(height);
        let last = self.schedule.milestones.len().saturating_sub(1);
        let mut remaining = height - self.schedule.offset + 1;
        let mut supply = initial_supply;
        for (index, reward) in self.schedule.milestones.iter().enumerate().take(milestone + 1) {
            let blocks = if remaining < self.schedule.distance {
                remaining
            } else {
                remaining -= self.schedule.distance;
                if index == last {
                    self.schedule.distance + remaining
                } else {
                    self.schedule.distance
                }
            };
            supply = supply.saturating_add(blocks.saturating_mul(*reward));
            if blocks < self.schedule.distance {
                break;
            }
        }
        supply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::UNIT;

    fn reward() -> BlockReward {
        BlockReward::new(RewardSchedule::default())
    }

    #[test]
    fn no_reward_before_offset() {
        let r = reward();
        assert_eq!(r.calc_reward(1), 0);
        assert_eq!(r.calc_reward(2159), 0);
        assert_eq!(r.calc_reward(2160), 5 * UNIT);
    }

    #[test]
    fn milestones_step_down() {
        let r = reward();
        assert_eq!(r.calc_milestone(2160 + 2_999_999), 0);
        assert_eq!(r.calc_milestone(2160 + 3_000_000), 1);
        assert_eq!(r.calc_reward(2160 + 3_000_000), 4 * UNIT);
        assert_eq!(r.calc_reward(2160 + 12_000_000), UNIT);
        assert_eq!(r.calc_milestone(u64::MAX / 2), 4);
        assert_eq!(r.calc_reward(u64::MAX / 2), UNIT);
    }

    #[test]
    fn supply_grows_by_each_reward() {
        let r = reward();
        let initial = 100_000_000 * UNIT;
        assert_eq!(r.calc_supply(2159, initial), initial);
        assert_eq!(r.calc_supply(2160, initial), initial + 5 * UNIT);
        assert_eq!(r.calc_supply(2161, initial), initial + 10 * UNIT);

        let first_milestone_end = 2160 + 3_000_000 - 1;
        let after_first = initial + 3_000_000 * 5 * UNIT;
        assert_eq!(r.calc_supply(first_milestone_end, initial), after_first);
        assert_eq!(
            r.calc_supply(first_milestone_end + 1, initial),
            after_first + 4 * UNIT
        );
    }

    #[test]
    fn supply_beyond_last_milestone_keeps_growing() {
        let r = reward();
        let initial = 0;
        let all_milestones = 2160 + 5 * 3_000_000 - 1;
        let at_end = r.calc_supply(all_milestones, initial);
        assert_eq!(at_end, 3_000_000 * (5 + 4 + 3 + 2 + 1) * UNIT);
        assert_eq!(r.calc_supply(all_milestones + 10, initial), at_end + 10 * UNIT);
    }
}
