//! Slot and round arithmetic.

use crate::time::Timestamp;

/// The round containing `height`: `ceil(height / active_delegates)`.
pub fn calc_round(height: u64, active_delegates: u64) -> u64 {
    height.div_ceil(active_delegates)
}

pub fn first_height_of_round(round: u64, active_delegates: u64) -> u64 {
    round.saturating_sub(1) * active_delegates + 1
}

pub fn last_height_of_round(round: u64, active_delegates: u64) -> u64 {
    round * active_delegates
}

/// Forging slot containing `timestamp`.
pub fn slot_number(timestamp: Timestamp, block_time: u32) -> u64 {
    u64::from(timestamp.as_secs()) / u64::from(block_time)
}

/// Start time of `slot`.
pub fn slot_time(slot: u64, block_time: u32) -> Timestamp {
    let secs = slot.saturating_mul(u64::from(block_time));
    Timestamp::new(u32::try_from(secs).unwrap_or(u32::MAX))
}

/// Whether applying the block at `height` closes a round.
///
/// Heights 1 and `active_delegates` both close round 1: the genesis block is
/// accounted on its own before the first real round begins.
pub fn is_round_finish(height: u64, active_delegates: u64) -> bool {
    height == 1
        || height == active_delegates
        || calc_round(height, active_delegates) != calc_round(height + 1, active_delegates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_boundaries() {
        assert_eq!(calc_round(1, 101), 1);
        assert_eq!(calc_round(101, 101), 1);
        assert_eq!(calc_round(102, 101), 2);
        assert_eq!(calc_round(202, 101), 2);
        assert_eq!(calc_round(203, 101), 3);
        assert_eq!(first_height_of_round(2, 101), 102);
        assert_eq!(last_height_of_round(2, 101), 202);
        assert_eq!(first_height_of_round(1, 101), 1);
    }

    #[test]
    fn round_finish_heights() {
        assert!(is_round_finish(1, 101));
        assert!(!is_round_finish(2, 101));
        assert!(!is_round_finish(100, 101));
        assert!(is_round_finish(101, 101));
        assert!(!is_round_finish(102, 101));
        assert!(is_round_finish(202, 101));
    }

    #[test]
    fn slots_are_quantized() {
        assert_eq!(slot_number(Timestamp::new(0), 10), 0);
        assert_eq!(slot_number(Timestamp::new(19), 10), 1);
        assert_eq!(slot_number(Timestamp::new(20), 10), 2);
        assert_eq!(slot_time(7, 10), Timestamp::new(70));
    }
}
