use proptest::prelude::*;

use kestrel_types::slots::{
    calc_round, first_height_of_round, is_round_finish, last_height_of_round, slot_number,
    slot_time,
};
use kestrel_types::{Address, BlockId, PublicKey, Timestamp};

proptest! {
    /// Every height lies inside the bounds of the round it maps to.
    #[test]
    fn height_within_its_round(height in 1u64..10_000_000, active in 1u64..500) {
        let round = calc_round(height, active);
        prop_assert!(first_height_of_round(round, active) <= height);
        prop_assert!(height <= last_height_of_round(round, active));
    }

    /// The last height of every round closes it.
    #[test]
    fn last_height_finishes_round(round in 1u64..100_000, active in 2u64..500) {
        prop_assert!(is_round_finish(last_height_of_round(round, active), active));
        let first = first_height_of_round(round, active);
        if round > 1 && first != last_height_of_round(round, active) {
            prop_assert!(!is_round_finish(first, active));
        }
    }

    /// A slot's start time maps back to the same slot.
    #[test]
    fn slot_time_roundtrip(slot in 0u64..400_000_000, block_time in 1u32..60) {
        let ts = slot_time(slot, block_time);
        if u64::from(ts.as_secs()) == slot * u64::from(block_time) {
            prop_assert_eq!(slot_number(ts, block_time), slot);
        }
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u32..u32::MAX, b in 0u32..u32::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
    }

    /// Address text form roundtrips.
    #[test]
    fn address_text_roundtrip(value in any::<u64>()) {
        let addr = Address(value);
        prop_assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
    }

    /// Identifiers survive bincode storage encoding.
    #[test]
    fn block_id_bincode_roundtrip(value in any::<u64>()) {
        let id = BlockId(value);
        let encoded = bincode::serialize(&id).unwrap();
        let decoded: BlockId = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, id);
    }

    /// Public keys survive bincode storage encoding.
    #[test]
    fn public_key_bincode_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let key = PublicKey(bytes);
        let encoded = bincode::serialize(&key).unwrap();
        let decoded: PublicKey = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, key);
    }
}
