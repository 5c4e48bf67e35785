//! Consensus: who forges when, and how each round is settled.
//!
//! - [`delegates`]: deterministic delegate ordering, the two-round list
//!   cache and forging-slot assignment.
//! - [`round`]: forward and backward round ticks: produced and missed
//!   blocks, vote weights, fee and reward distribution.
//! - [`reward`]: the block reward schedule and total supply.
//! - [`error`]: slot, round and consensus errors.

pub mod delegates;
pub mod error;
pub mod reward;
pub mod round;

pub use delegates::{
    shuffle_delegates, validate_slot_window, DelegateRegistry, DelegateSource, FixedSource,
    VoteWeightSource,
};
pub use error::{ConsensusError, RoundError, SlotError};
pub use reward::BlockReward;
pub use round::{DelegateShare, RoundAccountant, RoundAccumulator, RoundChanges, TickOutcome};
