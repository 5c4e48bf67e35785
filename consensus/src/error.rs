use kestrel_store::StoreError;
use kestrel_types::PublicKey;
use thiserror::Error;

/// A block was produced outside the rules of its forging slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("slot {slot} belongs to delegate {expected}, block was forged by {actual}")]
    WrongDelegate {
        slot: u64,
        expected: PublicKey,
        actual: PublicKey,
    },

    #[error("no delegate for slot {slot} in a list of {delegates}")]
    NoDelegateForSlot { slot: u64, delegates: usize },

    #[error("block slot {slot} is in the future (current slot {current})")]
    InFuture { slot: u64, current: u64 },

    #[error("block slot {slot} is more than {window} slots behind current slot {current}")]
    TooOld { slot: u64, current: u64, window: u64 },
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("round {round} needs {required} delegates, only {available} registered")]
    InsufficientDelegates {
        round: u64,
        available: usize,
        required: usize,
    },

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("delegate list cache lock poisoned")]
    LockPoisoned,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RoundError {
    #[error("a round tick is already in progress")]
    AlreadyTicking,

    #[error("delegate {0} has no account")]
    MissingDelegate(PublicKey),

    #[error("round {round} summary is empty at height {height}")]
    EmptyRound { round: u64, height: u64 },

    #[error("delegate list unavailable: {0}")]
    Delegates(#[from] ConsensusError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
