use kestrel_consensus::{ConsensusError, RoundError, SlotError};
use kestrel_crypto::CryptoError;
use kestrel_ledger::LedgerError;
use kestrel_pool::PoolError;
use kestrel_store::StoreError;
use kestrel_types::{BlockId, TransactionId};
use thiserror::Error;

/// How a block failure should be treated by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed structure: reject, never retry.
    Validation,
    /// Well formed but disagrees with the chain: reject, possibly a fork.
    Consensus,
    /// Transient backend failure: abort the unit of work, the caller may retry.
    Storage,
    /// Internal inconsistency: the operation fails, committed state is kept.
    Invariant,
}

#[derive(Debug, Error)]
pub enum BlockError {
    // ── Validation ──────────────────────────────────────────────────────
    #[error("unsupported block version {0}")]
    UnsupportedVersion(u32),

    #[error("block id mismatch: declared {declared}, computed {computed}")]
    InvalidId { declared: BlockId, computed: BlockId },

    #[error("block {0} has an invalid signature")]
    InvalidSignature(BlockId),

    #[error("payload length {length} exceeds {max}")]
    PayloadTooLarge { length: u32, max: u32 },

    #[error("block declares {declared} transactions but carries {actual}")]
    TransactionCountMismatch { declared: u32, actual: usize },

    #[error("block carries {count} transactions, at most {max} allowed")]
    TooManyTransactions { count: usize, max: u32 },

    #[error("transaction {0} appears twice in the block")]
    DuplicateTransaction(TransactionId),

    #[error("transaction {id} is invalid: {reason}")]
    InvalidTransaction { id: TransactionId, reason: String },

    // ── Consensus ───────────────────────────────────────────────────────
    #[error("block {0} already exists")]
    AlreadyExists(BlockId),

    #[error("block at height {height} does not extend the tip (previous {previous:?}, tip {tip:?})")]
    PreviousMismatch {
        height: u64,
        previous: Option<BlockId>,
        tip: Option<BlockId>,
    },

    #[error("block at height {height} is not the next block after tip height {tip_height}")]
    NotNextBlock { height: u64, tip_height: u64 },

    #[error("block {id} competes with tip {tip} at height {height}")]
    SameHeightFork { id: BlockId, tip: BlockId, height: u64 },

    #[error("transaction {0} is already confirmed")]
    TransactionConfirmed(TransactionId),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("block timestamp {timestamp} is not after the previous block ({previous})")]
    TimestampNotAfterPrevious { timestamp: u32, previous: u32 },

    #[error("invalid block reward: expected {expected}, got {actual}")]
    InvalidReward { expected: u64, actual: u64 },

    #[error("payload hash mismatch")]
    PayloadHashMismatch,

    #[error("payload length mismatch: declared {declared}, computed {computed}")]
    PayloadLengthMismatch { declared: u32, computed: u32 },

    #[error("total amount mismatch: declared {declared}, computed {computed}")]
    TotalAmountMismatch { declared: u64, computed: u64 },

    #[error("total fee mismatch: declared {declared}, computed {computed}")]
    TotalFeeMismatch { declared: u64, computed: u64 },

    // ── Invariant ───────────────────────────────────────────────────────
    #[error("chain is not bootstrapped")]
    NotBootstrapped,

    #[error("the genesis block cannot be deleted")]
    CannotDeleteGenesis,

    #[error("block {0} is missing from storage")]
    MissingBlock(BlockId),

    #[error("undoing transaction {id} failed: {reason}")]
    UndoFailed { id: TransactionId, reason: String },

    #[error("chain state lock poisoned")]
    LockPoisoned,

    // ── Propagated ──────────────────────────────────────────────────────
    #[error("round accounting failed: {0}")]
    Round(#[from] RoundError),

    #[error("delegate list unavailable: {0}")]
    Delegates(#[from] ConsensusError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl BlockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedVersion(_)
            | Self::InvalidId { .. }
            | Self::InvalidSignature(_)
            | Self::PayloadTooLarge { .. }
            | Self::TransactionCountMismatch { .. }
            | Self::TooManyTransactions { .. }
            | Self::DuplicateTransaction(_)
            | Self::InvalidTransaction { .. } => ErrorKind::Validation,

            Self::AlreadyExists(_)
            | Self::PreviousMismatch { .. }
            | Self::NotNextBlock { .. }
            | Self::SameHeightFork { .. }
            | Self::TransactionConfirmed(_)
            | Self::Slot(_)
            | Self::TimestampNotAfterPrevious { .. }
            | Self::InvalidReward { .. }
            | Self::PayloadHashMismatch
            | Self::PayloadLengthMismatch { .. }
            | Self::TotalAmountMismatch { .. }
            | Self::TotalFeeMismatch { .. } => ErrorKind::Consensus,

            Self::Storage(_) => ErrorKind::Storage,
            Self::Ledger(LedgerError::Storage(_)) => ErrorKind::Storage,
            Self::Ledger(LedgerError::Transaction { .. }) => ErrorKind::Validation,
            Self::Delegates(err) => consensus_kind(err),
            Self::Round(RoundError::Storage(_)) => ErrorKind::Storage,
            Self::Round(RoundError::Delegates(err)) => consensus_kind(err),

            Self::NotBootstrapped
            | Self::CannotDeleteGenesis
            | Self::MissingBlock(_)
            | Self::UndoFailed { .. }
            | Self::LockPoisoned
            | Self::Round(_)
            | Self::Ledger(_) => ErrorKind::Invariant,
        }
    }
}

fn consensus_kind(err: &ConsensusError) -> ErrorKind {
    match err {
        ConsensusError::Slot(_) => ErrorKind::Consensus,
        ConsensusError::Storage(_) => ErrorKind::Storage,
        ConsensusError::InsufficientDelegates { .. } | ConsensusError::LockPoisoned => {
            ErrorKind::Invariant
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("block rejected: {0}")]
    Block(#[from] BlockError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("forging error: {0}")]
    Forging(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("chain sync failed after {attempts} attempts: {reason}")]
    SyncFailed { attempts: u32, reason: String },

    #[error("own chain is invalid from height {height}; rolling back {depth} blocks exceeds the limit of {limit}")]
    RollbackTooDeep { height: u64, depth: u64, limit: u64 },

    #[error("node is shutting down")]
    ShuttingDown,

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::PublicKey;

    #[test]
    fn failures_map_to_their_taxonomy() {
        assert_eq!(BlockError::PayloadTooLarge { length: 2, max: 1 }.kind(), ErrorKind::Validation);
        assert_eq!(BlockError::PayloadHashMismatch.kind(), ErrorKind::Consensus);
        assert_eq!(
            BlockError::Slot(SlotError::WrongDelegate {
                slot: 1,
                expected: PublicKey([1; 32]),
                actual: PublicKey([2; 32]),
            })
            .kind(),
            ErrorKind::Consensus
        );
        assert_eq!(
            BlockError::Storage(StoreError::Backend("disk".into())).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            BlockError::Round(RoundError::Storage(StoreError::ReadOnly)).kind(),
            ErrorKind::Storage
        );
        assert_eq!(BlockError::Round(RoundError::AlreadyTicking).kind(), ErrorKind::Invariant);
        assert_eq!(BlockError::CannotDeleteGenesis.kind(), ErrorKind::Invariant);
    }
}
