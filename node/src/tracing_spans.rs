//! Pre-built [`tracing::Span`] constructors for common node operations.
//!
//! Consistent span names and field sets make traces easy to filter and
//! correlate across components.

use kestrel_types::{BlockId, TransactionId};
use tracing::{info_span, Span};

/// The full pipeline for one candidate block.
pub fn block_process_span(id: BlockId, height: u64) -> Span {
    info_span!("block_process", block_id = %id, height)
}

/// Removal of the tip block.
pub fn block_delete_span(id: BlockId, height: u64) -> Span {
    info_span!("block_delete", block_id = %id, height)
}

/// Round accounting for the block at `height`.
pub fn round_tick_span(round: u64, height: u64, backward: bool) -> Span {
    info_span!("round_tick", round, height, backward)
}

/// Admission of one transaction into the pool.
pub fn pool_admit_span(id: TransactionId) -> Span {
    info_span!("pool_admit", transaction_id = %id)
}

/// One pass of chain synchronisation with the network.
pub fn chain_sync_span(height: u64) -> Span {
    info_span!("chain_sync", height)
}

/// A forging attempt for `slot`.
pub fn forge_span(slot: u64) -> Span {
    info_span!("forge", slot)
}
