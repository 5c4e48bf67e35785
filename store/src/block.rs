//! Block storage trait.
//!
//! Blocks are stored as opaque bytes next to a typed [`BlockRecord`] index
//! entry, which carries everything round accounting and chain-tip tracking
//! need without decoding the full block.

use crate::StoreError;
use kestrel_types::{BlockId, PublicKey, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: BlockId,
    pub height: u64,
    pub previous_block_id: Option<BlockId>,
    pub timestamp: Timestamp,
    pub generator_public_key: PublicKey,
    pub number_of_transactions: u32,
    pub total_amount: u64,
    pub total_fee: u64,
    pub reward: u64,
}

/// A persisted block: index entry plus encoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlock {
    pub record: BlockRecord,
    pub bytes: Vec<u8>,
}

/// Trait for block storage operations.
pub trait BlockStore {
    /// Store a block and index its transactions in one atomic step.
    fn append_block(
        &self,
        record: &BlockRecord,
        block_bytes: &[u8],
        transaction_ids: &[TransactionId],
    ) -> Result<(), StoreError>;

    /// Remove a block and its transaction index entries.
    fn delete_block(&self, id: &BlockId) -> Result<(), StoreError>;

    fn get_block(&self, id: &BlockId) -> Result<Option<StoredBlock>, StoreError>;

    fn get_block_record(&self, id: &BlockId) -> Result<Option<BlockRecord>, StoreError>;

    fn block_at_height(&self, height: u64) -> Result<Option<BlockRecord>, StoreError>;

    /// Up to `limit` blocks starting at height `offset`, ascending.
    fn get_blocks_range(&self, offset: u64, limit: usize) -> Result<Vec<StoredBlock>, StoreError>;

    /// Index entries for heights `from..=to`, ascending.
    fn records_in_height_range(&self, from: u64, to: u64) -> Result<Vec<BlockRecord>, StoreError>;

    fn last_block(&self) -> Result<Option<BlockRecord>, StoreError>;

    fn block_count(&self) -> Result<u64, StoreError>;
}
