//! Startup loading and catch-up with the network.
//!
//! - [`ChainSync::bootstrap`]: genesis on an empty store, otherwise adopt the
//!   stored tip and re-verify its last rounds
//! - [`ChainSync::load_blocks`]: replay a batch of blocks
//! - [`ChainSync::sync_with_network`]: fetch missing blocks from peers

use crate::block_processor::{BlockProcessor, BlockSource};
use crate::broadhash::Broadhash;
use crate::config::{LoadingConfig, SyncConfig};
use crate::error::BlockError;
use crate::sequence::Sequence;
use crate::tracing_spans::chain_sync_span;
use crate::NodeError;
use kestrel_ledger::{load_block_at_height, load_blocks_range, Block};
use kestrel_types::slots::first_height_of_round;
use kestrel_types::BlockId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// A remote node as seen by the network layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: String,
    pub height: u64,
    pub broadhash: Broadhash,
}

/// The network collaborator the chain pulls blocks from.
///
/// Calls may block on network IO; they run on the blocking pool, never
/// inside the sequencer.
pub trait PeerNetwork: Send + Sync {
    fn peers(&self) -> Vec<PeerInfo>;

    /// Up to `limit` consecutive blocks following `last_id` on `peer`'s chain.
    fn fetch_blocks_after(
        &self,
        peer: &PeerInfo,
        last_id: BlockId,
        limit: usize,
    ) -> Result<Vec<Block>, NodeError>;
}

/// A network with no peers.
pub struct NoPeers;

impl PeerNetwork for NoPeers {
    fn peers(&self) -> Vec<PeerInfo> {
        Vec::new()
    }

    fn fetch_blocks_after(&self, peer: &PeerInfo, _: BlockId, _: usize) -> Result<Vec<Block>, NodeError> {
        Err(NodeError::Network(format!("unknown peer {}", peer.id)))
    }
}

pub struct ChainSync {
    processor: Arc<BlockProcessor>,
    network: Arc<dyn PeerNetwork>,
    sync: SyncConfig,
    loading: LoadingConfig,
}

impl ChainSync {
    pub fn new(
        processor: Arc<BlockProcessor>,
        network: Arc<dyn PeerNetwork>,
        sync: SyncConfig,
        loading: LoadingConfig,
    ) -> Self {
        Self {
            processor,
            network,
            sync,
            loading,
        }
    }

    pub fn network(&self) -> &Arc<dyn PeerNetwork> {
        &self.network
    }

    /// Bring the processor up on the stored chain, writing `genesis` first
    /// when storage is empty. Returns the tip.
    pub fn bootstrap(&self, genesis: &Block) -> Result<Block, NodeError> {
        let ctx = self.processor.context();
        match self.processor.load_tip()? {
            None => {
                info!(block_id = %genesis.id, "empty chain, applying genesis block");
                let applied = self.processor.process_block(genesis.clone(), BlockSource::Rebuild)?;
                Ok(applied.block)
            }
            Some(tip) => {
                let stored = load_block_at_height(ctx.storage.as_ref(), 1)?
                    .ok_or(BlockError::MissingBlock(genesis.id))?;
                if stored.id != genesis.id {
                    return Err(NodeError::Config(format!(
                        "stored genesis block {} does not match the configured genesis {}",
                        stored.id, genesis.id
                    )));
                }
                info!(height = tip.height, block_id = %tip.id, "loaded stored chain");
                if self.loading.validate_own_chain {
                    self.validate_own_chain()?;
                }
                self.processor.tip()?.ok_or_else(|| BlockError::NotBootstrapped.into())
            }
        }
    }

    /// Re-verify the stored blocks of the last rounds and delete back to the
    /// last good block. Returns how many blocks were deleted.
    pub fn validate_own_chain(&self) -> Result<u64, NodeError> {
        let ctx = self.processor.context();
        let params = &ctx.params;
        let Some(tip) = self.processor.tip()? else {
            return Ok(0);
        };
        let round = params.calc_round(tip.height);
        let from = first_height_of_round(round.saturating_sub(2).max(1), params.active_delegates);
        info!(from, to = tip.height, "validating own chain");

        let batch = self.loading.rebuild_batch_size.max(1);
        let mut previous: Option<Block> = None;
        let mut invalid_at = None;
        let mut height = from;
        'scan: while height <= tip.height {
            let blocks = load_blocks_range(ctx.storage.as_ref(), height, batch)?;
            if blocks.is_empty() {
                invalid_at = Some(height);
                break;
            }
            for block in blocks {
                if let Err(err) = self.check_stored_block(&block, previous.as_ref()) {
                    warn!(height = block.height, block_id = %block.id, error = %err, "stored block is invalid");
                    invalid_at = Some(block.height);
                    break 'scan;
                }
                height = block.height + 1;
                previous = Some(block);
            }
        }

        let Some(invalid) = invalid_at else {
            debug!("own chain is valid");
            return Ok(0);
        };
        let depth = tip.height - invalid + 1;
        let limit = 2 * params.active_delegates;
        if depth > limit || invalid <= 1 {
            return Err(NodeError::RollbackTooDeep {
                height: invalid,
                depth,
                limit,
            });
        }
        for _ in 0..depth {
            self.processor.delete_last_block()?;
        }
        warn!(deleted = depth, height = invalid - 1, "rolled back to the last valid block");
        Ok(depth)
    }

    fn check_stored_block(&self, block: &Block, previous: Option<&Block>) -> Result<(), BlockError> {
        self.processor.verify_block(block)?;
        if let Some(previous) = previous {
            if block.previous_block_id != Some(previous.id) || block.height != previous.height + 1 {
                return Err(BlockError::PreviousMismatch {
                    height: block.height,
                    previous: block.previous_block_id,
                    tip: Some(previous.id),
                });
            }
        }
        if block.height == 1 {
            return Ok(());
        }
        let ctx = self.processor.context();
        let list = ctx
            .delegates
            .round_delegates(ctx.params.calc_round(block.height))?;
        ctx.delegates.validate_block_slot_against(block, &list)?;
        Ok(())
    }

    /// Replay `blocks` in order on top of the tip. Stops at the first
    /// failure and returns how many were applied before it.
    pub fn load_blocks(&self, blocks: Vec<Block>) -> Result<usize, NodeError> {
        let mut applied = 0;
        for block in blocks {
            self.processor.process_block(block, BlockSource::Rebuild)?;
            applied += 1;
        }
        Ok(applied)
    }

    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u64 << failures.saturating_sub(1).min(16);
        Duration::from_millis(self.sync.base_backoff_ms.saturating_mul(factor))
    }

    /// Catch up with the highest peers. Fetched blocks are processed through
    /// `sequence`. Each failed fetch or rejected batch costs one attempt and
    /// moves on to the next peer after a backoff. Returns the number of
    /// blocks applied.
    pub async fn sync_with_network(&self, sequence: &Sequence) -> Result<usize, NodeError> {
        let start = self.processor.height()?;
        let span = chain_sync_span(start);
        self.sync_loop(sequence).instrument(span).await
    }

    async fn sync_loop(&self, sequence: &Sequence) -> Result<usize, NodeError> {
        let mut applied = 0usize;
        let mut failures = 0u32;
        let mut last_error = String::new();

        loop {
            let tip = self.processor.tip()?.ok_or(BlockError::NotBootstrapped)?;
            let mut ahead: Vec<PeerInfo> = self
                .network
                .peers()
                .into_iter()
                .filter(|peer| peer.height > tip.height)
                .collect();
            if ahead.is_empty() {
                if applied > 0 {
                    info!(applied, height = tip.height, "chain synced");
                }
                return Ok(applied);
            }
            if failures >= self.sync.max_attempts {
                return Err(NodeError::SyncFailed {
                    attempts: failures,
                    reason: last_error,
                });
            }
            ahead.sort_by(|a, b| b.height.cmp(&a.height).then_with(|| a.id.cmp(&b.id)));
            let peer = ahead[failures as usize % ahead.len()].clone();

            match self.sync_from(sequence, &peer, tip.id).await {
                Ok(0) => {
                    failures += 1;
                    last_error = format!("peer {} returned no blocks", peer.id);
                }
                Ok(count) => {
                    applied += count;
                    continue;
                }
                Err(NodeError::ShuttingDown) => return Err(NodeError::ShuttingDown),
                Err(err) => {
                    failures += 1;
                    last_error = err.to_string();
                    warn!(peer = %peer.id, attempt = failures, error = %err, "sync attempt failed");
                }
            }
            tokio::time::sleep(self.backoff(failures)).await;
        }
    }

    /// Fetch one batch from `peer` and apply it. A rejected block ends the
    /// batch with an error unless some blocks before it were applied.
    async fn sync_from(&self, sequence: &Sequence, peer: &PeerInfo, last_id: BlockId) -> Result<usize, NodeError> {
        let network = Arc::clone(&self.network);
        let limit = self.sync.batch_size;
        let fetch_peer = peer.clone();
        let blocks = tokio::task::spawn_blocking(move || {
            network.fetch_blocks_after(&fetch_peer, last_id, limit)
        })
        .await
        .map_err(|err| NodeError::Network(err.to_string()))??;
        debug!(peer = %peer.id, count = blocks.len(), "fetched blocks");

        let mut applied = 0;
        for block in blocks {
            let processor = Arc::clone(&self.processor);
            let result = sequence
                .run(move || processor.process_block(block, BlockSource::Sync))
                .await?;
            match result {
                Ok(_) => applied += 1,
                Err(BlockError::AlreadyExists(_)) => {}
                Err(err) if applied > 0 => {
                    warn!(peer = %peer.id, error = %err, "peer sent an invalid block, stopping batch");
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(applied)
    }
}
