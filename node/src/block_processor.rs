//! Block processing pipeline.
//!
//! A candidate block moves through signature, chain link, slot, payload and
//! transaction checks, is applied against a mutating [`StateStore`], ticks
//! the round forward and is committed in one batch. A failure at any step
//! drops the uncommitted state, so committed state never holds half a block.
//!
//! [`BlockProcessor::delete_last_block`] is the exact reverse: backward tick,
//! undo of the transactions in reverse order, removal of the block.

use crate::context::ChainContext;
use crate::error::BlockError;
use crate::events::ChainEvent;
use crate::tracing_spans::{block_delete_span, block_process_span, round_tick_span};
use kestrel_consensus::{
    validate_slot_window, BlockReward, ConsensusError, RoundAccountant, RoundAccumulator,
    SlotError,
};
use kestrel_ledger::{
    load_block, load_last_block, sort_transactions, ApplyContext, Block, BlockTemplate, Payload,
    VerifyContext,
};
use kestrel_store::StateStore;
use kestrel_transactions::Transaction;
use kestrel_types::{ForkCause, ForkEvent, KeyPair, PublicKey, Timestamp};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a candidate block came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSource {
    /// Gossiped by a peer as a fresh block; subject to the slot window.
    Network,
    /// Fetched while catching up with the network.
    Sync,
    /// Forged by this node.
    Local,
    /// Replayed from storage or a snapshot.
    Rebuild,
}

impl BlockSource {
    fn broadcast(self) -> bool {
        matches!(self, Self::Network | Self::Local)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedBlock {
    pub block: Block,
    /// Set when the block closed a round.
    pub finished_round: Option<u64>,
    pub outsiders: Vec<PublicKey>,
}

#[derive(Default)]
struct ChainState {
    tip: Option<Block>,
    accumulator: RoundAccumulator,
}

pub struct BlockProcessor {
    ctx: ChainContext,
    rounds: RoundAccountant,
    reward: BlockReward,
    chain: Mutex<ChainState>,
}

impl BlockProcessor {
    pub fn new(ctx: ChainContext) -> Self {
        let rounds = RoundAccountant::new(
            ctx.params.clone(),
            ctx.exceptions.clone(),
            ctx.delegates.clone(),
        );
        let reward = BlockReward::new(ctx.params.rewards.clone());
        Self {
            ctx,
            rounds,
            reward,
            chain: Mutex::new(ChainState::default()),
        }
    }

    pub fn context(&self) -> &ChainContext {
        &self.ctx
    }

    fn chain(&self) -> Result<MutexGuard<'_, ChainState>, BlockError> {
        self.chain.lock().map_err(|_| BlockError::LockPoisoned)
    }

    pub fn tip(&self) -> Result<Option<Block>, BlockError> {
        Ok(self.chain()?.tip.clone())
    }

    pub fn height(&self) -> Result<u64, BlockError> {
        Ok(self.chain()?.tip.as_ref().map_or(0, |tip| tip.height))
    }

    /// Fees, rewards and producers of the current round so far.
    pub fn accumulator(&self) -> Result<RoundAccumulator, BlockError> {
        Ok(self.chain()?.accumulator.clone())
    }

    pub fn is_ticking(&self) -> bool {
        self.rounds.is_ticking()
    }

    /// Adopt the stored tip, rebuilding the round accumulator from storage.
    pub fn load_tip(&self) -> Result<Option<Block>, BlockError> {
        let tip = load_last_block(self.ctx.storage.as_ref())?;
        let accumulator = match &tip {
            None => RoundAccumulator::default(),
            Some(tip) if self.ctx.params.is_round_finish(tip.height) => {
                RoundAccumulator::new(self.ctx.params.calc_round(tip.height + 1))
            }
            Some(tip) => {
                let round = self.ctx.params.calc_round(tip.height);
                let summary = self
                    .ctx
                    .storage
                    .sum_round(round, self.ctx.params.active_delegates)?;
                RoundAccumulator::from_summary(round, summary)
            }
        };
        let mut chain = self.chain()?;
        chain.tip = tip.clone();
        chain.accumulator = accumulator;
        if let Some(tip) = &tip {
            self.ctx.metrics.chain_height.set(height_gauge(tip.height));
        }
        Ok(tip)
    }

    // ── Forward ─────────────────────────────────────────────────────────

    /// Verify `block`, apply it on top of the tip and commit it.
    pub fn process_block(&self, block: Block, source: BlockSource) -> Result<ProcessedBlock, BlockError> {
        let span = block_process_span(block.id, block.height);
        let _enter = span.enter();
        let started = Instant::now();
        self.ctx.metrics.blocks_processed.inc();

        let mut events = Vec::new();
        let result = self.process_locked(block, source, &mut events);

        self.ctx
            .metrics
            .block_process_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        match &result {
            Ok(processed) => {
                self.ctx.metrics.blocks_accepted.inc();
                self.ctx
                    .metrics
                    .chain_height
                    .set(height_gauge(processed.block.height));
                if processed.finished_round.is_some() {
                    self.ctx.metrics.rounds_finished.inc();
                }
                info!(
                    block_id = %processed.block.id,
                    height = processed.block.height,
                    transactions = processed.block.transactions.len(),
                    "block applied"
                );
            }
            Err(err) => {
                self.ctx.metrics.blocks_rejected.inc();
                warn!(error = %err, kind = ?err.kind(), "block rejected");
            }
        }
        for event in &events {
            self.ctx.events.emit(event);
        }
        result
    }

    fn process_locked(
        &self,
        block: Block,
        source: BlockSource,
        events: &mut Vec<ChainEvent>,
    ) -> Result<ProcessedBlock, BlockError> {
        let mut chain = self.chain()?;
        self.verify_block(&block)?;
        self.verify_link(&block, chain.tip.as_ref(), events)?;

        if source == BlockSource::Network {
            validate_slot_window(&self.ctx.params, block.timestamp, self.ctx.clock.now())?;
        }
        if block.height != 1 {
            match self.ctx.delegates.validate_block_slot(&block) {
                Ok(()) => {}
                Err(ConsensusError::Slot(err @ SlotError::WrongDelegate { .. })) => {
                    events.push(self.record_fork(&block, ForkCause::WrongSlotDelegate)?);
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }

        let ids = block.transaction_ids();
        if let Some(id) = self
            .ctx
            .storage
            .confirmed_transaction_ids(&ids)?
            .into_iter()
            .next()
        {
            events.push(self.record_fork(&block, ForkCause::TransactionAlreadyConfirmed)?);
            return Err(BlockError::TransactionConfirmed(id));
        }

        let genesis = block.height == 1;
        if !genesis {
            let responses = self.ctx.engine.validate_transactions(&block.transactions);
            if let Some(failed) = responses.iter().find(|r| !r.is_ok()) {
                return Err(BlockError::InvalidTransaction {
                    id: failed.id,
                    reason: failed.reason(),
                });
            }
        }

        let apply_ctx = if genesis {
            ApplyContext::genesis()
        } else {
            ApplyContext::block(block.height)
        };
        let (responses, mut state) =
            self.ctx
                .engine
                .apply_transactions(self.ctx.storage.as_ref(), &block.transactions, &apply_ctx)?;
        if let Some(failed) = responses.iter().find(|r| !r.is_ok()) {
            return Err(BlockError::InvalidTransaction {
                id: failed.id,
                reason: failed.reason(),
            });
        }

        state.stage_block_append(block.to_record(), block.encode()?);
        let (accumulator, outcome) = {
            let span = round_tick_span(self.ctx.params.calc_round(block.height), block.height, false);
            let _enter = span.enter();
            self.rounds.tick(&mut state, &block, &chain.accumulator)?
        };
        state.commit()?;

        for round in &outcome.invalidate_rounds {
            self.ctx.delegates.invalidate(*round)?;
        }
        chain.tip = Some(block.clone());
        chain.accumulator = accumulator;
        drop(chain);

        events.push(ChainEvent::NewBlock {
            block: block.clone(),
            broadcast: source.broadcast(),
        });
        if let Some(round) = outcome.finished_round {
            events.push(ChainEvent::FinishRound {
                round,
                height: block.height,
            });
        }
        Ok(ProcessedBlock {
            block,
            finished_round: outcome.finished_round,
            outsiders: outcome.outsiders,
        })
    }

    /// Checks that depend on nothing but the block itself.
    pub fn verify_block(&self, block: &Block) -> Result<(), BlockError> {
        let params = &self.ctx.params;
        if block.version != params.block_version {
            return Err(BlockError::UnsupportedVersion(block.version));
        }
        let computed = block.compute_id();
        if computed != block.id {
            return Err(BlockError::InvalidId {
                declared: block.id,
                computed,
            });
        }
        if !block.verify_signature() {
            return Err(BlockError::InvalidSignature(block.id));
        }

        if block.payload_length > params.max_payload_length {
            return Err(BlockError::PayloadTooLarge {
                length: block.payload_length,
                max: params.max_payload_length,
            });
        }
        if block.transactions.len() != block.number_of_transactions as usize {
            return Err(BlockError::TransactionCountMismatch {
                declared: block.number_of_transactions,
                actual: block.transactions.len(),
            });
        }
        // Genesis funds every initial delegate in one block.
        if block.height != 1 && block.transactions.len() > params.max_transactions_per_block as usize {
            return Err(BlockError::TooManyTransactions {
                count: block.transactions.len(),
                max: params.max_transactions_per_block,
            });
        }

        let mut seen = HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if !seen.insert(tx.id) {
                return Err(BlockError::DuplicateTransaction(tx.id));
            }
        }

        let payload = Payload::compute(&block.transactions);
        if payload.hash != block.payload_hash {
            return Err(BlockError::PayloadHashMismatch);
        }
        if payload.length != block.payload_length {
            return Err(BlockError::PayloadLengthMismatch {
                declared: block.payload_length,
                computed: payload.length,
            });
        }
        if payload.total_amount != block.total_amount {
            return Err(BlockError::TotalAmountMismatch {
                declared: block.total_amount,
                computed: payload.total_amount,
            });
        }
        if payload.total_fee != block.total_fee {
            return Err(BlockError::TotalFeeMismatch {
                declared: block.total_fee,
                computed: payload.total_fee,
            });
        }

        let expected = if block.height == 1 {
            0
        } else {
            self.reward.calc_reward(block.height)
        };
        if block.reward != expected && !self.ctx.exceptions.is_block_reward_exempt(&block.id) {
            return Err(BlockError::InvalidReward {
                expected,
                actual: block.reward,
            });
        }
        Ok(())
    }

    /// The block must extend `tip` directly.
    fn verify_link(
        &self,
        block: &Block,
        tip: Option<&Block>,
        events: &mut Vec<ChainEvent>,
    ) -> Result<(), BlockError> {
        if self.ctx.storage.get_block_record(&block.id)?.is_some() {
            return Err(BlockError::AlreadyExists(block.id));
        }
        let tip = match tip {
            Some(tip) => tip,
            None if block.height == 1 && block.previous_block_id.is_none() => return Ok(()),
            None => return Err(BlockError::NotBootstrapped),
        };

        let next_height = tip.height + 1;
        if block.height == next_height && block.previous_block_id != Some(tip.id) {
            events.push(self.record_fork(block, ForkCause::PreviousBlockMismatch)?);
            return Err(BlockError::PreviousMismatch {
                height: block.height,
                previous: block.previous_block_id,
                tip: Some(tip.id),
            });
        }
        if block.height == tip.height && block.previous_block_id == tip.previous_block_id {
            events.push(self.record_fork(block, ForkCause::SameHeightDifferentId)?);
            return Err(BlockError::SameHeightFork {
                id: block.id,
                tip: tip.id,
                height: block.height,
            });
        }
        // Out of sequence in either direction: nothing to compare against.
        if block.height != next_height {
            return Err(BlockError::NotNextBlock {
                height: block.height,
                tip_height: tip.height,
            });
        }
        if block.timestamp <= tip.timestamp {
            return Err(BlockError::TimestampNotAfterPrevious {
                timestamp: block.timestamp.as_secs(),
                previous: tip.timestamp.as_secs(),
            });
        }
        Ok(())
    }

    fn record_fork(&self, block: &Block, cause: ForkCause) -> Result<ChainEvent, BlockError> {
        let event = ForkEvent {
            delegate_public_key: block.generator_public_key,
            block_id: block.id,
            block_height: block.height,
            previous_block_id: block.previous_block_id,
            cause,
        };
        info!(block_id = %block.id, height = block.height, cause = cause.code(), "fork");
        self.ctx.storage.record_fork(&event)?;
        self.ctx.metrics.record_fork(cause);
        Ok(ChainEvent::Fork(event))
    }

    // ── Backward ────────────────────────────────────────────────────────

    /// Remove the tip and make its predecessor the new tip. Returns the
    /// removed block.
    pub fn delete_last_block(&self) -> Result<Block, BlockError> {
        let mut events = Vec::new();
        let result = self.delete_locked(&mut events);
        match &result {
            Ok(block) => {
                self.ctx.metrics.blocks_deleted.inc();
                self.ctx
                    .metrics
                    .chain_height
                    .set(height_gauge(block.height.saturating_sub(1)));
                info!(block_id = %block.id, height = block.height, "block deleted");
            }
            Err(err) => warn!(error = %err, "deleting last block failed"),
        }
        for event in &events {
            self.ctx.events.emit(event);
        }
        result
    }

    fn delete_locked(&self, events: &mut Vec<ChainEvent>) -> Result<Block, BlockError> {
        let mut chain = self.chain()?;
        let tip = chain.tip.clone().ok_or(BlockError::NotBootstrapped)?;
        let span = block_delete_span(tip.id, tip.height);
        let _enter = span.enter();
        if tip.height == 1 {
            return Err(BlockError::CannotDeleteGenesis);
        }
        let previous_id = tip.previous_block_id.ok_or(BlockError::CannotDeleteGenesis)?;
        let previous = load_block(self.ctx.storage.as_ref(), &previous_id)?
            .ok_or(BlockError::MissingBlock(previous_id))?;

        let mut state = StateStore::mutating(self.ctx.storage.as_ref());
        let (accumulator, outcome) = {
            let span = round_tick_span(self.ctx.params.calc_round(tip.height), tip.height, true);
            let _enter = span.enter();
            self.rounds.backward_tick(&mut state, &tip)?
        };
        let responses = self.ctx.engine.undo_transactions_in(
            &mut state,
            &tip.transactions,
            &ApplyContext::block(tip.height),
        )?;
        if let Some(failed) = responses.iter().find(|r| !r.is_ok()) {
            return Err(BlockError::UndoFailed {
                id: failed.id,
                reason: failed.reason(),
            });
        }
        state.stage_block_delete(tip.id);
        state.commit()?;

        for round in &outcome.invalidate_rounds {
            self.ctx.delegates.invalidate(*round)?;
        }
        chain.tip = Some(previous);
        chain.accumulator = accumulator;
        drop(chain);

        debug!(outsiders = outcome.outsiders.len(), "round accounting reversed");
        events.push(ChainEvent::DeletedBlock { block: tip.clone() });
        Ok(tip)
    }

    // ── Generation ──────────────────────────────────────────────────────

    /// Assemble and sign the next block from `candidates`.
    ///
    /// Candidates are sorted, dry-run one after another on top of those
    /// already selected, and cut off at the payload and count limits.
    pub fn generate_block(
        &self,
        keypair: &KeyPair,
        timestamp: Timestamp,
        mut candidates: Vec<Transaction>,
    ) -> Result<Block, BlockError> {
        let tip = self.tip()?.ok_or(BlockError::NotBootstrapped)?;
        let params = &self.ctx.params;
        let height = tip.height + 1;
        sort_transactions(&mut candidates);

        let mut selected: Vec<Transaction> = Vec::new();
        let mut payload_length = 0usize;
        for tx in candidates {
            if selected.len() >= params.max_transactions_per_block as usize {
                break;
            }
            let size = tx.to_bytes(false, false).len();
            if payload_length + size > params.max_payload_length as usize {
                break;
            }
            let response = self
                .ctx
                .engine
                .verify_transactions(
                    self.ctx.storage.as_ref(),
                    std::slice::from_ref(&tx),
                    &VerifyContext {
                        height,
                        now: timestamp,
                        pooled: &selected,
                    },
                )?
                .pop();
            match response {
                Some(response) if response.is_ok() => {
                    payload_length += size;
                    selected.push(tx);
                }
                Some(response) => {
                    debug!(transaction_id = %tx.id, reason = %response.reason(), "candidate left out of block");
                }
                None => {}
            }
        }

        Ok(Block::create(BlockTemplate {
            keypair,
            timestamp,
            previous: &tip,
            transactions: selected,
            reward: self.reward.calc_reward(height),
        }))
    }
}

fn height_gauge(height: u64) -> i64 {
    i64::try_from(height).unwrap_or(i64::MAX)
}
