//! The kestrel node: wires the consensus core together and runs its
//! background tasks.
//!
//! Every state-mutating operation goes through one [`Sequence`], so block
//! application, pool admission and forging never interleave. Reads (pool
//! listings, the tip, forger keys) bypass it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use kestrel_ledger::{Block, SignatureOutcome};
use kestrel_pool::{PoolError, TransactionPool};
use kestrel_store::Storage;
use kestrel_transactions::Transaction;
use kestrel_types::{ChainParams, Clock, NetworkExceptions, PublicKey, Signature, TransactionId};

use crate::block_processor::{BlockProcessor, BlockSource, ProcessedBlock};
use crate::broadhash::{Broadhash, BroadhashTracker};
use crate::chain_sync::{ChainSync, PeerNetwork};
use crate::config::NodeConfig;
use crate::context::ChainContext;
use crate::error::{BlockError, NodeError};
use crate::events::ChainEvent;
use crate::forger::{ForgeOutcome, Forger};
use crate::sequence::Sequence;
use crate::shutdown::ShutdownController;
use crate::tracing_spans::{forge_span, pool_admit_span};

/// Seconds between forging checks. Shorter than a slot so no slot is missed.
const FORGE_INTERVAL_SECS: u64 = 1;

/// What one background pool pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolJobReport {
    pub verified: usize,
    pub filled: usize,
    pub expired: Vec<TransactionId>,
}

struct NodeInner {
    config: NodeConfig,
    genesis: Block,
    ctx: ChainContext,
    processor: Arc<BlockProcessor>,
    pool: Arc<Mutex<TransactionPool>>,
    forger: Forger,
    sync: ChainSync,
    broadhash: Arc<BroadhashTracker>,
}

#[derive(Clone)]
pub struct KestrelNode {
    inner: Arc<NodeInner>,
    sequence: Arc<Sequence>,
    shutdown: Arc<ShutdownController>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl KestrelNode {
    /// Build a node for `config.network`. Must be called from within a tokio
    /// runtime.
    pub fn new(
        config: NodeConfig,
        genesis: Block,
        storage: Arc<dyn Storage>,
        network: Arc<dyn PeerNetwork>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        let params = config.params();
        let exceptions = config.exceptions();
        Self::with_params(config, params, exceptions, genesis, storage, network, clock)
    }

    /// Build a node with explicit chain parameters.
    pub fn with_params(
        config: NodeConfig,
        params: ChainParams,
        exceptions: NetworkExceptions,
        genesis: Block,
        storage: Arc<dyn Storage>,
        network: Arc<dyn PeerNetwork>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        let ctx = ChainContext::new(params, exceptions, storage, clock)?;
        let processor = Arc::new(BlockProcessor::new(ctx.clone()));
        let pool = Arc::new(Mutex::new(TransactionPool::new(
            config.pool.clone(),
            Arc::clone(&ctx.engine),
            Arc::clone(&ctx.storage),
        )));
        let broadhash = Arc::new(BroadhashTracker::new());
        let sync = ChainSync::new(
            Arc::clone(&processor),
            network,
            config.sync.clone(),
            config.loading.clone(),
        );
        subscribe_chain_listeners(&ctx, &pool, &broadhash);

        let inner = NodeInner {
            forger: Forger::new(config.forging.clone()),
            config,
            genesis,
            ctx,
            processor,
            pool,
            sync,
            broadhash,
        };
        Ok(Self {
            inner: Arc::new(inner),
            sequence: Arc::new(Sequence::spawn("balances")),
            shutdown: Arc::new(ShutdownController::new()),
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Load or create the chain and enable the default forging secrets.
    /// Returns the tip. Does not start background tasks.
    pub async fn bootstrap(&self) -> Result<Block, NodeError> {
        let inner = Arc::clone(&self.inner);
        let tip = self
            .sequence
            .run(move || inner.sync.bootstrap(&inner.genesis))
            .await??;
        self.inner
            .broadhash
            .refresh(self.inner.ctx.storage.as_ref(), tip.height)?;

        let enabled = self.inner.forger.load_default_secrets()?;
        for key in self.inner.forger.forger_public_keys() {
            if !self.inner.is_registered_delegate(&key)? {
                tracing::warn!(public_key = %key, "forging key is not a registered delegate, disabling");
                self.inner.forger.revoke(&key)?;
            }
        }
        tracing::info!(
            height = tip.height,
            block_id = %tip.id,
            forgers = enabled,
            "node bootstrapped"
        );
        Ok(tip)
    }

    /// Bootstrap and spawn the forging, pool and sync loops.
    pub async fn start(&self) -> Result<Block, NodeError> {
        let tip = self.bootstrap().await?;
        let pool_interval = Duration::from_secs(self.inner.config.pool.job_interval_secs.max(1));
        let sync_interval = Duration::from_secs(self.inner.config.sync.interval_secs.max(1));

        let handles = vec![
            self.spawn_loop("forging", Duration::from_secs(FORGE_INTERVAL_SECS), |node| async move {
                match node.forge_once().await {
                    Ok(ForgeOutcome::Forged { id, height, .. }) => {
                        tracing::info!(block_id = %id, height, "forged block")
                    }
                    Ok(outcome) => tracing::trace!(?outcome, "no block forged"),
                    Err(e) => tracing::warn!(error = %e, "forging attempt failed"),
                }
            }),
            self.spawn_loop("pool", pool_interval, |node| async move {
                if let Err(e) = node.process_pool().await {
                    tracing::warn!(error = %e, "pool pass failed");
                }
            }),
            self.spawn_loop("sync", sync_interval, |node| async move {
                if let Err(e) = node.sync_with_network().await {
                    tracing::warn!(error = %e, "chain sync failed");
                }
            }),
        ];
        self.tasks
            .lock()
            .map_err(|_| NodeError::LockPoisoned)?
            .extend(handles);
        tracing::info!("kestrel node started");
        Ok(tip)
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, body: F) -> JoinHandle<()>
    where
        F: Fn(KestrelNode) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let node = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!(task = name, "background task shutting down");
                        break;
                    }
                    _ = interval.tick() => body(node.clone()).await,
                }
            }
        })
    }

    /// Stop background tasks and wait for the in-flight sequenced job.
    pub async fn stop(&self) -> Result<(), NodeError> {
        if !self.shutdown.shutdown() {
            return Ok(());
        }
        tracing::info!("kestrel node stopping");
        let handles: Vec<_> = self
            .tasks
            .lock()
            .map_err(|_| NodeError::LockPoisoned)?
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task failed");
            }
        }
        self.sequence.shutdown().await;
        tracing::info!("kestrel node stopped");
        Ok(())
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    // ── Network intake ──────────────────────────────────────────────────

    /// Process a block gossiped by a peer.
    pub async fn receive_block(&self, block: Block) -> Result<ProcessedBlock, NodeError> {
        let processor = Arc::clone(&self.inner.processor);
        Ok(self
            .sequence
            .run(move || processor.process_block(block, BlockSource::Network))
            .await??)
    }

    /// Queue gossiped transactions for verification.
    pub async fn receive_transactions(
        &self,
        txs: Vec<Transaction>,
        broadcast: bool,
    ) -> Result<Vec<Result<TransactionId, PoolError>>, NodeError> {
        let inner = Arc::clone(&self.inner);
        self.sequence
            .run(move || inner.receive_transactions(txs, broadcast))
            .await?
    }

    /// Fully verify one locally submitted transaction and admit it.
    pub async fn process_unconfirmed_transaction(
        &self,
        tx: Transaction,
        broadcast: bool,
    ) -> Result<TransactionId, NodeError> {
        let inner = Arc::clone(&self.inner);
        self.sequence
            .run(move || inner.process_unconfirmed_transaction(tx, broadcast))
            .await?
    }

    /// Attach a co-signature to a pooled multisignature transaction.
    pub async fn receive_signature(
        &self,
        transaction_id: TransactionId,
        signature: Signature,
    ) -> Result<SignatureOutcome, NodeError> {
        let inner = Arc::clone(&self.inner);
        self.sequence
            .run(move || inner.receive_signature(transaction_id, signature))
            .await?
    }

    // ── Jobs ────────────────────────────────────────────────────────────

    /// Verify received transactions, fill the ready queue and expire stale
    /// entries.
    pub async fn process_pool(&self) -> Result<PoolJobReport, NodeError> {
        let inner = Arc::clone(&self.inner);
        self.sequence.run(move || inner.process_pool()).await?
    }

    /// Try to forge in the current slot.
    pub async fn forge_once(&self) -> Result<ForgeOutcome, NodeError> {
        let inner = Arc::clone(&self.inner);
        self.sequence.run(move || inner.forge()).await?
    }

    pub async fn sync_with_network(&self) -> Result<usize, NodeError> {
        self.inner.sync.sync_with_network(&self.sequence).await
    }

    // ── Forging control ─────────────────────────────────────────────────

    /// Enable or disable forging for a configured delegate secret.
    pub fn update_forging_status(
        &self,
        public_key: &PublicKey,
        password: &str,
        enable: bool,
    ) -> Result<(), NodeError> {
        if enable && !self.inner.is_registered_delegate(public_key)? {
            return Err(NodeError::Forging(format!(
                "{public_key} is not a registered delegate"
            )));
        }
        self.inner
            .forger
            .update_forging_status(public_key, password, enable)
    }

    pub fn forger_public_keys(&self) -> Vec<PublicKey> {
        self.inner.forger.forger_public_keys()
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn context(&self) -> &ChainContext {
        &self.inner.ctx
    }

    pub fn processor(&self) -> &BlockProcessor {
        &self.inner.processor
    }

    pub fn tip(&self) -> Result<Option<Block>, NodeError> {
        Ok(self.inner.processor.tip()?)
    }

    pub fn broadhash(&self) -> Broadhash {
        self.inner.broadhash.current()
    }

    /// Percentage of peers sharing our broadhash.
    pub fn last_consensus(&self) -> f64 {
        self.inner.last_consensus()
    }

    /// Run `f` against the pool under its lock.
    pub fn with_pool<T>(&self, f: impl FnOnce(&TransactionPool) -> T) -> Result<T, NodeError> {
        Ok(f(&*self.inner.pool()?))
    }
}

impl NodeInner {
    fn pool(&self) -> Result<MutexGuard<'_, TransactionPool>, NodeError> {
        self.pool.lock().map_err(|_| NodeError::LockPoisoned)
    }

    fn is_registered_delegate(&self, public_key: &PublicKey) -> Result<bool, NodeError> {
        Ok(self
            .ctx
            .storage
            .get_account_by_public_key(public_key)?
            .is_some_and(|account| account.is_delegate))
    }

    fn last_consensus(&self) -> f64 {
        let peers: Vec<Broadhash> = self
            .sync
            .network()
            .peers()
            .into_iter()
            .map(|peer| peer.broadhash)
            .collect();
        self.broadhash.consensus(&peers)
    }

    fn receive_transactions(
        &self,
        txs: Vec<Transaction>,
        broadcast: bool,
    ) -> Result<Vec<Result<TransactionId, PoolError>>, NodeError> {
        let now = self.ctx.clock.now();
        let submitted = txs.clone();
        let results = self.pool()?.receive_transactions(txs, now);
        for (tx, result) in submitted.into_iter().zip(&results) {
            let span = pool_admit_span(tx.id);
            let _enter = span.enter();
            match result {
                Ok(_) => {
                    self.ctx.metrics.transactions_admitted.inc();
                    self.ctx.events.emit(&ChainEvent::UnconfirmedTransaction {
                        transaction: tx,
                        broadcast,
                    });
                }
                Err(e) => {
                    self.ctx.metrics.transactions_rejected.inc();
                    tracing::debug!(error = %e, "transaction refused");
                }
            }
        }
        self.update_pool_gauges();
        Ok(results)
    }

    fn process_unconfirmed_transaction(
        &self,
        tx: Transaction,
        broadcast: bool,
    ) -> Result<TransactionId, NodeError> {
        let span = pool_admit_span(tx.id);
        let _enter = span.enter();
        let now = self.ctx.clock.now();
        let result = self.pool()?.process_unconfirmed_transaction(tx.clone(), now);
        self.update_pool_gauges();
        match result {
            Ok(id) => {
                self.ctx.metrics.transactions_admitted.inc();
                self.ctx.events.emit(&ChainEvent::UnconfirmedTransaction {
                    transaction: tx,
                    broadcast,
                });
                Ok(id)
            }
            Err(e) => {
                self.ctx.metrics.transactions_rejected.inc();
                Err(e.into())
            }
        }
    }

    fn receive_signature(
        &self,
        transaction_id: TransactionId,
        signature: Signature,
    ) -> Result<SignatureOutcome, NodeError> {
        let outcome = self.pool()?.process_signature(&transaction_id, signature)?;
        self.update_pool_gauges();
        self.ctx.events.emit(&ChainEvent::Signature {
            transaction_id,
            signature,
        });
        Ok(outcome)
    }

    fn process_pool(&self) -> Result<PoolJobReport, NodeError> {
        let now = self.ctx.clock.now();
        let report = {
            let mut pool = self.pool()?;
            let verified = pool.verify_received(now)?.len();
            let filled = pool.fill_pool()?;
            let expired = pool.expire_transactions(now);
            PoolJobReport {
                verified,
                filled,
                expired,
            }
        };
        if !report.expired.is_empty() {
            tracing::info!(count = report.expired.len(), "expired pooled transactions");
        }
        self.update_pool_gauges();
        Ok(report)
    }

    fn update_pool_gauges(&self) {
        if let Ok(pool) = self.pool() {
            self.ctx.metrics.set_pool_counts(pool.counts());
        }
    }

    fn forge(&self) -> Result<ForgeOutcome, NodeError> {
        let params = &self.ctx.params;
        let now = self.ctx.clock.now();
        let slot = params.slot_number(now);
        let span = forge_span(slot);
        let _enter = span.enter();

        if self.forger.forger_public_keys().is_empty() {
            return Ok(ForgeOutcome::NoDelegates);
        }
        let tip = self.processor.tip()?.ok_or(BlockError::NotBootstrapped)?;
        if params.slot_number(tip.timestamp) >= slot {
            return Ok(ForgeOutcome::LastBlockInSlot { slot });
        }

        let round = params.calc_round(tip.height + 1);
        let owner = self.forger.with_keypairs(|keypairs| {
            self.ctx
                .delegates
                .get_forging_slot(slot, round, keypairs)
                .map(|found| found.map(|(timestamp, keypair)| (timestamp, keypair.public)))
        })??;
        let Some((timestamp, public_key)) = owner else {
            return Ok(ForgeOutcome::NotOurSlot { slot });
        };

        if !self.config.forging.force {
            let consensus = self.last_consensus();
            if consensus < self.config.forging.min_broadhash_consensus {
                tracing::warn!(consensus, "not forging, broadhash consensus too low");
                return Ok(ForgeOutcome::NoConsensus { consensus });
            }
        }

        let candidates = {
            let mut pool = self.pool()?;
            pool.fill_pool()?;
            pool.ready_transactions(params.max_transactions_per_block as usize)
        };
        let block = self.forger.with_keypairs(|keypairs| {
            keypairs
                .get(&public_key)
                .map(|keypair| self.processor.generate_block(keypair, timestamp, candidates))
                .transpose()
        })??;
        let Some(block) = block else {
            return Ok(ForgeOutcome::NotOurSlot { slot });
        };

        let processed = self.processor.process_block(block, BlockSource::Local)?;
        self.ctx.metrics.blocks_forged.inc();
        Ok(ForgeOutcome::Forged {
            id: processed.block.id,
            height: processed.block.height,
            timestamp,
        })
    }
}

/// Keep the pool, broadhash and pool gauges in step with the chain tip.
fn subscribe_chain_listeners(
    ctx: &ChainContext,
    pool: &Arc<Mutex<TransactionPool>>,
    broadhash: &Arc<BroadhashTracker>,
) {
    let pool = Arc::clone(pool);
    let broadhash = Arc::clone(broadhash);
    let storage = Arc::clone(&ctx.storage);
    let metrics = Arc::clone(&ctx.metrics);
    let clock = Arc::clone(&ctx.clock);
    ctx.events.subscribe(Box::new(move |event| {
        let tip_height = match event {
            ChainEvent::NewBlock { block, .. } => {
                if let Ok(mut pool) = pool.lock() {
                    pool.on_confirmed_transactions(&block.transaction_ids());
                    metrics.set_pool_counts(pool.counts());
                }
                block.height
            }
            ChainEvent::DeletedBlock { block } => {
                if let Ok(mut pool) = pool.lock() {
                    pool.on_deleted_transactions(block.transactions.clone(), clock.now());
                    metrics.set_pool_counts(pool.counts());
                }
                block.height.saturating_sub(1)
            }
            _ => return,
        };
        if let Err(e) = broadhash.refresh(storage.as_ref(), tip_height) {
            tracing::warn!(error = %e, "broadhash refresh failed");
        }
    }));
}
