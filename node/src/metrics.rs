//! Prometheus metrics for the kestrel node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; an exporter outside this
//! crate can encode it with [`NodeMetrics::encode`].

use kestrel_pool::PoolCounts;
use kestrel_types::ForkCause;
use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Blocks that entered the processing pipeline.
    pub blocks_processed: IntCounter,
    pub blocks_accepted: IntCounter,
    pub blocks_rejected: IntCounter,
    /// Blocks removed from the tip.
    pub blocks_deleted: IntCounter,
    pub blocks_forged: IntCounter,
    /// Rejected competing blocks, labelled by fork cause code.
    pub forks: IntCounterVec,
    pub rounds_finished: IntCounter,
    pub transactions_admitted: IntCounter,
    pub transactions_rejected: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub chain_height: IntGauge,
    /// Pool size, labelled by queue.
    pub pool_queue_size: IntGaugeVec,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent in the block-processing pipeline, in milliseconds.
    pub block_process_time_ms: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let blocks_processed = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_processed_total", "Blocks that entered the pipeline"),
            registry
        )?;
        let blocks_accepted = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_accepted_total", "Blocks applied to the chain"),
            registry
        )?;
        let blocks_rejected = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_rejected_total", "Blocks rejected by the pipeline"),
            registry
        )?;
        let blocks_deleted = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_deleted_total", "Blocks removed from the tip"),
            registry
        )?;
        let blocks_forged = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_forged_total", "Blocks forged by this node"),
            registry
        )?;
        let forks = register_int_counter_vec_with_registry!(
            Opts::new("kestrel_forks_total", "Rejected competing blocks by fork cause"),
            &["cause"],
            registry
        )?;
        let rounds_finished = register_int_counter_with_registry!(
            Opts::new("kestrel_rounds_finished_total", "Rounds landed"),
            registry
        )?;
        let transactions_admitted = register_int_counter_with_registry!(
            Opts::new("kestrel_transactions_admitted_total", "Transactions admitted to the pool"),
            registry
        )?;
        let transactions_rejected = register_int_counter_with_registry!(
            Opts::new("kestrel_transactions_rejected_total", "Transactions refused by the pool"),
            registry
        )?;

        let chain_height = register_int_gauge_with_registry!(
            Opts::new("kestrel_chain_height", "Height of the chain tip"),
            registry
        )?;
        let pool_queue_size = register_int_gauge_vec_with_registry!(
            Opts::new("kestrel_pool_queue_size", "Transactions per pool queue"),
            &["queue"],
            registry
        )?;

        // 0.1 ms to ~1.6 s.
        let block_process_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "kestrel_block_process_time_ms",
                "Block processing time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(0.1, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_processed,
            blocks_accepted,
            blocks_rejected,
            blocks_deleted,
            blocks_forged,
            forks,
            rounds_finished,
            transactions_admitted,
            transactions_rejected,
            chain_height,
            pool_queue_size,
            block_process_time_ms,
        })
    }

    pub fn record_fork(&self, cause: ForkCause) {
        self.forks.with_label_values(&[&cause.code().to_string()]).inc();
    }

    pub fn set_pool_counts(&self, counts: PoolCounts) {
        for (queue, size) in [
            ("received", counts.received),
            ("validated", counts.validated),
            ("pending", counts.pending),
            ("ready", counts.ready),
        ] {
            self.pool_queue_size
                .with_label_values(&[queue])
                .set(i64::try_from(size).unwrap_or(i64::MAX));
        }
    }

    /// Prometheus text exposition of every metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
