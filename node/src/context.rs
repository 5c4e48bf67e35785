//! Shared handles every node component is built from.

use crate::events::EventBus;
use crate::metrics::NodeMetrics;
use crate::NodeError;
use kestrel_consensus::DelegateRegistry;
use kestrel_ledger::ProcessTransactions;
use kestrel_store::Storage;
use kestrel_types::{ChainParams, Clock, NetworkExceptions};
use std::sync::Arc;

/// Constructed once at startup and cloned into each component.
#[derive(Clone)]
pub struct ChainContext {
    pub params: ChainParams,
    pub exceptions: NetworkExceptions,
    pub storage: Arc<dyn Storage>,
    pub engine: Arc<ProcessTransactions>,
    pub delegates: Arc<DelegateRegistry>,
    pub events: Arc<EventBus>,
    pub metrics: Arc<NodeMetrics>,
    pub clock: Arc<dyn Clock>,
}

impl ChainContext {
    pub fn new(
        params: ChainParams,
        exceptions: NetworkExceptions,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        let engine = Arc::new(ProcessTransactions::new(params.clone(), exceptions.clone()));
        let delegates = Arc::new(DelegateRegistry::new(
            Arc::clone(&storage),
            params.clone(),
            exceptions.clone(),
        ));
        Ok(Self {
            params,
            exceptions,
            storage,
            engine,
            delegates,
            events: Arc::new(EventBus::new()),
            metrics: Arc::new(NodeMetrics::new()?),
            clock,
        })
    }
}
