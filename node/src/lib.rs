//! kestrel node core.
//!
//! The node is the coordinator that:
//! - Verifies and applies blocks, deleting them again on rollback
//! - Accounts rounds and rotates the forging delegates
//! - Admits unconfirmed transactions into the pool
//! - Forges blocks in the slots of its enabled delegates
//! - Loads, re-verifies and synchronises the chain
//!
//! All state-mutating work is serialised through one [`Sequence`].

pub mod block_processor;
pub mod broadhash;
pub mod chain_sync;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod forger;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod sequence;
pub mod shutdown;
pub mod tracing_spans;

pub use block_processor::{BlockProcessor, BlockSource, ProcessedBlock};
pub use broadhash::{compute_broadhash, consensus_percentage, Broadhash, BroadhashTracker};
pub use chain_sync::{ChainSync, NoPeers, PeerInfo, PeerNetwork};
pub use config::{ForgingConfig, ForgingSecret, LoadingConfig, NodeConfig, SyncConfig};
pub use context::ChainContext;
pub use error::{BlockError, ErrorKind, NodeError};
pub use events::{ChainEvent, EventBus};
pub use forger::{ForgeOutcome, Forger};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{KestrelNode, PoolJobReport};
pub use sequence::Sequence;
pub use shutdown::ShutdownController;
