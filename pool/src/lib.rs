//! Unconfirmed transaction pool.
//!
//! - [`queue`]: one insertion-ordered admission queue
//! - [`pool`]: the four-stage pool (received, validated, pending, ready)
//! - [`config`]: capacities and batch sizes

pub mod config;
pub mod error;
pub mod pool;
pub mod queue;

pub use config::PoolConfig;
pub use error::PoolError;
pub use pool::{PoolCounts, TransactionPool};
pub use queue::{PooledTransaction, QueueKind, TransactionQueue};
