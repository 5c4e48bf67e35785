//! Pool limits and batch sizes.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Capacity of each admission queue.
    #[serde(default = "default_max_transactions_per_queue")]
    pub max_transactions_per_queue: usize,

    /// Transactions moved towards `ready` by one fill.
    #[serde(default = "default_fill_batch_size")]
    pub fill_batch_size: usize,

    /// Received transactions verified against state by one pass.
    #[serde(default = "default_verify_batch_size")]
    pub verify_batch_size: usize,

    /// Seconds between background pool passes (verify, fill, expire).
    #[serde(default = "default_job_interval_secs")]
    pub job_interval_secs: u64,
}

fn default_max_transactions_per_queue() -> usize {
    1000
}

fn default_fill_batch_size() -> usize {
    25
}

fn default_verify_batch_size() -> usize {
    100
}

fn default_job_interval_secs() -> u64 {
    5
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_transactions_per_queue: default_max_transactions_per_queue(),
            fill_batch_size: default_fill_batch_size(),
            verify_batch_size: default_verify_batch_size(),
            job_interval_secs: default_job_interval_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: PoolConfig = toml::from_str("fill_batch_size = 10").unwrap();
        assert_eq!(config.fill_batch_size, 10);
        assert_eq!(config.max_transactions_per_queue, 1000);
    }
}
