//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};

use kestrel_crypto::EncryptedSecret;
use kestrel_pool::PoolConfig;
use kestrel_types::{ChainParams, NetworkExceptions, NetworkId, PublicKey};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a kestrel node.
///
/// Chain constants are not configurable: they follow from [`NodeConfig::network`]
/// through [`NodeConfig::params`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to join.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub forging: ForgingConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub loading: LoadingConfig,
}

/// A delegate secret this node may forge with, encrypted at rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgingSecret {
    pub public_key: PublicKey,
    pub encrypted: EncryptedSecret,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForgingConfig {
    #[serde(default)]
    pub secrets: Vec<ForgingSecret>,

    /// Forge even when too few peers agree on the broadhash.
    #[serde(default)]
    pub force: bool,

    /// Percentage of peers that must share our broadhash before forging.
    #[serde(default = "default_min_broadhash_consensus")]
    pub min_broadhash_consensus: f64,

    /// Password used to enable every secret at startup. Development only.
    #[serde(default)]
    pub default_password: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Fetch attempts per sync before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Blocks requested from a peer per fetch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay after the first failed attempt; doubles on every further failure.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Seconds between background sync passes.
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingConfig {
    /// Blocks read from storage per batch when rebuilding.
    #[serde(default = "default_rebuild_batch_size")]
    pub rebuild_batch_size: usize,

    /// Re-verify the last rounds of the stored chain at startup.
    #[serde(default = "default_true")]
    pub validate_own_chain: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_broadhash_consensus() -> f64 {
    51.0
}

fn default_max_attempts() -> u32 {
    5
}

fn default_batch_size() -> usize {
    34
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_sync_interval_secs() -> u64 {
    10
}

fn default_rebuild_batch_size() -> usize {
    5000
}

fn default_true() -> bool {
    true
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn params(&self) -> ChainParams {
        ChainParams::for_network(self.network)
    }

    pub fn exceptions(&self) -> NetworkExceptions {
        NetworkExceptions::for_network(self.network)
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            forging: ForgingConfig::default(),
            pool: PoolConfig::default(),
            sync: SyncConfig::default(),
            loading: LoadingConfig::default(),
        }
    }
}

impl Default for ForgingConfig {
    fn default() -> Self {
        Self {
            secrets: Vec::new(),
            force: false,
            min_broadhash_consensus: default_min_broadhash_consensus(),
            default_password: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            base_backoff_ms: default_base_backoff_ms(),
            interval_secs: default_sync_interval_secs(),
        }
    }
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            rebuild_batch_size: default_rebuild_batch_size(),
            validate_own_chain: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.network, config.network);
        assert_eq!(parsed.pool, config.pool);
        assert_eq!(parsed.sync, config.sync);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config.network, NetworkId::Dev);
        assert_eq!(config.log_format, "human");
        assert_eq!(config.forging.min_broadhash_consensus, 51.0);
        assert!(config.loading.validate_own_chain);
        assert_eq!(config.params().active_delegates, 101);
    }

    #[test]
    fn sections_override_their_fields_only() {
        let toml = r#"
            network = "test"

            [forging]
            force = true

            [pool]
            fill_batch_size = 10

            [sync]
            max_attempts = 2
        "#;
        let config = NodeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.network, NetworkId::Test);
        assert!(config.forging.force);
        assert_eq!(config.forging.min_broadhash_consensus, 51.0);
        assert_eq!(config.pool.fill_batch_size, 10);
        assert_eq!(config.pool.max_transactions_per_queue, 1000);
        assert_eq!(config.sync.max_attempts, 2);
        assert_eq!(config.sync.batch_size, 34);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = NodeConfig::from_toml_str("network = 5").unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();
        let config = NodeConfig::from_toml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.log_level, "debug");
    }
}
