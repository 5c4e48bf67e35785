//! Network identifier.

use crate::error::TypesError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies which kestrel network a node is connected to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network.
    Live,
    /// The public test network.
    Test,
    /// Local development network.
    #[default]
    Dev,
}

impl NetworkId {
    /// Unix time of the network epoch (2016-05-24T17:00:00Z for all networks).
    pub fn epoch_unix_secs(&self) -> u64 {
        1_464_109_200
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
            Self::Dev => "dev",
        }
    }
}

impl FromStr for NetworkId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "test" => Ok(Self::Test),
            "dev" => Ok(Self::Dev),
            other => Err(TypesError::UnknownNetwork(other.to_string())),
        }
    }
}
