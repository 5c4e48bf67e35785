//! Fundamental types for the kestrel chain.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! identifiers, keys, timestamps, slot and round arithmetic, chain parameters,
//! per-network historical exceptions, and fork records.

pub mod address;
pub mod error;
pub mod exceptions;
pub mod fork;
pub mod id;
pub mod keys;
pub mod network;
pub mod params;
pub mod slots;
pub mod time;

pub use address::Address;
pub use error::TypesError;
pub use exceptions::{NetworkExceptions, RoundException};
pub use fork::{ForkCause, ForkEvent};
pub use id::{BlockId, TransactionId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use params::{ChainParams, FeeSchedule, RewardSchedule, UNIT};
pub use time::{Clock, SystemClock, Timestamp};
