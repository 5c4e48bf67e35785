//! Chain time.
//!
//! Timestamps are whole seconds since the network epoch (not the Unix epoch),
//! matching the 32-bit field carried in block and transaction encodings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the network epoch.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u32);

impl Timestamp {
    /// The network epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub const fn new(secs: u32) -> Self {
        Self(secs)
    }

    /// Convert a Unix time into chain time, clamping times before the epoch to zero.
    pub fn from_unix(unix_secs: u64, epoch_unix_secs: u64) -> Self {
        let secs = unix_secs.saturating_sub(epoch_unix_secs);
        Self(u32::try_from(secs).unwrap_or(u32::MAX))
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u32 {
        now.0.saturating_sub(self.0)
    }

    /// Whether this timestamp + duration has passed relative to `now`.
    pub fn has_expired(&self, duration_secs: u32, now: Timestamp) -> bool {
        now.0 >= self.0.saturating_add(duration_secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Source of the current chain time.
///
/// Production code uses [`SystemClock`]; tests use the controllable clock from
/// `kestrel-nullables`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock relative to a network epoch.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch_unix_secs: u64,
}

impl SystemClock {
    pub fn new(epoch_unix_secs: u64) -> Self {
        Self { epoch_unix_secs }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp::from_unix(unix, self.epoch_unix_secs)
    }
}
