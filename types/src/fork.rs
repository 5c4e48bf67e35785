//! Fork records.

use crate::id::BlockId;
use crate::keys::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a competing block was rejected.
///
/// The numeric codes are shared with peers and telemetry, so they never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForkCause {
    /// Block does not extend the current tip.
    PreviousBlockMismatch,
    /// Block contains a transaction that is already confirmed.
    TransactionAlreadyConfirmed,
    /// Block was produced by a delegate not assigned to its slot.
    WrongSlotDelegate,
    /// Same height and previous block as the tip, but a different id.
    SameHeightDifferentId,
}

impl ForkCause {
    pub fn code(&self) -> u8 {
        match self {
            Self::PreviousBlockMismatch => 1,
            Self::TransactionAlreadyConfirmed => 2,
            Self::WrongSlotDelegate => 3,
            Self::SameHeightDifferentId => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::PreviousBlockMismatch),
            2 => Some(Self::TransactionAlreadyConfirmed),
            3 => Some(Self::WrongSlotDelegate),
            5 => Some(Self::SameHeightDifferentId),
            _ => None,
        }
    }
}

impl fmt::Display for ForkCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One observed fork, as persisted and broadcast for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkEvent {
    pub delegate_public_key: PublicKey,
    pub block_id: BlockId,
    pub block_height: u64,
    pub previous_block_id: Option<BlockId>,
    pub cause: ForkCause,
}
