//! Transaction kinds for kestrel.
//!
//! Every transaction shares one envelope ([`Transaction`]) and carries a
//! kind-specific [`TransactionAsset`]. Kind behaviour lives behind the
//! [`TransactionKind`] trait, one module per kind:
//!
//! - **transfer** (type 0): move funds, optionally with a short data field
//! - **second_signature** (type 1): register a second signing key
//! - **delegate** (type 2): register as a forging delegate under a username
//! - **vote** (type 3): add or remove votes for delegates
//! - **multisignature** (type 4): turn the sender into an M-of-N account
//! - **dapp** (type 5): register a side-chain application
//! - **in_transfer** (type 6): fund an application's owner
//! - **out_transfer** (type 7): withdraw from an application
//!
//! Stateless checks are in [`validation`]; stateful apply and undo against a
//! [`kestrel_store::StateStore`] are in [`apply`].

pub mod apply;
pub mod builder;
pub mod bytes;
pub mod dapp;
pub mod delegate;
pub mod error;
pub mod in_transfer;
pub mod kind;
pub mod multisignature;
pub mod out_transfer;
pub mod response;
pub mod second_signature;
pub mod transfer;
pub mod validation;
pub mod vote;

pub use apply::ApplyEnv;
pub use builder::TransactionBuilder;
pub use dapp::{DappAsset, DappCategory};
pub use delegate::DelegateAsset;
pub use error::TransactionError;
pub use in_transfer::InTransferAsset;
pub use kind::TransactionKind;
pub use multisignature::MultisignatureAsset;
pub use out_transfer::OutTransferAsset;
pub use response::{Status, TransactionResponse};
pub use second_signature::SecondSignatureAsset;
pub use transfer::TransferAsset;
pub use vote::{VoteAction, VoteAsset, VoteChange};

use kestrel_crypto::derive_address;
use kestrel_types::{Address, PublicKey, Signature, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric transaction type as written into the byte encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionType {
    Transfer = 0,
    SecondSignature = 1,
    Delegate = 2,
    Vote = 3,
    Multisignature = 4,
    Dapp = 5,
    InTransfer = 6,
    OutTransfer = 7,
}

impl TransactionType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Transfer,
            1 => Self::SecondSignature,
            2 => Self::Delegate,
            3 => Self::Vote,
            4 => Self::Multisignature,
            5 => Self::Dapp,
            6 => Self::InTransfer,
            7 => Self::OutTransfer,
            _ => return None,
        })
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transfer => "transfer",
            Self::SecondSignature => "second_signature",
            Self::Delegate => "delegate",
            Self::Vote => "vote",
            Self::Multisignature => "multisignature",
            Self::Dapp => "dapp",
            Self::InTransfer => "in_transfer",
            Self::OutTransfer => "out_transfer",
        };
        f.write_str(name)
    }
}

/// Kind-specific payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionAsset {
    Transfer(TransferAsset),
    SecondSignature(SecondSignatureAsset),
    Delegate(DelegateAsset),
    Vote(VoteAsset),
    Multisignature(MultisignatureAsset),
    Dapp(DappAsset),
    InTransfer(InTransferAsset),
    OutTransfer(OutTransferAsset),
}

impl TransactionAsset {
    /// The behaviour of this asset's kind.
    pub fn kind(&self) -> &dyn TransactionKind {
        match self {
            Self::Transfer(asset) => asset,
            Self::SecondSignature(asset) => asset,
            Self::Delegate(asset) => asset,
            Self::Vote(asset) => asset,
            Self::Multisignature(asset) => asset,
            Self::Dapp(asset) => asset,
            Self::InTransfer(asset) => asset,
            Self::OutTransfer(asset) => asset,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.kind().transaction_type()
    }
}

/// A signed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub timestamp: Timestamp,
    pub sender_public_key: PublicKey,
    /// Set when a multisignature group member initiates on the sender's behalf.
    #[serde(default)]
    pub requester_public_key: Option<PublicKey>,
    #[serde(default)]
    pub recipient_id: Option<Address>,
    pub amount: u64,
    pub fee: u64,
    pub asset: TransactionAsset,
    pub signature: Signature,
    #[serde(default)]
    pub sign_signature: Option<Signature>,
    /// Multisignature co-signatures. Not part of the byte encoding, so
    /// collecting them never changes the id.
    #[serde(default)]
    pub signatures: Vec<Signature>,
}

impl Transaction {
    pub fn transaction_type(&self) -> TransactionType {
        self.asset.transaction_type()
    }

    pub fn sender_address(&self) -> Address {
        derive_address(&self.sender_public_key)
    }

    /// Amount plus fee, or `None` on overflow.
    pub fn total_spend(&self) -> Option<u64> {
        self.amount.checked_add(self.fee)
    }

    pub fn is_multisignature_registration(&self) -> bool {
        matches!(self.asset, TransactionAsset::Multisignature(_))
    }

    /// Hours this transaction may wait in the pool for co-signatures, if it
    /// registers a multisignature group.
    pub fn multisignature_lifetime_hours(&self) -> Option<u8> {
        match &self.asset {
            TransactionAsset::Multisignature(asset) => Some(asset.lifetime),
            _ => None,
        }
    }
}
