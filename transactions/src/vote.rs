//! Votes for delegates.
//!
//! Each change is rendered `+<hex key>` or `-<hex key>`. The asset bytes are
//! the rendered changes concatenated with no separator.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{require_zero_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_crypto::derive_address;
use kestrel_store::{Account, PrepareRequest, StateStore};
use kestrel_types::{ChainParams, FeeSchedule, PublicKey, TypesError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteAction {
    Add,
    Remove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoteChange {
    pub action: VoteAction,
    pub delegate: PublicKey,
}

impl VoteChange {
    pub fn add(delegate: PublicKey) -> Self {
        Self {
            action: VoteAction::Add,
            delegate,
        }
    }

    pub fn remove(delegate: PublicKey) -> Self {
        Self {
            action: VoteAction::Remove,
            delegate,
        }
    }
}

impl fmt::Display for VoteChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.action {
            VoteAction::Add => '+',
            VoteAction::Remove => '-',
        };
        write!(f, "{sign}{}", self.delegate)
    }
}

impl FromStr for VoteChange {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, key) = if let Some(key) = s.strip_prefix('+') {
            (VoteAction::Add, key)
        } else if let Some(key) = s.strip_prefix('-') {
            (VoteAction::Remove, key)
        } else {
            return Err(TypesError::InvalidHex(format!("vote must start with + or -: {s}")));
        };
        Ok(Self {
            action,
            delegate: key.parse()?,
        })
    }
}

impl Serialize for VoteChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VoteChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAsset {
    pub votes: Vec<VoteChange>,
}

fn is_registered_delegate(account: &Account, key: &PublicKey) -> bool {
    account.is_delegate && account.public_key.as_ref() == Some(key)
}

impl TransactionKind for VoteAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Vote
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.vote
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        for change in &self.votes {
            out.extend_from_slice(change.to_string().as_bytes());
        }
    }

    fn validate(&self, tx: &Transaction, params: &ChainParams) -> Result<(), TransactionError> {
        require_zero_amount(tx)?;
        if tx.recipient_id != Some(tx.sender_address()) {
            return Err(TransactionError::InvalidRecipient(
                "vote recipient must be the sender".into(),
            ));
        }
        if self.votes.is_empty() || self.votes.len() > params.max_votes_per_transaction {
            return Err(TransactionError::InvalidAsset(format!(
                "vote count must be between 1 and {}",
                params.max_votes_per_transaction
            )));
        }
        let mut seen = HashSet::new();
        for change in &self.votes {
            if !seen.insert(change.delegate) {
                return Err(TransactionError::InvalidAsset(format!(
                    "duplicate vote for {}",
                    change.delegate
                )));
            }
        }
        Ok(())
    }

    fn prepare(&self, _tx: &Transaction, request: &mut PrepareRequest) {
        request
            .addresses
            .extend(self.votes.iter().map(|change| derive_address(&change.delegate)));
    }

    fn apply(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        let mut voted = sender.voted_delegates.clone();
        for change in &self.votes {
            match change.action {
                VoteAction::Add => {
                    let address = derive_address(&change.delegate);
                    let registered = if address == sender.address {
                        is_registered_delegate(sender, &change.delegate)
                    } else {
                        is_registered_delegate(&state.get_account(&address)?, &change.delegate)
                    };
                    if !registered {
                        return Err(TransactionError::DelegateNotFound(change.delegate));
                    }
                    if voted.contains(&change.delegate) {
                        return Err(TransactionError::AlreadyVoted(change.delegate));
                    }
                    voted.push(change.delegate);
                }
                VoteAction::Remove => {
                    if !voted.contains(&change.delegate) {
                        return Err(TransactionError::NotVoted(change.delegate));
                    }
                    voted.retain(|key| key != &change.delegate);
                }
            }
        }
        if voted.len() > env.params.max_votes_per_account {
            return Err(TransactionError::TooManyVotes {
                max: env.params.max_votes_per_account,
                actual: voted.len(),
            });
        }
        sender.u_voted_delegates = voted.clone();
        sender.voted_delegates = voted;
        Ok(())
    }

    fn undo(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        _state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        let mut voted = sender.voted_delegates.clone();
        for change in self.votes.iter().rev() {
            match change.action {
                VoteAction::Add => voted.retain(|key| key != &change.delegate),
                VoteAction::Remove => {
                    if !voted.contains(&change.delegate) {
                        voted.push(change.delegate);
                    }
                }
            }
        }
        sender.u_voted_delegates = voted.clone();
        sender.voted_delegates = voted;
        Ok(())
    }
}
