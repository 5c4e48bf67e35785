//! Delegate registration.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{require_no_recipient, require_zero_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, PrepareRequest, StateStore};
use kestrel_types::{Address, ChainParams, FeeSchedule};
use serde::{Deserialize, Serialize};

pub const MAX_USERNAME_LENGTH: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateAsset {
    pub username: String,
}

/// Lowercase, 1 to 20 characters from `[a-z0-9!@$&_.]`, and not shaped like an address.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LENGTH
        && username
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"!@$&_.".contains(&b))
        && !Address::looks_like_address(username)
}

impl TransactionKind for DelegateAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Delegate
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.delegate
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.username.as_bytes());
    }

    fn validate(&self, tx: &Transaction, _params: &ChainParams) -> Result<(), TransactionError> {
        require_no_recipient(tx)?;
        require_zero_amount(tx)?;
        if !is_valid_username(&self.username) {
            return Err(TransactionError::InvalidAsset(format!(
                "invalid delegate username: {:?}",
                self.username
            )));
        }
        Ok(())
    }

    fn prepare(&self, _tx: &Transaction, request: &mut PrepareRequest) {
        request.usernames.push(self.username.clone());
    }

    fn apply(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        if sender.is_delegate || sender.u_is_delegate {
            return Err(TransactionError::AlreadyDelegate);
        }
        if let Some(holder) = state.account_by_username(&self.username)? {
            if holder.address != sender.address {
                return Err(TransactionError::UsernameTaken(self.username.clone()));
            }
        }
        sender.is_delegate = true;
        sender.u_is_delegate = true;
        sender.username = Some(self.username.clone());
        sender.u_username = Some(self.username.clone());
        Ok(())
    }

    fn undo(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        _state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        sender.is_delegate = false;
        sender.u_is_delegate = false;
        sender.username = None;
        sender.u_username = None;
        Ok(())
    }
}
