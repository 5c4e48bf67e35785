//! Multisignature group registration.
//!
//! The registration itself must be co-signed by every member of the new
//! group. Afterwards each transaction from the account needs `min`
//! co-signatures (one fewer when a member initiated it as requester).

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{require_no_recipient, require_zero_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, StateStore};
use kestrel_types::{ChainParams, FeeSchedule, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisignatureAsset {
    pub min: u8,
    /// Hours the registration may wait for co-signatures.
    pub lifetime: u8,
    pub keysgroup: Vec<PublicKey>,
}

impl TransactionKind for MultisignatureAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Multisignature
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.multisignature_fee(self.keysgroup.len())
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.min);
        out.push(self.lifetime);
        for key in &self.keysgroup {
            out.push(b'+');
            out.extend_from_slice(key.to_hex().as_bytes());
        }
    }

    fn validate(&self, tx: &Transaction, params: &ChainParams) -> Result<(), TransactionError> {
        require_no_recipient(tx)?;
        require_zero_amount(tx)?;
        let keys = self.keysgroup.len();
        if keys < params.multisig_min_keys || keys > params.multisig_max_keys {
            return Err(TransactionError::InvalidAsset(format!(
                "keysgroup must hold between {} and {} keys",
                params.multisig_min_keys, params.multisig_max_keys
            )));
        }
        let min = usize::from(self.min);
        if min < params.multisig_min_keys || min > params.multisig_max_keys || min > keys {
            return Err(TransactionError::InvalidAsset(format!(
                "min {} out of range for {keys} keys",
                self.min
            )));
        }
        if self.lifetime < params.multisig_min_lifetime_hours
            || self.lifetime > params.multisig_max_lifetime_hours
        {
            return Err(TransactionError::InvalidAsset(format!(
                "lifetime must be between {} and {} hours",
                params.multisig_min_lifetime_hours, params.multisig_max_lifetime_hours
            )));
        }
        let mut seen = HashSet::new();
        for key in &self.keysgroup {
            if *key == tx.sender_public_key {
                return Err(TransactionError::InvalidAsset(
                    "sender may not be part of its own keysgroup".into(),
                ));
            }
            if !seen.insert(*key) {
                return Err(TransactionError::InvalidAsset(format!(
                    "duplicate keysgroup member {key}"
                )));
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        _state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        if sender.is_multisignature() || !sender.u_multisignatures.is_empty() {
            return Err(TransactionError::AlreadyMultisignature);
        }
        sender.multisignatures = self.keysgroup.clone();
        sender.u_multisignatures = self.keysgroup.clone();
        sender.multimin = self.min;
        sender.u_multimin = self.min;
        sender.multilifetime = self.lifetime;
        sender.u_multilifetime = self.lifetime;
        Ok(())
    }

    fn undo(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        _state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        sender.multisignatures.clear();
        sender.u_multisignatures.clear();
        sender.multimin = 0;
        sender.u_multimin = 0;
        sender.multilifetime = 0;
        sender.u_multilifetime = 0;
        Ok(())
    }
}
