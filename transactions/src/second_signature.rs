//! Second signature registration.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{require_no_recipient, require_zero_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, StateStore};
use kestrel_types::{ChainParams, FeeSchedule, PublicKey};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondSignatureAsset {
    pub public_key: PublicKey,
}

impl TransactionKind for SecondSignatureAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::SecondSignature
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.second_signature
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.public_key.as_bytes());
    }

    fn validate(&self, tx: &Transaction, _params: &ChainParams) -> Result<(), TransactionError> {
        require_no_recipient(tx)?;
        require_zero_amount(tx)
    }

    fn apply(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        _state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        if sender.second_signature || sender.u_second_signature {
            return Err(TransactionError::AlreadySecondSignature);
        }
        sender.second_signature = true;
        sender.u_second_signature = true;
        sender.second_public_key = Some(self.public_key);
        Ok(())
    }

    fn undo(
        &self,
        _tx: &Transaction,
        sender: &mut Account,
        _state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        sender.second_signature = false;
        sender.u_second_signature = false;
        sender.second_public_key = None;
        Ok(())
    }
}
