//! Transfer: move funds between accounts.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{credit, debit, require_positive_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, PrepareRequest, StateStore};
use kestrel_types::{ChainParams, FeeSchedule};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAsset {
    /// Free-form reference text shared with the recipient.
    #[serde(default)]
    pub data: Option<String>,
}

impl TransactionKind for TransferAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Transfer
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.transfer
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        if let Some(data) = &self.data {
            out.extend_from_slice(data.as_bytes());
        }
    }

    fn validate(&self, tx: &Transaction, params: &ChainParams) -> Result<(), TransactionError> {
        if tx.recipient_id.is_none() {
            return Err(TransactionError::InvalidRecipient("missing recipient".into()));
        }
        require_positive_amount(tx)?;
        if let Some(data) = &self.data {
            if data.len() > params.max_shared_transaction_data {
                return Err(TransactionError::InvalidAsset(format!(
                    "data exceeds {} bytes",
                    params.max_shared_transaction_data
                )));
            }
        }
        Ok(())
    }

    fn prepare(&self, tx: &Transaction, request: &mut PrepareRequest) {
        request.addresses.extend(tx.recipient_id);
    }

    fn apply(
        &self,
        tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        let recipient = tx
            .recipient_id
            .ok_or_else(|| TransactionError::InvalidRecipient("missing recipient".into()))?;
        credit(sender, state, &recipient, tx.amount)
    }

    fn undo(
        &self,
        tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        let recipient = tx
            .recipient_id
            .ok_or_else(|| TransactionError::InvalidRecipient("missing recipient".into()))?;
        debit(sender, state, &recipient, tx.amount)
    }
}
