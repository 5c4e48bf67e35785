//! Withdrawal from an application, issued by its owner. Each source
//! transaction can be paid out once.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{credit, debit, require_positive_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, PrepareRequest, StateStore};
use kestrel_types::{ChainParams, FeeSchedule, TransactionId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutTransferAsset {
    pub dapp_id: TransactionId,
    /// Side-chain transaction this withdrawal settles.
    pub transaction_id: TransactionId,
}

impl TransactionKind for OutTransferAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::OutTransfer
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.out_transfer
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.dapp_id.to_string().as_bytes());
        out.extend_from_slice(self.transaction_id.to_string().as_bytes());
    }

    fn validate(&self, tx: &Transaction, _params: &ChainParams) -> Result<(), TransactionError> {
        if tx.recipient_id.is_none() {
            return Err(TransactionError::InvalidRecipient("missing recipient".into()));
        }
        require_positive_amount(tx)
    }

    fn prepare(&self, tx: &Transaction, request: &mut PrepareRequest) {
        request.dapps.push(self.dapp_id);
        request.out_transfers.push(self.transaction_id);
        request.addresses.extend(tx.recipient_id);
    }

    fn apply(
        &self,
        tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        let dapp = state
            .get_dapp(&self.dapp_id)?
            .ok_or(TransactionError::DappNotFound(self.dapp_id))?;
        if dapp.owner != sender.address {
            return Err(TransactionError::NotDappOwner(self.dapp_id));
        }
        if state.out_transfer_exists(&self.transaction_id)? {
            return Err(TransactionError::OutTransferProcessed(self.transaction_id));
        }
        let recipient = tx
            .recipient_id
            .ok_or_else(|| TransactionError::InvalidRecipient("missing recipient".into()))?;
        state.set_out_transfer(self.transaction_id, true);
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
        state.set_out_transfer(self.transaction_id, false);
        debit(sender, state, &recipient, tx.amount)
    }
}
