//! Transfer into a registered application. Funds go to the application owner.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{credit, debit, require_no_recipient, require_positive_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, PrepareRequest, StateStore};
use kestrel_types::{ChainParams, FeeSchedule, TransactionId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTransferAsset {
    pub dapp_id: TransactionId,
}

impl TransactionKind for InTransferAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::InTransfer
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.in_transfer
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.dapp_id.to_string().as_bytes());
    }

    fn validate(&self, tx: &Transaction, _params: &ChainParams) -> Result<(), TransactionError> {
        require_no_recipient(tx)?;
        require_positive_amount(tx)
    }

    fn prepare(&self, _tx: &Transaction, request: &mut PrepareRequest) {
        request.dapps.push(self.dapp_id);
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
        credit(sender, state, &dapp.owner, tx.amount)
    }

    fn undo(
        &self,
        tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        let dapp = state
            .get_dapp(&self.dapp_id)?
            .ok_or(TransactionError::DappNotFound(self.dapp_id))?;
        debit(sender, state, &dapp.owner, tx.amount)
    }
}
