//! Registered applications and processed out-transfers.

use crate::StoreError;
use kestrel_types::{Address, TransactionId};
use serde::{Deserialize, Serialize};

/// An application registered by a dapp transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappRecord {
    /// Id of the registering transaction.
    pub transaction_id: TransactionId,
    pub owner: Address,
    pub name: String,
    pub link: String,
}

pub trait DappStore {
    fn get_dapp(&self, id: &TransactionId) -> Result<Option<DappRecord>, StoreError>;

    fn dapp_by_name(&self, name: &str) -> Result<Option<DappRecord>, StoreError>;

    fn dapp_by_link(&self, link: &str) -> Result<Option<DappRecord>, StoreError>;

    /// Whether an out-transfer for the given source transaction was already confirmed.
    fn out_transfer_exists(&self, source: &TransactionId) -> Result<bool, StoreError>;
}
