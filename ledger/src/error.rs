use kestrel_store::StoreError;
use kestrel_transactions::TransactionError;
use kestrel_types::TransactionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction {id} rejected: {source}")]
    Transaction {
        id: TransactionId,
        source: TransactionError,
    },

    #[error("transaction {0} is not in the pool")]
    UnknownTransaction(TransactionId),

    #[error("block codec error: {0}")]
    Codec(String),

    #[error("invalid genesis block: {0}")]
    Genesis(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
