use kestrel_ledger::LedgerError;
use kestrel_store::StoreError;
use kestrel_transactions::TransactionError;
use kestrel_types::TransactionId;
use thiserror::Error;

use crate::queue::QueueKind;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("transaction {0} is already in the pool")]
    Duplicate(TransactionId),

    #[error("transaction {0} is already confirmed")]
    AlreadyConfirmed(TransactionId),

    #[error("{queue} queue is full ({limit} transactions)")]
    QueueFull { queue: QueueKind, limit: usize },

    #[error("transaction {0} is not in the pool")]
    NotFound(TransactionId),

    #[error("transaction {id} rejected: {}", format_errors(.errors))]
    Rejected {
        id: TransactionId,
        errors: Vec<TransactionError>,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

fn format_errors(errors: &[TransactionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
