//! Per-transaction processing outcome.

use crate::error::TransactionError;
use kestrel_types::TransactionId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Fail,
    /// Valid so far, but still missing multisignature co-signatures.
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub status: Status,
    pub errors: Vec<TransactionError>,
}

impl TransactionResponse {
    pub fn ok(id: TransactionId) -> Self {
        Self {
            id,
            status: Status::Ok,
            errors: Vec::new(),
        }
    }

    pub fn pending(id: TransactionId) -> Self {
        Self {
            id,
            status: Status::Pending,
            errors: Vec::new(),
        }
    }

    pub fn fail(id: TransactionId, error: TransactionError) -> Self {
        Self {
            id,
            status: Status::Fail,
            errors: vec![error],
        }
    }

    pub fn from_result(id: TransactionId, result: Result<Status, TransactionError>) -> Self {
        match result {
            Ok(Status::Ok) => Self::ok(id),
            Ok(Status::Pending) => Self::pending(id),
            Ok(Status::Fail) => Self {
                id,
                status: Status::Fail,
                errors: Vec::new(),
            },
            Err(error) => Self::fail(id, error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// First error message, for logs and event payloads.
    pub fn reason(&self) -> String {
        self.errors
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("{:?}", self.status))
    }
}
