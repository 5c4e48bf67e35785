//! Stateless transaction validation.

use crate::error::TransactionError;
use crate::response::TransactionResponse;
use crate::Transaction;
use kestrel_types::ChainParams;
use std::collections::HashSet;

impl Transaction {
    /// Checks that need no account state: id, fee, amount bounds, the
    /// primary signature, and the kind's own asset rules.
    pub fn validate(&self, params: &ChainParams) -> Result<(), TransactionError> {
        let expected = self.compute_id();
        if expected != self.id {
            return Err(TransactionError::InvalidId {
                expected,
                actual: self.id,
            });
        }

        let kind = self.asset.kind();
        let fee = kind.fee(&params.fees);
        if fee != self.fee {
            return Err(TransactionError::InvalidFee {
                expected: fee,
                actual: self.fee,
            });
        }

        match self.total_spend() {
            Some(spend) if spend <= params.total_supply => {}
            _ => {
                return Err(TransactionError::InvalidAmount(
                    "amount plus fee exceeds total supply".into(),
                ))
            }
        }

        if !self.verify_signature(self.signer_public_key()) {
            return Err(TransactionError::InvalidSignature);
        }

        let mut seen = HashSet::new();
        if !self.signatures.iter().all(|signature| seen.insert(signature)) {
            return Err(TransactionError::InvalidMultisignature(
                "duplicate co-signature".into(),
            ));
        }

        kind.validate(self, params)
    }

    pub fn validate_response(&self, params: &ChainParams) -> TransactionResponse {
        match self.validate(params) {
            Ok(()) => TransactionResponse::ok(self.id),
            Err(err) => TransactionResponse::fail(self.id, err),
        }
    }
}
