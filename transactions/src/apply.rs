//! Stateful application and reversal of transactions.

use crate::error::TransactionError;
use crate::kind::{add_balance, sub_balance};
use crate::response::{Status, TransactionResponse};
use crate::{Transaction, TransactionAsset};
use kestrel_store::{Account, PrepareRequest, StateStore};
use kestrel_types::{ChainParams, PublicKey, Signature};

/// Context a transaction is applied in.
#[derive(Clone, Copy, Debug)]
pub struct ApplyEnv<'p> {
    pub params: &'p ChainParams,
    /// Height of the block carrying the transaction (the next height for
    /// unconfirmed transactions).
    pub height: u64,
    /// Genesis transactions mint instead of debiting their sender.
    pub genesis: bool,
}

impl<'p> ApplyEnv<'p> {
    pub fn new(params: &'p ChainParams, height: u64) -> Self {
        Self {
            params,
            height,
            genesis: false,
        }
    }

    pub fn genesis(params: &'p ChainParams) -> Self {
        Self {
            params,
            height: 1,
            genesis: true,
        }
    }
}

impl Transaction {
    /// Everything `apply` and `undo` will read from storage.
    pub fn prepare_request(&self) -> PrepareRequest {
        let mut request = PrepareRequest::default();
        request.addresses.push(self.sender_address());
        self.asset.kind().prepare(self, &mut request);
        request
    }

    /// Co-signatures needed before the transaction is ready.
    ///
    /// A registration needs one from every member of the new group; a
    /// transaction from a multisignature account needs `multimin`, less the
    /// requester's own signature when a member initiated it.
    pub fn signatures_required(&self, sender: &Account) -> usize {
        if sender.is_multisignature() {
            let min = usize::from(sender.multimin);
            return if self.requester_public_key.is_some() {
                min.saturating_sub(1)
            } else {
                min
            };
        }
        match &self.asset {
            TransactionAsset::Multisignature(asset) => asset.keysgroup.len(),
            _ => 0,
        }
    }

    pub fn is_ready(&self, sender: &Account) -> bool {
        self.signatures.len() >= self.signatures_required(sender)
    }

    fn signature_group(&self, sender: &Account) -> Vec<PublicKey> {
        if sender.is_multisignature() {
            let mut group = sender.multisignatures.clone();
            if self.requester_public_key.is_some() {
                group.push(self.sender_public_key);
            }
            return group;
        }
        match &self.asset {
            TransactionAsset::Multisignature(asset) => asset.keysgroup.clone(),
            _ => Vec::new(),
        }
    }

    /// Check the signatures that depend on account state and return how
    /// many co-signatures are still missing.
    pub fn verify_account_signatures(&self, sender: &Account) -> Result<usize, TransactionError> {
        if let Some(requester) = &self.requester_public_key {
            if !sender.multisignatures.contains(requester) {
                return Err(TransactionError::InvalidMultisignature(format!(
                    "requester {requester} is not a member of the sender's group"
                )));
            }
        }

        if sender.second_signature && self.requester_public_key.is_none() {
            let second = sender
                .second_public_key
                .ok_or(TransactionError::MissingSecondSignature)?;
            if self.sign_signature.is_none() {
                return Err(TransactionError::MissingSecondSignature);
            }
            if !self.verify_second_signature(&second) {
                return Err(TransactionError::InvalidSecondSignature);
            }
        } else if self.sign_signature.is_some() && !sender.second_signature {
            return Err(TransactionError::UnexpectedSecondSignature);
        }

        let group = self.signature_group(sender);
        if group.is_empty() && !self.signatures.is_empty() {
            return Err(TransactionError::InvalidMultisignature(
                "sender is not a multisignature account".into(),
            ));
        }
        self.match_cosignatures(&group)?;
        Ok(self
            .signatures_required(sender)
            .saturating_sub(self.signatures.len()))
    }

    /// Every co-signature must verify against a distinct group member.
    fn match_cosignatures(&self, group: &[PublicKey]) -> Result<(), TransactionError> {
        let mut used = vec![false; group.len()];
        for signature in &self.signatures {
            let slot = group
                .iter()
                .enumerate()
                .find(|(i, key)| !used[*i] && self.verify_cosignature(signature, key))
                .map(|(i, _)| i);
            match slot {
                Some(i) => used[i] = true,
                None => {
                    return Err(TransactionError::InvalidMultisignature(format!(
                        "signature {signature:?} does not match an unused group member"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Whether `signature` is a valid, not yet collected co-signature from a
    /// member of `sender`'s group (or of the group being registered).
    pub fn accepts_cosignature(&self, sender: &Account, signature: &Signature) -> bool {
        if self.signatures.contains(signature) {
            return false;
        }
        let group = self.signature_group(sender);
        let mut signatures = self.signatures.clone();
        signatures.push(*signature);
        let candidate = Transaction {
            signatures,
            ..self.clone()
        };
        candidate.match_cosignatures(&group).is_ok()
    }

    /// Apply against `state`. Only a fully signed, successful application
    /// leaves changes behind; anything else is rolled back.
    pub fn apply(&self, state: &mut StateStore<'_>, env: &ApplyEnv<'_>) -> TransactionResponse {
        state.create_snapshot();
        let result = self.apply_in_place(state, env);
        let settled = match &result {
            Ok(Status::Ok) => state.release_snapshot(),
            _ => state.restore_snapshot(),
        };
        let result = match settled {
            Ok(()) => result,
            Err(err) => Err(err.into()),
        };
        TransactionResponse::from_result(self.id, result)
    }

    fn apply_in_place(
        &self,
        state: &mut StateStore<'_>,
        env: &ApplyEnv<'_>,
    ) -> Result<Status, TransactionError> {
        let mut sender = state.get_account(&self.sender_address())?;
        if let Some(expected) = sender.public_key {
            if expected != self.sender_public_key {
                return Err(TransactionError::SenderPublicKeyMismatch {
                    expected,
                    actual: self.sender_public_key,
                });
            }
        }
        let missing = self.verify_account_signatures(&sender)?;
        sender.public_key = Some(self.sender_public_key);

        if !env.genesis {
            let spend = self
                .total_spend()
                .ok_or_else(|| TransactionError::InvalidAmount("amount plus fee overflows".into()))?;
            let available = sender.balance.min(sender.u_balance);
            if available < spend {
                return Err(TransactionError::InsufficientBalance {
                    address: sender.address,
                    needed: spend,
                    available,
                });
            }
            sub_balance(&mut sender, spend)?;
        }

        self.asset.kind().apply(self, &mut sender, state, env)?;
        state.set_account(sender);
        Ok(if missing > 0 {
            Status::Pending
        } else {
            Status::Ok
        })
    }

    /// Reverse a successful [`Transaction::apply`].
    pub fn undo(&self, state: &mut StateStore<'_>, env: &ApplyEnv<'_>) -> Result<(), TransactionError> {
        let mut sender = state.get_account(&self.sender_address())?;
        self.asset.kind().undo(self, &mut sender, state, env)?;
        if !env.genesis {
            let spend = self
                .total_spend()
                .ok_or_else(|| TransactionError::InvalidAmount("amount plus fee overflows".into()))?;
            add_balance(&mut sender, spend)?;
        }
        state.set_account(sender);
        Ok(())
    }
}
