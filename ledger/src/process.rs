//! The transaction engine: validate, apply, undo and dry-run batches.
//!
//! Apply and undo run strictly in order against one [`StateStore`], which
//! the caller commits or drops as a unit. Verification runs against a
//! read-only store and restores a snapshot after every transaction, so it
//! never leaves a trace.

use crate::error::LedgerError;
use crate::round_information::record_vote_deltas;
use kestrel_store::{PrepareRequest, StateStore, Storage};
use kestrel_transactions::{ApplyEnv, Transaction, TransactionError, TransactionResponse};
use kestrel_types::{ChainParams, NetworkExceptions, Signature, Timestamp};
use rayon::prelude::*;
use tracing::{debug, warn};

/// Where in the chain a batch is applied or undone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyContext {
    pub height: u64,
    pub genesis: bool,
}

impl ApplyContext {
    pub fn block(height: u64) -> Self {
        Self {
            height,
            genesis: false,
        }
    }

    pub fn genesis() -> Self {
        Self {
            height: 1,
            genesis: true,
        }
    }
}

/// Inputs for a dry run.
#[derive(Clone, Copy, Debug)]
pub struct VerifyContext<'a> {
    /// Height the transactions would be confirmed at.
    pub height: u64,
    pub now: Timestamp,
    /// Already admitted transactions applied ahead of the batch, so that
    /// spending is checked cumulatively.
    pub pooled: &'a [Transaction],
}

/// A co-signature attached to a pooled transaction.
#[derive(Clone, Debug)]
pub struct SignatureOutcome {
    pub transaction: Transaction,
    /// Whether the transaction now carries every co-signature it needs.
    pub ready: bool,
}

pub struct ProcessTransactions {
    params: ChainParams,
    exceptions: NetworkExceptions,
}

impl ProcessTransactions {
    pub fn new(params: ChainParams, exceptions: NetworkExceptions) -> Self {
        Self { params, exceptions }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn exceptions(&self) -> &NetworkExceptions {
        &self.exceptions
    }

    /// Historically confirmed transactions that break today's rules are
    /// accepted as they were.
    fn with_exception(&self, response: TransactionResponse) -> TransactionResponse {
        if !response.is_ok() && self.exceptions.is_transaction_exempt(&response.id) {
            debug!(transaction_id = %response.id, reason = %response.reason(), "applying transaction exception");
            return TransactionResponse::ok(response.id);
        }
        response
    }

    fn env(&self, ctx: &ApplyContext) -> ApplyEnv<'_> {
        ApplyEnv {
            params: &self.params,
            height: ctx.height,
            genesis: ctx.genesis,
        }
    }

    fn prepare<'t>(
        state: &mut StateStore<'_>,
        txs: impl Iterator<Item = &'t Transaction>,
    ) -> Result<(), LedgerError> {
        let mut request = PrepareRequest::default();
        for tx in txs {
            request.extend(tx.prepare_request());
        }
        state.prepare(&request)?;
        Ok(())
    }

    /// Stateless checks, run in parallel. Response order matches `txs`.
    pub fn validate_transactions(&self, txs: &[Transaction]) -> Vec<TransactionResponse> {
        txs.par_iter()
            .map(|tx| self.with_exception(tx.validate_response(&self.params)))
            .collect()
    }

    /// Fail every transaction whose id is already confirmed.
    pub fn check_persisted_transactions(
        &self,
        storage: &dyn Storage,
        txs: &[Transaction],
    ) -> Result<Vec<TransactionResponse>, LedgerError> {
        txs.iter()
            .map(|tx| -> Result<TransactionResponse, LedgerError> {
                Ok(if storage.transaction_exists(&tx.id)? {
                    TransactionResponse::fail(tx.id, TransactionError::AlreadyConfirmed(tx.id))
                } else {
                    TransactionResponse::ok(tx.id)
                })
            })
            .collect()
    }

    /// Apply `txs` in order against a fresh mutating store.
    pub fn apply_transactions<'a>(
        &self,
        storage: &'a dyn Storage,
        txs: &[Transaction],
        ctx: &ApplyContext,
    ) -> Result<(Vec<TransactionResponse>, StateStore<'a>), LedgerError> {
        let mut state = StateStore::mutating(storage);
        let responses = self.apply_transactions_in(&mut state, txs, ctx)?;
        Ok((responses, state))
    }

    /// Apply `txs` in order against `state`. A failed transaction leaves no
    /// changes and does not stop the batch.
    pub fn apply_transactions_in(
        &self,
        state: &mut StateStore<'_>,
        txs: &[Transaction],
        ctx: &ApplyContext,
    ) -> Result<Vec<TransactionResponse>, LedgerError> {
        Self::prepare(state, txs.iter())?;
        let env = self.env(ctx);
        let round = self.params.calc_round(ctx.height);
        let mut responses = Vec::with_capacity(txs.len());
        for tx in txs {
            let mark = state.journal_position();
            let applied = tx.apply(state, &env);
            let failed = !applied.is_ok();
            let response = self.with_exception(applied);
            if response.is_ok() && failed {
                // Rolled back by `apply`; undo must not reverse it.
                state.set_inert_transaction(tx.id, true);
            }
            if response.is_ok() {
                record_vote_deltas(state, mark, round)?;
                state.add_transaction(tx.id);
            } else {
                debug!(transaction_id = %tx.id, reason = %response.reason(), "transaction not applied");
            }
            responses.push(response);
        }
        Ok(responses)
    }

    /// Undo `txs` (given in block order) in reverse against a fresh mutating store.
    pub fn undo_transactions<'a>(
        &self,
        storage: &'a dyn Storage,
        txs: &[Transaction],
        ctx: &ApplyContext,
    ) -> Result<(Vec<TransactionResponse>, StateStore<'a>), LedgerError> {
        let mut state = StateStore::mutating(storage);
        let responses = self.undo_transactions_in(&mut state, txs, ctx)?;
        Ok((responses, state))
    }

    /// Undo `txs` (given in block order) in reverse against `state`.
    /// Responses come back in undo order.
    pub fn undo_transactions_in(
        &self,
        state: &mut StateStore<'_>,
        txs: &[Transaction],
        ctx: &ApplyContext,
    ) -> Result<Vec<TransactionResponse>, LedgerError> {
        Self::prepare(state, txs.iter())?;
        let env = self.env(ctx);
        let round = self.params.calc_round(ctx.height);
        let mut responses = Vec::with_capacity(txs.len());
        for tx in txs.iter().rev() {
            if state.is_inert_transaction(&tx.id)? {
                state.set_inert_transaction(tx.id, false);
                state.remove_transaction(&tx.id);
                responses.push(TransactionResponse::ok(tx.id));
                continue;
            }
            let mark = state.journal_position();
            match tx.undo(state, &env) {
                Ok(()) => {
                    record_vote_deltas(state, mark, round)?;
                    state.remove_transaction(&tx.id);
                    responses.push(TransactionResponse::ok(tx.id));
                }
                Err(err) => {
                    warn!(transaction_id = %tx.id, error = %err, "transaction undo failed");
                    responses.push(TransactionResponse::fail(tx.id, err));
                }
            }
        }
        Ok(responses)
    }

    /// Dry-run `txs` on a read-only store: each is applied and immediately
    /// rolled back, on top of the already pooled transactions.
    pub fn verify_transactions(
        &self,
        storage: &dyn Storage,
        txs: &[Transaction],
        ctx: &VerifyContext<'_>,
    ) -> Result<Vec<TransactionResponse>, LedgerError> {
        let mut state = StateStore::read_only(storage);
        Self::prepare(&mut state, ctx.pooled.iter().chain(txs.iter()))?;
        let env = ApplyEnv::new(&self.params, ctx.height);

        for pooled in ctx.pooled {
            let response = pooled.apply(&mut state, &env);
            if !response.is_ok() {
                debug!(transaction_id = %pooled.id, reason = %response.reason(), "pooled transaction no longer applies");
            }
        }

        let now_slot = self.params.slot_number(ctx.now);
        let mut responses = Vec::with_capacity(txs.len());
        for tx in txs {
            if self.params.slot_number(tx.timestamp) > now_slot {
                responses.push(TransactionResponse::fail(
                    tx.id,
                    TransactionError::TimestampInFuture,
                ));
                continue;
            }
            state.create_snapshot();
            let response = tx.apply(&mut state, &env);
            state.restore_snapshot()?;
            responses.push(self.with_exception(response));
        }
        Ok(responses)
    }

    /// Attach a co-signature to `tx` and report whether it is now ready.
    pub fn process_signature(
        &self,
        storage: &dyn Storage,
        tx: &Transaction,
        signature: Signature,
    ) -> Result<SignatureOutcome, LedgerError> {
        let mut state = StateStore::read_only(storage);
        state.prepare(&tx.prepare_request())?;
        let sender = state.get_account(&tx.sender_address())?;
        if !tx.accepts_cosignature(&sender, &signature) {
            return Err(LedgerError::Transaction {
                id: tx.id,
                source: TransactionError::InvalidMultisignature(
                    "signature is not a fresh co-signature from a group member".into(),
                ),
            });
        }
        let mut transaction = tx.clone();
        transaction.signatures.push(signature);
        let ready = transaction.is_ready(&sender);
        Ok(SignatureOutcome { transaction, ready })
    }
}
