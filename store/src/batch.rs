//! Write batching: a unit of work collected in memory and handed to the
//! backend, which applies every operation or none.

use crate::account::Account;
use crate::block::BlockRecord;
use crate::dapp::DappRecord;
use crate::round::VoteDelta;
use kestrel_types::{BlockId, PublicKey, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    PutAccount(Account),
    AppendBlock {
        record: BlockRecord,
        bytes: Vec<u8>,
        transaction_ids: Vec<TransactionId>,
    },
    DeleteBlock(BlockId),
    AppendVoteDeltas(Vec<VoteDelta>),
    /// Replace every pending delta of `round` with `deltas`.
    ReplaceVoteDeltas {
        round: u64,
        deltas: Vec<VoteDelta>,
    },
    PutRoundArchive {
        height: u64,
        deltas: Vec<VoteDelta>,
    },
    DeleteRoundArchive(u64),
    PutDelegateSnapshot {
        round: u64,
        delegates: Vec<PublicKey>,
    },
    DeleteDelegateSnapshot(u64),
    PutDapp(DappRecord),
    DeleteDapp(TransactionId),
    PutOutTransfer(TransactionId),
    DeleteOutTransfer(TransactionId),
    /// Mark a confirmed transaction as applied without effect.
    PutInertTransaction(TransactionId),
    DeleteInertTransaction(TransactionId),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: BatchOp) {
        self.ops.push(op);
    }

    pub fn put_account(&mut self, account: Account) {
        self.ops.push(BatchOp::PutAccount(account));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}
