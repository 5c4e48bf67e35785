//! Block model: canonical encoding, id, signature and payload.
//!
//! Header layout (little-endian unless noted):
//!
//! | field               | size |
//! |---------------------|------|
//! | version             | 4    |
//! | timestamp           | 4    |
//! | previous block id   | 8 (big-endian, zeros for genesis) |
//! | transaction count   | 4    |
//! | total amount        | 8    |
//! | total fee           | 8    |
//! | reward              | 8    |
//! | payload length      | 4    |
//! | payload hash        | 32   |
//! | generator key       | 32   |
//! | signature           | 64 (omitted when signing) |
//!
//! Height is not encoded; it follows from the previous block.

use crate::error::LedgerError;
use kestrel_crypto::{id_from_digest, sha256, sign_message, verify_signature};
use kestrel_store::{BlockRecord, BlockStore, StoredBlock};
use kestrel_transactions::{Transaction, TransactionType};
use kestrel_types::{BlockId, KeyPair, PublicKey, Signature, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub version: u32,
    pub height: u64,
    pub timestamp: Timestamp,
    pub previous_block_id: Option<BlockId>,
    pub number_of_transactions: u32,
    pub total_amount: u64,
    pub total_fee: u64,
    pub reward: u64,
    pub payload_length: u32,
    pub payload_hash: [u8; 32],
    pub generator_public_key: PublicKey,
    pub block_signature: Signature,
    pub transactions: Vec<Transaction>,
}

/// Totals derived from a block's transactions, in block order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub hash: [u8; 32],
    pub length: u32,
    pub total_amount: u64,
    pub total_fee: u64,
}

impl Payload {
    pub fn compute(transactions: &[Transaction]) -> Payload {
        let mut hasher = Sha256::new();
        let mut length = 0usize;
        let mut total_amount = 0u64;
        let mut total_fee = 0u64;
        for tx in transactions {
            let bytes = tx.to_bytes(false, false);
            length += bytes.len();
            hasher.update(&bytes);
            total_amount = total_amount.saturating_add(tx.amount);
            total_fee = total_fee.saturating_add(tx.fee);
        }
        Payload {
            hash: hasher.finalize().into(),
            length: u32::try_from(length).unwrap_or(u32::MAX),
            total_amount,
            total_fee,
        }
    }
}

/// Inputs for assembling a new block on top of `previous`.
pub struct BlockTemplate<'a> {
    pub keypair: &'a KeyPair,
    pub timestamp: Timestamp,
    pub previous: &'a Block,
    pub transactions: Vec<Transaction>,
    pub reward: u64,
}

impl Block {
    /// Assemble and sign a block. Transactions are kept in the given order.
    pub fn create(template: BlockTemplate<'_>) -> Block {
        let payload = Payload::compute(&template.transactions);
        let mut block = Block {
            id: BlockId(0),
            version: 0,
            height: template.previous.height + 1,
            timestamp: template.timestamp,
            previous_block_id: Some(template.previous.id),
            number_of_transactions: template.transactions.len() as u32,
            total_amount: payload.total_amount,
            total_fee: payload.total_fee,
            reward: template.reward,
            payload_length: payload.length,
            payload_hash: payload.hash,
            generator_public_key: template.keypair.public,
            block_signature: Signature([0u8; 64]),
            transactions: template.transactions,
        };
        block.sign(template.keypair);
        block
    }

    pub fn to_bytes(&self, skip_signature: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(180);
        out.extend_from_slice(&(self.version as i32).to_le_bytes());
        out.extend_from_slice(&(self.timestamp.as_secs() as i32).to_le_bytes());
        match self.previous_block_id {
            Some(previous) => out.extend_from_slice(&previous.to_be_bytes()),
            None => out.extend_from_slice(&[0u8; 8]),
        }
        out.extend_from_slice(&(self.number_of_transactions as i32).to_le_bytes());
        out.extend_from_slice(&(self.total_amount as i64).to_le_bytes());
        out.extend_from_slice(&(self.total_fee as i64).to_le_bytes());
        out.extend_from_slice(&(self.reward as i64).to_le_bytes());
        out.extend_from_slice(&(self.payload_length as i32).to_le_bytes());
        out.extend_from_slice(&self.payload_hash);
        out.extend_from_slice(self.generator_public_key.as_bytes());
        if !skip_signature {
            out.extend_from_slice(self.block_signature.as_bytes());
        }
        out
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        sha256(&self.to_bytes(true))
    }

    pub fn compute_id(&self) -> BlockId {
        BlockId(id_from_digest(&sha256(&self.to_bytes(false))))
    }

    /// Sign with the generator key and refresh the id.
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.block_signature = sign_message(&self.signing_hash(), &keypair.private);
        self.id = self.compute_id();
    }

    pub fn verify_signature(&self) -> bool {
        verify_signature(
            &self.signing_hash(),
            &self.block_signature,
            &self.generator_public_key,
        )
    }

    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.transactions.iter().map(|tx| tx.id).collect()
    }

    pub fn to_record(&self) -> BlockRecord {
        BlockRecord {
            id: self.id,
            height: self.height,
            previous_block_id: self.previous_block_id,
            timestamp: self.timestamp,
            generator_public_key: self.generator_public_key,
            number_of_transactions: self.number_of_transactions,
            total_amount: self.total_amount,
            total_fee: self.total_fee,
            reward: self.reward,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(self).map_err(|e| LedgerError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Block, LedgerError> {
        bincode::deserialize(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
    }

    pub fn from_stored(stored: &StoredBlock) -> Result<Block, LedgerError> {
        let block = Self::decode(&stored.bytes)?;
        if block.id != stored.record.id {
            return Err(LedgerError::Codec(format!(
                "stored block {} decodes to id {}",
                stored.record.id, block.id
            )));
        }
        Ok(block)
    }
}

/// Order candidate transactions for a new block: by type, with multisignature
/// registrations last, then by amount.
pub fn sort_transactions(transactions: &mut [Transaction]) {
    transactions.sort_by_key(|tx| {
        let ty = tx.transaction_type();
        let rank = if ty == TransactionType::Multisignature {
            u8::MAX
        } else {
            ty.code()
        };
        (rank, tx.amount)
    });
}

// ── Loading ─────────────────────────────────────────────────────────────

pub fn load_block<S: BlockStore + ?Sized>(store: &S, id: &BlockId) -> Result<Option<Block>, LedgerError> {
    store
        .get_block(id)?
        .as_ref()
        .map(Block::from_stored)
        .transpose()
}

pub fn load_block_at_height<S: BlockStore + ?Sized>(
    store: &S,
    height: u64,
) -> Result<Option<Block>, LedgerError> {
    match store.block_at_height(height)? {
        Some(record) => load_block(store, &record.id),
        None => Ok(None),
    }
}

pub fn load_last_block<S: BlockStore + ?Sized>(store: &S) -> Result<Option<Block>, LedgerError> {
    match store.last_block()? {
        Some(record) => load_block(store, &record.id),
        None => Ok(None),
    }
}

/// Up to `limit` blocks starting at height `offset`.
pub fn load_blocks_range<S: BlockStore + ?Sized>(
    store: &S,
    offset: u64,
    limit: usize,
) -> Result<Vec<Block>, LedgerError> {
    store
        .get_blocks_range(offset, limit)?
        .iter()
        .map(Block::from_stored)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_crypto::keypair_from_passphrase;
    use kestrel_transactions::{TransactionBuilder, VoteChange};
    use kestrel_types::{Address, FeeSchedule};

    fn parent() -> Block {
        let keypair = keypair_from_passphrase("parent");
        let mut block = Block {
            id: BlockId(0),
            version: 0,
            height: 1,
            timestamp: Timestamp::EPOCH,
            previous_block_id: None,
            number_of_transactions: 0,
            total_amount: 0,
            total_fee: 0,
            reward: 0,
            payload_length: 0,
            payload_hash: Payload::compute(&[]).hash,
            generator_public_key: keypair.public,
            block_signature: Signature([0u8; 64]),
            transactions: Vec::new(),
        };
        block.sign(&keypair);
        block
    }

    #[test]
    fn header_bytes_have_fixed_length() {
        let block = parent();
        assert_eq!(block.to_bytes(false).len(), 4 + 4 + 8 + 4 + 8 + 8 + 8 + 4 + 32 + 32 + 64);
        assert_eq!(block.to_bytes(true).len(), 4 + 4 + 8 + 4 + 8 + 8 + 8 + 4 + 32 + 32);
    }

    #[test]
    fn created_block_is_signed_and_linked() {
        let previous = parent();
        let forger = keypair_from_passphrase("forger");
        let sender = keypair_from_passphrase("sender");
        let tx = TransactionBuilder::transfer(Address(3), 50).sign(&sender, &FeeSchedule::default());
        let block = Block::create(BlockTemplate {
            keypair: &forger,
            timestamp: Timestamp::new(10),
            previous: &previous,
            transactions: vec![tx.clone()],
            reward: 0,
        });
        assert_eq!(block.height, 2);
        assert_eq!(block.previous_block_id, Some(previous.id));
        assert_eq!(block.total_amount, 50);
        assert_eq!(block.total_fee, tx.fee);
        assert_eq!(block.payload_length as usize, tx.to_bytes(false, false).len());
        assert!(block.verify_signature());
        assert_eq!(block.id, block.compute_id());
    }

    #[test]
    fn tampering_breaks_the_signature() {
        let mut block = parent();
        block.reward = 1;
        assert!(!block.verify_signature());
    }

    #[test]
    fn payload_hash_depends_on_order() {
        let sender = keypair_from_passphrase("sender");
        let a = TransactionBuilder::transfer(Address(1), 1).sign(&sender, &FeeSchedule::default());
        let b = TransactionBuilder::transfer(Address(2), 2).sign(&sender, &FeeSchedule::default());
        let forward = Payload::compute(&[a.clone(), b.clone()]);
        let backward = Payload::compute(&[b, a]);
        assert_ne!(forward.hash, backward.hash);
        assert_eq!(forward.total_amount, backward.total_amount);
    }

    #[test]
    fn multisignature_registrations_sort_last() {
        let fees = FeeSchedule::default();
        let sender = keypair_from_passphrase("sender");
        let member = keypair_from_passphrase("member");
        let mut txs = vec![
            TransactionBuilder::multisignature(1, 1, vec![member.public]).sign(&sender, &fees),
            TransactionBuilder::vote(vec![VoteChange::add(member.public)]).sign(&sender, &fees),
            TransactionBuilder::transfer(Address(1), 9).sign(&sender, &fees),
            TransactionBuilder::transfer(Address(1), 3).sign(&sender, &fees),
        ];
        sort_transactions(&mut txs);
        let order: Vec<_> = txs.iter().map(|tx| (tx.transaction_type(), tx.amount)).collect();
        assert_eq!(
            order,
            vec![
                (TransactionType::Transfer, 3),
                (TransactionType::Transfer, 9),
                (TransactionType::Vote, 0),
                (TransactionType::Multisignature, 0),
            ]
        );
    }

    #[test]
    fn bincode_roundtrip_preserves_id() {
        let block = parent();
        let decoded = Block::decode(&block.encode().unwrap()).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.compute_id(), block.id);
    }
}
