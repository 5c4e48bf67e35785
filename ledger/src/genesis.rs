//! Genesis block creation.
//!
//! The genesis block is the only block at height 1. It has no predecessor and
//! carries, for each initial delegate, a transfer of starting funds from the
//! genesis account, the delegate's registration and a vote for itself. Every
//! genesis transaction has a zero fee, and the transfers mint rather than
//! debit the genesis account.

use crate::block::{Block, Payload};
use kestrel_crypto::{derive_address, keypair_from_passphrase};
use kestrel_transactions::{Transaction, TransactionBuilder, VoteChange};
use kestrel_types::{BlockId, ChainParams, NetworkId, Signature, Timestamp};

#[derive(Clone, Debug)]
pub struct GenesisDelegate {
    pub username: String,
    pub passphrase: String,
}

#[derive(Clone, Debug)]
pub struct GenesisConfig {
    pub network: NetworkId,
    pub genesis_passphrase: String,
    pub delegates: Vec<GenesisDelegate>,
    pub balance_per_delegate: u64,
    pub timestamp: Timestamp,
}

impl GenesisConfig {
    /// Well-known development genesis: `active_delegates` delegates named
    /// `genesis_<n>` whose passphrases are published, sharing the total supply.
    pub fn dev(params: &ChainParams) -> Self {
        let delegates = (1..=params.active_delegates)
            .map(|n| GenesisDelegate {
                username: format!("genesis_{n}"),
                passphrase: dev_delegate_passphrase(n),
            })
            .collect();
        Self {
            network: params.network,
            genesis_passphrase: format!("kestrel {} genesis account", params.network.as_str()),
            delegates,
            balance_per_delegate: params.total_supply / params.active_delegates.max(1),
            timestamp: Timestamp::EPOCH,
        }
    }
}

/// Published passphrase of development delegate `n` (1-based).
pub fn dev_delegate_passphrase(n: u64) -> String {
    format!("kestrel dev delegate {n}")
}

pub fn create_genesis_block(config: &GenesisConfig, params: &ChainParams) -> Block {
    let genesis = keypair_from_passphrase(&config.genesis_passphrase);
    let mut transactions: Vec<Transaction> = Vec::with_capacity(config.delegates.len() * 3);
    for delegate in &config.delegates {
        let keypair = keypair_from_passphrase(&delegate.passphrase);
        transactions.push(
            TransactionBuilder::transfer(derive_address(&keypair.public), config.balance_per_delegate)
                .timestamp(config.timestamp)
                .fee(0)
                .sign(&genesis, &params.fees),
        );
        transactions.push(
            TransactionBuilder::delegate(delegate.username.clone())
                .timestamp(config.timestamp)
                .fee(0)
                .sign(&keypair, &params.fees),
        );
        transactions.push(
            TransactionBuilder::vote(vec![VoteChange::add(keypair.public)])
                .timestamp(config.timestamp)
                .fee(0)
                .sign(&keypair, &params.fees),
        );
    }

    let payload = Payload::compute(&transactions);
    let mut block = Block {
        id: BlockId(0),
        version: params.block_version,
        height: 1,
        timestamp: config.timestamp,
        previous_block_id: None,
        number_of_transactions: transactions.len() as u32,
        total_amount: payload.total_amount,
        total_fee: payload.total_fee,
        reward: 0,
        payload_length: payload.length,
        payload_hash: payload.hash,
        generator_public_key: genesis.public,
        block_signature: Signature([0u8; 64]),
        transactions,
    };
    block.sign(&genesis);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_transactions::TransactionType;

    fn small_params() -> ChainParams {
        let mut params = ChainParams::default();
        params.active_delegates = 3;
        params
    }

    #[test]
    fn genesis_is_deterministic() {
        let params = small_params();
        let config = GenesisConfig::dev(&params);
        let a = create_genesis_block(&config, &params);
        let b = create_genesis_block(&config, &params);
        assert_eq!(a.id, b.id);
        assert_eq!(a, b);
    }

    #[test]
    fn genesis_funds_registers_and_votes_for_each_delegate() {
        let params = small_params();
        let block = create_genesis_block(&GenesisConfig::dev(&params), &params);
        assert_eq!(block.height, 1);
        assert!(block.previous_block_id.is_none());
        assert!(block.verify_signature());
        assert_eq!(block.transactions.len(), 9);
        let kinds: Vec<_> = block.transactions[..3]
            .iter()
            .map(|tx| tx.transaction_type())
            .collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::Transfer,
                TransactionType::Delegate,
                TransactionType::Vote
            ]
        );
        assert!(block.transactions.iter().all(|tx| tx.fee == 0));
        assert_eq!(block.total_fee, 0);
    }

    #[test]
    fn networks_have_distinct_genesis_blocks() {
        let mut dev = small_params();
        let mut test = small_params();
        dev.network = NetworkId::Dev;
        test.network = NetworkId::Test;
        let a = create_genesis_block(&GenesisConfig::dev(&dev), &dev);
        let b = create_genesis_block(&GenesisConfig::dev(&test), &test);
        assert_ne!(a.id, b.id);
    }
}
