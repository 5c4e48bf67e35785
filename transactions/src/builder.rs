//! Construction of signed transactions.

use crate::{
    DappAsset, DelegateAsset, InTransferAsset, MultisignatureAsset, OutTransferAsset,
    SecondSignatureAsset, Transaction, TransactionAsset, TransferAsset, VoteAsset, VoteChange,
};
use kestrel_crypto::derive_address;
use kestrel_types::{Address, FeeSchedule, KeyPair, PublicKey, Signature, Timestamp, TransactionId};

#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    asset: TransactionAsset,
    timestamp: Timestamp,
    recipient_id: Option<Address>,
    amount: u64,
    fee: Option<u64>,
    recipient_is_sender: bool,
}

impl TransactionBuilder {
    fn new(asset: TransactionAsset) -> Self {
        Self {
            asset,
            timestamp: Timestamp::EPOCH,
            recipient_id: None,
            amount: 0,
            fee: None,
            recipient_is_sender: false,
        }
    }

    pub fn transfer(recipient: Address, amount: u64) -> Self {
        let mut builder = Self::new(TransactionAsset::Transfer(TransferAsset::default()));
        builder.recipient_id = Some(recipient);
        builder.amount = amount;
        builder
    }

    pub fn transfer_with_data(recipient: Address, amount: u64, data: impl Into<String>) -> Self {
        let mut builder = Self::transfer(recipient, amount);
        builder.asset = TransactionAsset::Transfer(TransferAsset {
            data: Some(data.into()),
        });
        builder
    }

    pub fn second_signature(public_key: PublicKey) -> Self {
        Self::new(TransactionAsset::SecondSignature(SecondSignatureAsset { public_key }))
    }

    pub fn delegate(username: impl Into<String>) -> Self {
        Self::new(TransactionAsset::Delegate(DelegateAsset {
            username: username.into(),
        }))
    }

    /// Votes are addressed to the voter.
    pub fn vote(votes: Vec<VoteChange>) -> Self {
        let mut builder = Self::new(TransactionAsset::Vote(VoteAsset { votes }));
        builder.recipient_is_sender = true;
        builder
    }

    pub fn multisignature(min: u8, lifetime: u8, keysgroup: Vec<PublicKey>) -> Self {
        Self::new(TransactionAsset::Multisignature(MultisignatureAsset {
            min,
            lifetime,
            keysgroup,
        }))
    }

    pub fn dapp(asset: DappAsset) -> Self {
        Self::new(TransactionAsset::Dapp(asset))
    }

    pub fn in_transfer(dapp_id: TransactionId, amount: u64) -> Self {
        let mut builder = Self::new(TransactionAsset::InTransfer(InTransferAsset { dapp_id }));
        builder.amount = amount;
        builder
    }

    pub fn out_transfer(
        dapp_id: TransactionId,
        transaction_id: TransactionId,
        recipient: Address,
        amount: u64,
    ) -> Self {
        let mut builder = Self::new(TransactionAsset::OutTransfer(OutTransferAsset {
            dapp_id,
            transaction_id,
        }));
        builder.recipient_id = Some(recipient);
        builder.amount = amount;
        builder
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Override the scheduled fee (genesis transactions carry none).
    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    fn unsigned(self, sender: PublicKey, requester: Option<PublicKey>, fees: &FeeSchedule) -> Transaction {
        let fee = self.fee.unwrap_or_else(|| self.asset.kind().fee(fees));
        let recipient_id = if self.recipient_is_sender {
            Some(derive_address(&sender))
        } else {
            self.recipient_id
        };
        Transaction {
            id: TransactionId(0),
            timestamp: self.timestamp,
            sender_public_key: sender,
            requester_public_key: requester,
            recipient_id,
            amount: self.amount,
            fee,
            asset: self.asset,
            signature: Signature([0u8; 64]),
            sign_signature: None,
            signatures: Vec::new(),
        }
    }

    pub fn sign(self, sender: &KeyPair, fees: &FeeSchedule) -> Transaction {
        let mut tx = self.unsigned(sender.public, None, fees);
        tx.sign(sender);
        tx
    }

    pub fn sign_with_second(self, sender: &KeyPair, second: &KeyPair, fees: &FeeSchedule) -> Transaction {
        let mut tx = self.unsigned(sender.public, None, fees);
        tx.sign(sender);
        tx.second_sign(second);
        tx
    }

    /// Sign as a multisignature group member on behalf of `sender`.
    pub fn sign_as_requester(
        self,
        sender: PublicKey,
        requester: &KeyPair,
        fees: &FeeSchedule,
    ) -> Transaction {
        let mut tx = self.unsigned(sender, Some(requester.public), fees);
        tx.sign(requester);
        tx
    }
}
