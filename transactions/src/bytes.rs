//! Canonical byte encoding, signing hashes and id derivation.
//!
//! Layout (little-endian unless noted):
//!
//! | field            | size | notes                              |
//! |------------------|------|------------------------------------|
//! | type             | 1    |                                    |
//! | timestamp        | 4    | signed                             |
//! | sender key       | 32   |                                    |
//! | requester key    | 32   | only when present                  |
//! | recipient        | 8    | big-endian, zeros when absent      |
//! | amount           | 8    | signed                             |
//! | asset            | var  | kind-specific                      |
//! | signature        | 64   | omitted when signing               |
//! | second signature | 64   | omitted when signing or absent     |
//!
//! Multisignature co-signatures are never encoded.

use crate::Transaction;
use kestrel_crypto::{id_from_digest, sha256, sign_message, verify_signature};
use kestrel_types::{KeyPair, PublicKey, Signature, TransactionId};

impl Transaction {
    /// Encode the transaction, optionally leaving out the signatures.
    pub fn to_bytes(&self, skip_signature: bool, skip_second_signature: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.push(self.transaction_type().code());
        out.extend_from_slice(&(self.timestamp.as_secs() as i32).to_le_bytes());
        out.extend_from_slice(self.sender_public_key.as_bytes());
        if let Some(requester) = &self.requester_public_key {
            out.extend_from_slice(requester.as_bytes());
        }
        match self.recipient_id {
            Some(recipient) => out.extend_from_slice(&recipient.to_be_bytes()),
            None => out.extend_from_slice(&[0u8; 8]),
        }
        out.extend_from_slice(&(self.amount as i64).to_le_bytes());
        self.asset.kind().write_asset_bytes(&mut out);
        if !skip_signature {
            out.extend_from_slice(self.signature.as_bytes());
        }
        if !skip_second_signature {
            if let Some(sign_signature) = &self.sign_signature {
                out.extend_from_slice(sign_signature.as_bytes());
            }
        }
        out
    }

    /// Digest signed by the sender (and by multisignature co-signers).
    pub fn signing_hash(&self) -> [u8; 32] {
        sha256(&self.to_bytes(true, true))
    }

    /// Digest signed with the second key: covers the first signature.
    pub fn second_signing_hash(&self) -> [u8; 32] {
        sha256(&self.to_bytes(false, true))
    }

    /// Id derived from the full encoding.
    pub fn compute_id(&self) -> TransactionId {
        TransactionId(id_from_digest(&sha256(&self.to_bytes(false, false))))
    }

    /// Sign with the sender (or requester) key and refresh the id.
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.signature = sign_message(&self.signing_hash(), &keypair.private);
        self.id = self.compute_id();
    }

    /// Add the second signature and refresh the id.
    pub fn second_sign(&mut self, keypair: &KeyPair) {
        self.sign_signature = Some(sign_message(&self.second_signing_hash(), &keypair.private));
        self.id = self.compute_id();
    }

    /// Co-signature a multisignature group member contributes.
    pub fn multisign(&self, keypair: &KeyPair) -> Signature {
        sign_message(&self.signing_hash(), &keypair.private)
    }

    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        verify_signature(&self.signing_hash(), &self.signature, public_key)
    }

    pub fn verify_second_signature(&self, public_key: &PublicKey) -> bool {
        match &self.sign_signature {
            Some(signature) => verify_signature(&self.second_signing_hash(), signature, public_key),
            None => false,
        }
    }

    pub fn verify_cosignature(&self, signature: &Signature, public_key: &PublicKey) -> bool {
        verify_signature(&self.signing_hash(), signature, public_key)
    }

    /// Key the primary signature must verify against.
    pub fn signer_public_key(&self) -> &PublicKey {
        self.requester_public_key
            .as_ref()
            .unwrap_or(&self.sender_public_key)
    }
}

#[cfg(test)]
mod tests {
    use crate::{TransactionBuilder, VoteAction, VoteChange};
    use kestrel_crypto::keypair_from_passphrase;
    use kestrel_types::{Address, FeeSchedule, Timestamp};

    #[test]
    fn layout_of_plain_transfer() {
        let sender = keypair_from_passphrase("layout");
        let tx = TransactionBuilder::transfer(Address(1), 5)
            .timestamp(Timestamp::new(7))
            .sign(&sender, &FeeSchedule::default());
        let bytes = tx.to_bytes(false, false);
        assert_eq!(bytes.len(), 1 + 4 + 32 + 8 + 8 + 64);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..5], &7i32.to_le_bytes());
        assert_eq!(&bytes[37..45], &1u64.to_be_bytes());
        assert_eq!(&bytes[45..53], &5i64.to_le_bytes());
    }

    #[test]
    fn signing_hash_excludes_signatures() {
        let sender = keypair_from_passphrase("hash");
        let mut tx = TransactionBuilder::transfer(Address(1), 5).sign(&sender, &FeeSchedule::default());
        let before = tx.signing_hash();
        tx.second_sign(&keypair_from_passphrase("second"));
        assert_eq!(tx.signing_hash(), before);
        assert_ne!(tx.second_signing_hash(), before);
    }

    #[test]
    fn cosignatures_do_not_change_id() {
        let sender = keypair_from_passphrase("multi");
        let member = keypair_from_passphrase("member");
        let mut tx = TransactionBuilder::transfer(Address(1), 5).sign(&sender, &FeeSchedule::default());
        let id = tx.id;
        let cosig = tx.multisign(&member);
        tx.signatures.push(cosig);
        assert_eq!(tx.compute_id(), id);
        assert!(tx.verify_cosignature(&cosig, &member.public));
    }

    #[test]
    fn vote_asset_is_encoded_as_joined_text() {
        let sender = keypair_from_passphrase("voter");
        let delegate = keypair_from_passphrase("delegate");
        let tx = TransactionBuilder::vote(vec![VoteChange {
            action: VoteAction::Add,
            delegate: delegate.public,
        }])
        .sign(&sender, &FeeSchedule::default());
        let text = format!("+{}", delegate.public.to_hex());
        let bytes = tx.to_bytes(true, true);
        assert!(bytes.ends_with(text.as_bytes()));
    }

    #[test]
    fn id_depends_on_signature() {
        let a = keypair_from_passphrase("a");
        let tx = TransactionBuilder::transfer(Address(9), 1).sign(&a, &FeeSchedule::default());
        assert_eq!(tx.id, tx.compute_id());
        let mut tampered = tx.clone();
        tampered.signature.0[0] ^= 1;
        assert_ne!(tampered.compute_id(), tx.id);
    }
}
