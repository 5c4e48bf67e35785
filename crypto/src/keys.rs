//! Ed25519 key generation.

use crate::hash::sha256;
use ed25519_dalek::SigningKey;
use kestrel_types::{KeyPair, PrivateKey, PublicKey};
use rand::rngs::OsRng;
use zeroize::Zeroize;

/// Generate a new Ed25519 key pair from a secure random source.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive the key pair an account passphrase stands for: the Ed25519 seed is
/// SHA-256 of the UTF-8 passphrase.
pub fn keypair_from_passphrase(passphrase: &str) -> KeyPair {
    let mut seed = sha256(passphrase.as_bytes());
    let kp = keypair_from_seed(&seed);
    seed.zeroize();
    kp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_keypair() {
        let kp = generate_keypair();
        assert_eq!(public_from_private(&kp.private), kp.public);
    }

    #[test]
    fn passphrase_derivation_is_deterministic() {
        let kp1 = keypair_from_passphrase("wagon stock borrow episode");
        let kp2 = keypair_from_passphrase("wagon stock borrow episode");
        assert_eq!(kp1.public, kp2.public);
        assert_eq!(kp1.private.0, kp2.private.0);
    }

    #[test]
    fn passphrase_seed_is_sha256() {
        let kp = keypair_from_passphrase("secret");
        assert_eq!(kp.private.0, sha256(b"secret"));
    }

    #[test]
    fn different_seeds_produce_different_keys() {
        let kp1 = keypair_from_seed(&[1u8; 32]);
        let kp2 = keypair_from_seed(&[2u8; 32]);
        assert_ne!(kp1.public, kp2.public);
    }
}
