//! Cryptographic primitives for kestrel.
//!
//! - **Ed25519** for block and transaction signatures
//! - **SHA-256** for payload hashes, id derivation and the delegate shuffle seed
//! - Address derivation: first eight digest bytes of the public key, reversed
//! - **Argon2id + AES-256-GCM** for forging secrets stored at rest

pub mod address;
pub mod encryption;
pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::derive_address;
pub use encryption::{decrypt_passphrase, encrypt_passphrase, EncryptedSecret, KdfParams};
pub use error::CryptoError;
pub use hash::{id_from_digest, sha256, sha256_multi};
pub use keys::{generate_keypair, keypair_from_passphrase, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
