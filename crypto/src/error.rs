use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: wrong password or corrupted data")]
    Decryption,

    #[error("malformed encrypted secret: {0}")]
    Malformed(String),
}
