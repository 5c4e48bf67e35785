//! Passphrase encryption for forging secrets stored in node configuration.
//!
//! 1. Argon2id derives a 32-byte key from the password and a random salt
//! 2. AES-256-GCM encrypts the UTF-8 passphrase with a random nonce
//! 3. Every parameter needed for decryption travels with the ciphertext

use crate::error::CryptoError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const SALT_LEN: usize = 16;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// An encrypted passphrase with its hex-encoded salt, nonce and ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    #[serde(default)]
    pub kdf: KdfParams,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Encrypt `passphrase` under `password` with the given cost parameters.
pub fn encrypt_passphrase(
    passphrase: &str,
    password: &str,
    kdf: KdfParams,
) -> Result<EncryptedSecret, CryptoError> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt, kdf)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), passphrase.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedSecret {
        kdf,
        salt: hex::encode(salt),
        nonce: hex::encode(nonce_bytes),
        ciphertext: hex::encode(ciphertext),
    })
}

/// Decrypt a passphrase previously sealed by [`encrypt_passphrase`].
pub fn decrypt_passphrase(
    secret: &EncryptedSecret,
    password: &str,
) -> Result<Zeroizing<String>, CryptoError> {
    let salt = hex::decode(&secret.salt).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let nonce_bytes =
        hex::decode(&secret.nonce).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let ciphertext =
        hex::decode(&secret.ciphertext).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(CryptoError::Malformed(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce_bytes.len()
        )));
    }

    let key = derive_key(password, &salt, secret.kdf)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::Decryption)?,
    );
    let passphrase = std::str::from_utf8(&plaintext)
        .map_err(|e| CryptoError::Malformed(e.to_string()))?
        .to_string();
    Ok(Zeroizing::new(passphrase))
}

fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(KEY_LEN))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut output[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let sealed = encrypt_passphrase("forge slot passphrase", "hunter2", cheap()).unwrap();
        let opened = decrypt_passphrase(&sealed, "hunter2").unwrap();
        assert_eq!(opened.as_str(), "forge slot passphrase");
    }

    #[test]
    fn wrong_password_fails() {
        let sealed = encrypt_passphrase("forge slot passphrase", "hunter2", cheap()).unwrap();
        assert!(matches!(
            decrypt_passphrase(&sealed, "hunter3"),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn salt_and_nonce_are_random() {
        let a = encrypt_passphrase("same", "pw", cheap()).unwrap();
        let b = encrypt_passphrase("same", "pw", cheap()).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn malformed_nonce_is_rejected() {
        let mut sealed = encrypt_passphrase("x", "pw", cheap()).unwrap();
        sealed.nonce = "abcd".into();
        assert!(matches!(
            decrypt_passphrase(&sealed, "pw"),
            Err(CryptoError::Malformed(_))
        ));
    }

    #[test]
    fn serializes_to_json() {
        let sealed = encrypt_passphrase("x", "pw", cheap()).unwrap();
        let json = serde_json::to_string(&sealed).unwrap();
        let back: EncryptedSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sealed);
    }
}
