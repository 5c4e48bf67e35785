//! Forging secrets and the keypairs currently enabled for forging.

use crate::config::{ForgingConfig, ForgingSecret};
use crate::NodeError;
use kestrel_crypto::{decrypt_passphrase, keypair_from_passphrase};
use kestrel_types::{KeyPair, PublicKey, Timestamp};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{info, warn};

/// What one forge attempt did.
#[derive(Clone, Debug, PartialEq)]
pub enum ForgeOutcome {
    /// No forging keypairs are enabled.
    NoDelegates,
    /// The tip was already forged in the current slot.
    LastBlockInSlot { slot: u64 },
    /// The current slot belongs to a delegate this node does not forge for.
    NotOurSlot { slot: u64 },
    /// Too few peers share our broadhash.
    NoConsensus { consensus: f64 },
    Forged {
        id: kestrel_types::BlockId,
        height: u64,
        timestamp: Timestamp,
    },
}

pub struct Forger {
    config: ForgingConfig,
    keypairs: RwLock<BTreeMap<PublicKey, KeyPair>>,
}

impl Forger {
    pub fn new(config: ForgingConfig) -> Self {
        Self {
            config,
            keypairs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ForgingConfig {
        &self.config
    }

    fn secret(&self, public_key: &PublicKey) -> Result<&ForgingSecret, NodeError> {
        self.config
            .secrets
            .iter()
            .find(|secret| secret.public_key == *public_key)
            .ok_or_else(|| NodeError::Forging(format!("no forging secret configured for {public_key}")))
    }

    /// Decrypt the secret of `public_key` and check it yields that key.
    fn unlock(&self, public_key: &PublicKey, password: &str) -> Result<KeyPair, NodeError> {
        let secret = self.secret(public_key)?;
        let passphrase = decrypt_passphrase(&secret.encrypted, password)?;
        let keypair = keypair_from_passphrase(&passphrase);
        if keypair.public != *public_key {
            return Err(NodeError::Forging(format!(
                "secret configured for {public_key} derives a different key"
            )));
        }
        Ok(keypair)
    }

    /// Enable or disable forging for `public_key`. Both directions require
    /// the password of its configured secret.
    pub fn update_forging_status(
        &self,
        public_key: &PublicKey,
        password: &str,
        enable: bool,
    ) -> Result<(), NodeError> {
        let keypair = self.unlock(public_key, password)?;
        let mut keypairs = self.keypairs.write().map_err(|_| NodeError::LockPoisoned)?;
        if enable {
            keypairs.insert(keypair.public, keypair);
            info!(public_key = %public_key, "forging enabled");
        } else {
            keypairs.remove(public_key);
            info!(public_key = %public_key, "forging disabled");
        }
        Ok(())
    }

    /// Enable every configured secret with the configured default password.
    /// Secrets that fail to unlock are skipped. Returns how many were enabled.
    pub fn load_default_secrets(&self) -> Result<usize, NodeError> {
        let Some(password) = self.config.default_password.clone() else {
            return Ok(0);
        };
        let mut enabled = 0;
        for secret in &self.config.secrets {
            match self.update_forging_status(&secret.public_key, &password, true) {
                Ok(()) => enabled += 1,
                Err(err) => {
                    warn!(public_key = %secret.public_key, error = %err, "could not enable forging secret")
                }
            }
        }
        Ok(enabled)
    }

    /// Disable forging for `public_key` without a password. Used when the
    /// key turns out not to belong to a registered delegate.
    pub(crate) fn revoke(&self, public_key: &PublicKey) -> Result<bool, NodeError> {
        let mut keypairs = self.keypairs.write().map_err(|_| NodeError::LockPoisoned)?;
        Ok(keypairs.remove(public_key).is_some())
    }

    /// Public keys of the enabled forgers.
    pub fn forger_public_keys(&self) -> Vec<PublicKey> {
        self.keypairs
            .read()
            .map(|keypairs| keypairs.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_forging(&self, public_key: &PublicKey) -> bool {
        self.keypairs
            .read()
            .map(|keypairs| keypairs.contains_key(public_key))
            .unwrap_or(false)
    }

    /// Run `f` with the enabled keypairs held under the read lock.
    pub fn with_keypairs<T>(
        &self,
        f: impl FnOnce(&BTreeMap<PublicKey, KeyPair>) -> T,
    ) -> Result<T, NodeError> {
        let keypairs = self.keypairs.read().map_err(|_| NodeError::LockPoisoned)?;
        Ok(f(&keypairs))
    }
}
