//! Address derivation from public keys.

use crate::hash::{id_from_digest, sha256};
use kestrel_types::{Address, PublicKey};

/// Derive the account address owned by `public_key`.
pub fn derive_address(public_key: &PublicKey) -> Address {
    Address(id_from_digest(&sha256(public_key.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_passphrase;

    #[test]
    fn derivation_is_deterministic() {
        let kp = keypair_from_passphrase("robust swap");
        assert_eq!(derive_address(&kp.public), derive_address(&kp.public));
    }

    #[test]
    fn different_keys_give_different_addresses() {
        let a = keypair_from_passphrase("first");
        let b = keypair_from_passphrase("second");
        assert_ne!(derive_address(&a.public), derive_address(&b.public));
    }
}
