//! Account model and storage trait.

use crate::StoreError;
use kestrel_types::{Address, PublicKey};
use serde::{Deserialize, Serialize};

/// Per-account state.
///
/// Fields prefixed `u_` are the unconfirmed view. Block application moves
/// both views together, so outside an in-flight unit of work they agree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    /// Set the first time the account signs a transaction.
    pub public_key: Option<PublicKey>,
    pub balance: u64,
    pub u_balance: u64,
    /// Total balance of the accounts voting for this delegate, as of the last round land.
    pub vote: u64,

    pub is_delegate: bool,
    pub u_is_delegate: bool,
    pub username: Option<String>,
    pub u_username: Option<String>,

    pub second_signature: bool,
    pub u_second_signature: bool,
    pub second_public_key: Option<PublicKey>,

    pub multisignatures: Vec<PublicKey>,
    pub u_multisignatures: Vec<PublicKey>,
    pub multimin: u8,
    pub u_multimin: u8,
    /// Hours a pending multisignature transaction may wait for co-signatures.
    pub multilifetime: u8,
    pub u_multilifetime: u8,

    pub voted_delegates: Vec<PublicKey>,
    pub u_voted_delegates: Vec<PublicKey>,

    pub produced_blocks: u64,
    pub missed_blocks: u64,
    /// Fees earned as a delegate.
    pub fees: u64,
    /// Block rewards earned as a delegate.
    pub rewards: u64,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn is_multisignature(&self) -> bool {
        !self.multisignatures.is_empty()
    }

    pub fn votes_for(&self, delegate: &PublicKey) -> bool {
        self.voted_delegates.contains(delegate)
    }
}

/// Trait for account storage operations.
pub trait AccountStore {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, StoreError>;

    /// Fetch several accounts in one round trip. Missing accounts are omitted.
    fn get_accounts(&self, addresses: &[Address]) -> Result<Vec<Account>, StoreError> {
        let mut found = Vec::with_capacity(addresses.len());
        for address in addresses {
            if let Some(account) = self.get_account(address)? {
                found.push(account);
            }
        }
        Ok(found)
    }

    fn get_account_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    fn get_account_by_public_key(
        &self,
        public_key: &PublicKey,
    ) -> Result<Option<Account>, StoreError>;

    fn upsert_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Registered delegates ordered by vote weight descending, then public key ascending.
    /// Accounts that are not delegates, or have no public key, never count
    /// toward `limit`.
    fn top_delegates(&self, limit: usize) -> Result<Vec<Account>, StoreError>;

    fn account_count(&self) -> Result<u64, StoreError>;
}
