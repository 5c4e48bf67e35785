//! Confirmed transaction index.

use crate::StoreError;
use kestrel_types::{BlockId, TransactionId};

pub trait TransactionStore {
    fn transaction_exists(&self, id: &TransactionId) -> Result<bool, StoreError>;

    /// The subset of `ids` already confirmed, in input order.
    fn confirmed_transaction_ids(
        &self,
        ids: &[TransactionId],
    ) -> Result<Vec<TransactionId>, StoreError> {
        let mut confirmed = Vec::new();
        for id in ids {
            if self.transaction_exists(id)? {
                confirmed.push(*id);
            }
        }
        Ok(confirmed)
    }

    /// The block that confirmed `id`, if any.
    fn transaction_block(&self, id: &TransactionId) -> Result<Option<BlockId>, StoreError>;

    /// Whether `id` was confirmed under a network exception after failing
    /// to apply, and so changed no state.
    fn is_inert_transaction(&self, id: &TransactionId) -> Result<bool, StoreError>;
}
