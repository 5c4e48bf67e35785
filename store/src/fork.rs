//! Fork event log.

use crate::StoreError;
use kestrel_types::ForkEvent;

pub trait ForkStore {
    fn record_fork(&self, event: &ForkEvent) -> Result<(), StoreError>;

    /// Most recent fork events, newest first.
    fn recent_forks(&self, limit: usize) -> Result<Vec<ForkEvent>, StoreError>;
}
