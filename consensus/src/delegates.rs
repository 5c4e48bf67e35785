//! Delegate ordering and forging-slot assignment.
//!
//! Each round is forged by the top `active_delegates` delegates by vote
//! weight, in an order shuffled deterministically from the round number.
//! Every peer must compute the same order, so the shuffle reproduces the
//! network's historical algorithm exactly, including the slot it skips after
//! every batch of four swaps.
//!
//! Generated lists are cached for the two most recent rounds. Rounds listed
//! in the network exceptions are always regenerated.

use crate::error::{ConsensusError, SlotError};
use kestrel_crypto::sha256;
use kestrel_ledger::Block;
use kestrel_store::Storage;
use kestrel_types::{ChainParams, KeyPair, NetworkExceptions, PublicKey, Timestamp};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Rounds whose lists are kept in the cache.
const CACHED_ROUNDS: usize = 2;

/// Supplies the unshuffled candidates for a round.
pub trait DelegateSource: Send + Sync {
    /// At most `limit` delegate keys, highest vote weight first with ties
    /// broken by ascending key.
    fn delegate_keys(&self, limit: usize) -> Result<Vec<PublicKey>, ConsensusError>;
}

/// Ranks registered delegates by their committed vote weight.
pub struct VoteWeightSource {
    storage: Arc<dyn Storage>,
}

impl VoteWeightSource {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl DelegateSource for VoteWeightSource {
    fn delegate_keys(&self, limit: usize) -> Result<Vec<PublicKey>, ConsensusError> {
        Ok(self
            .storage
            .top_delegates(limit)?
            .into_iter()
            .filter_map(|account| account.public_key)
            .collect())
    }
}

/// A fixed candidate list, already ranked.
pub struct FixedSource(pub Vec<PublicKey>);

impl DelegateSource for FixedSource {
    fn delegate_keys(&self, limit: usize) -> Result<Vec<PublicKey>, ConsensusError> {
        Ok(self.0.iter().take(limit).copied().collect())
    }
}

/// Shuffle `delegates` with a seed derived from `round`.
///
/// Each pass swaps up to four positions using one seed byte each, rehashes
/// the seed, and then steps past one more position without swapping it.
pub fn shuffle_delegates(round: u64, mut delegates: Vec<PublicKey>) -> Vec<PublicKey> {
    let count = delegates.len();
    let mut seed = sha256(round.to_string().as_bytes());
    let mut i = 0;
    while i < count {
        let mut x = 0;
        while x < 4 && i < count {
            let target = usize::from(seed[x]) % count;
            delegates.swap(target, i);
            i += 1;
            x += 1;
        }
        seed = sha256(&seed);
        i += 1;
    }
    delegates
}

/// Reject blocks from a future slot or from more than `block_slot_window`
/// slots ago.
pub fn validate_slot_window(
    params: &ChainParams,
    block_timestamp: Timestamp,
    now: Timestamp,
) -> Result<(), SlotError> {
    let slot = params.slot_number(block_timestamp);
    let current = params.slot_number(now);
    if slot > current {
        return Err(SlotError::InFuture { slot, current });
    }
    if current - slot > params.block_slot_window {
        return Err(SlotError::TooOld {
            slot,
            current,
            window: params.block_slot_window,
        });
    }
    Ok(())
}

pub struct DelegateRegistry {
    params: ChainParams,
    exceptions: NetworkExceptions,
    storage: Arc<dyn Storage>,
    source: Box<dyn DelegateSource>,
    cache: RwLock<BTreeMap<u64, Vec<PublicKey>>>,
}

impl DelegateRegistry {
    pub fn new(storage: Arc<dyn Storage>, params: ChainParams, exceptions: NetworkExceptions) -> Self {
        let source = Box::new(VoteWeightSource::new(Arc::clone(&storage)));
        Self {
            params,
            exceptions,
            storage,
            source,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    fn active_delegates(&self) -> usize {
        usize::try_from(self.params.active_delegates).unwrap_or(usize::MAX)
    }

    /// The forging order of `round`, from the cache or freshly generated from
    /// committed vote weights.
    pub fn generate_delegate_list(&self, round: u64) -> Result<Vec<PublicKey>, ConsensusError> {
        let cacheable = self.exceptions.is_delegate_list_cacheable(round);
        if cacheable {
            let cache = self.cache.read().map_err(|_| ConsensusError::LockPoisoned)?;
            if let Some(list) = cache.get(&round) {
                trace!(round, "delegate list cache hit");
                return Ok(list.clone());
            }
        }

        let list = self.shuffle_from(round, self.source.as_ref())?;
        if cacheable {
            let mut cache = self.cache.write().map_err(|_| ConsensusError::LockPoisoned)?;
            cache.insert(round, list.clone());
            while cache.len() > CACHED_ROUNDS {
                cache.pop_first();
            }
        } else {
            debug!(round, "delegate list not cached for exception round");
        }
        Ok(list)
    }

    /// The forging order of `round` generated from `source`. Never cached.
    pub fn generate_delegate_list_from(
        &self,
        round: u64,
        source: &dyn DelegateSource,
    ) -> Result<Vec<PublicKey>, ConsensusError> {
        self.shuffle_from(round, source)
    }

    fn shuffle_from(
        &self,
        round: u64,
        source: &dyn DelegateSource,
    ) -> Result<Vec<PublicKey>, ConsensusError> {
        let required = self.active_delegates();
        let keys = source.delegate_keys(required)?;
        if keys.len() < required {
            return Err(ConsensusError::InsufficientDelegates {
                round,
                available: keys.len(),
                required,
            });
        }
        Ok(shuffle_delegates(round, keys))
    }

    /// The order a landed round was actually forged with, falling back to
    /// generating it when no snapshot was stored.
    pub fn round_delegates(&self, round: u64) -> Result<Vec<PublicKey>, ConsensusError> {
        match self.storage.delegate_snapshot(round)? {
            Some(list) => Ok(list),
            None => self.generate_delegate_list(round),
        }
    }

    /// The delegate assigned to `slot` in `list`.
    pub fn delegate_for_slot(&self, list: &[PublicKey], slot: u64) -> Option<PublicKey> {
        let index = usize::try_from(slot % self.params.active_delegates).ok()?;
        list.get(index).copied()
    }

    /// Check that `block` was forged by the delegate its slot belongs to.
    pub fn validate_block_slot(&self, block: &Block) -> Result<(), ConsensusError> {
        let list = self.generate_delegate_list(self.params.calc_round(block.height))?;
        self.validate_block_slot_against(block, &list)?;
        Ok(())
    }

    pub fn validate_block_slot_against(
        &self,
        block: &Block,
        list: &[PublicKey],
    ) -> Result<(), SlotError> {
        let slot = self.params.slot_number(block.timestamp);
        match self.delegate_for_slot(list, slot) {
            Some(expected) if expected == block.generator_public_key => Ok(()),
            Some(expected) => Err(SlotError::WrongDelegate {
                slot,
                expected,
                actual: block.generator_public_key,
            }),
            None => Err(SlotError::NoDelegateForSlot {
                slot,
                delegates: list.len(),
            }),
        }
    }

    /// If `slot` of `round` belongs to a delegate this node forges for,
    /// the slot's start time and that delegate's key pair.
    pub fn get_forging_slot<'k>(
        &self,
        slot: u64,
        round: u64,
        keypairs: &'k BTreeMap<PublicKey, KeyPair>,
    ) -> Result<Option<(Timestamp, &'k KeyPair)>, ConsensusError> {
        let list = self.generate_delegate_list(round)?;
        Ok(self
            .delegate_for_slot(&list, slot)
            .and_then(|key| keypairs.get(&key))
            .map(|keypair| (self.params.slot_time(slot), keypair)))
    }

    /// The first slot from `from_slot` within one round's worth of slots that
    /// belongs to a local delegate.
    pub fn next_forging_slot<'k>(
        &self,
        from_slot: u64,
        round: u64,
        keypairs: &'k BTreeMap<PublicKey, KeyPair>,
    ) -> Result<Option<(Timestamp, &'k KeyPair)>, ConsensusError> {
        if keypairs.is_empty() {
            return Ok(None);
        }
        let list = self.generate_delegate_list(round)?;
        for slot in from_slot..from_slot + self.params.active_delegates {
            if let Some(keypair) = self
                .delegate_for_slot(&list, slot)
                .and_then(|key| keypairs.get(&key))
            {
                return Ok(Some((self.params.slot_time(slot), keypair)));
            }
        }
        Ok(None)
    }

    /// Drop the cached list of `round`.
    pub fn invalidate(&self, round: u64) -> Result<(), ConsensusError> {
        let mut cache = self.cache.write().map_err(|_| ConsensusError::LockPoisoned)?;
        if cache.remove(&round).is_some() {
            debug!(round, "delegate list cache invalidated");
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ConsensusError> {
        self.cache
            .write()
            .map_err(|_| ConsensusError::LockPoisoned)?
            .clear();
        Ok(())
    }

    pub fn cached_rounds(&self) -> Vec<u64> {
        self.cache
            .read()
            .map(|cache| cache.keys().copied().collect())
            .unwrap_or_default()
    }
}
