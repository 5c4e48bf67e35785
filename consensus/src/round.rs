//! Round accounting.
//!
//! Every applied block ticks the accountant forward and every removed block
//! ticks it backward. A tick credits or debits the generator's produced-block
//! counter. A tick on a round's closing height also lands (or unlands) the
//! round:
//!
//! 1. pending vote deltas are folded into delegate vote weights;
//! 2. delegates that were scheduled but forged nothing get a missed block;
//! 3. fees are shared evenly between producers, each producer also receives
//!    its own block reward and the last producer receives the fee remainder;
//! 4. vote deltas caused by those balance changes are folded in as well.
//!
//! Landing archives the deltas it consumed and snapshots the round's
//! delegate order, so unlanding restores both exactly.

use crate::delegates::DelegateRegistry;
use crate::error::RoundError;
use kestrel_crypto::derive_address;
use kestrel_ledger::{record_vote_deltas, Block};
use kestrel_store::{Account, RoundSummary, StateStore, VoteDelta};
use kestrel_types::{ChainParams, NetworkExceptions, PublicKey, RoundException};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Running totals of the round currently being forged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundAccumulator {
    pub round: u64,
    pub fees: u64,
    pub rewards: Vec<u64>,
    pub delegates: Vec<PublicKey>,
}

impl RoundAccumulator {
    pub fn new(round: u64) -> Self {
        Self {
            round,
            ..Self::default()
        }
    }

    pub fn from_summary(round: u64, summary: RoundSummary) -> Self {
        Self {
            round,
            fees: summary.fees,
            rewards: summary.rewards,
            delegates: summary.delegates,
        }
    }

    fn with_block(mut self, block: &Block) -> Self {
        self.fees = self.fees.saturating_add(block.total_fee);
        self.rewards.push(block.reward);
        self.delegates.push(block.generator_public_key);
        self
    }

    pub fn blocks(&self) -> usize {
        self.delegates.len()
    }
}

/// What a tick did beyond updating account rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub round: u64,
    /// Set when the tick landed this round.
    pub finished_round: Option<u64>,
    /// Scheduled delegates that forged nothing in a landed or unlanded round.
    pub outsiders: Vec<PublicKey>,
    /// Rounds whose cached delegate list is stale once the tick commits.
    pub invalidate_rounds: Vec<u64>,
}

/// One producer's share of a landing round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelegateShare {
    pub fees: u64,
    pub fees_remaining: u64,
    pub rewards: u64,
}

impl DelegateShare {
    pub fn balance(&self) -> u64 {
        self.fees.saturating_add(self.rewards)
    }
}

/// Fee and reward split of one round, with any network exception applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundChanges {
    fees: u64,
    rewards: Vec<u64>,
    active_delegates: u64,
}

impl RoundChanges {
    pub fn new(
        summary: &RoundSummary,
        exception: Option<&RoundException>,
        active_delegates: u64,
    ) -> Self {
        let (fees, rewards) = match exception {
            Some(ex) => (
                summary
                    .fees
                    .saturating_mul(ex.fees_factor)
                    .saturating_add(ex.fees_bonus),
                summary
                    .rewards
                    .iter()
                    .map(|r| r.saturating_mul(ex.rewards_factor))
                    .collect(),
            ),
            None => (summary.fees, summary.rewards.clone()),
        };
        Self {
            fees,
            rewards,
            active_delegates: active_delegates.max(1),
        }
    }

    /// The share of the producer at `index` in production order.
    pub fn at(&self, index: usize) -> DelegateShare {
        let fees = self.fees / self.active_delegates;
        DelegateShare {
            fees,
            fees_remaining: self.fees - fees * self.active_delegates,
            rewards: self.rewards.get(index).copied().unwrap_or(0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Clears the ticking flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RoundAccountant {
    params: ChainParams,
    exceptions: NetworkExceptions,
    delegates: Arc<DelegateRegistry>,
    ticking: AtomicBool,
}

impl RoundAccountant {
    pub fn new(
        params: ChainParams,
        exceptions: NetworkExceptions,
        delegates: Arc<DelegateRegistry>,
    ) -> Self {
        Self {
            params,
            exceptions,
            delegates,
            ticking: AtomicBool::new(false),
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking.load(Ordering::Acquire)
    }

    fn begin(&self) -> Result<TickGuard<'_>, RoundError> {
        self.ticking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RoundError::AlreadyTicking)?;
        Ok(TickGuard(&self.ticking))
    }

    /// Account for `block`, which has just been applied to `state` and staged
    /// for append.
    pub fn tick(
        &self,
        state: &mut StateStore<'_>,
        block: &Block,
        accumulator: &RoundAccumulator,
    ) -> Result<(RoundAccumulator, TickOutcome), RoundError> {
        let _guard = self.begin()?;
        let height = block.height;
        let round = self.params.calc_round(height);
        let next_round = self.params.calc_round(height + 1);

        update_account(state, &block.generator_public_key, |account| {
            account.produced_blocks = account.produced_blocks.saturating_add(1);
        })?;

        let current = if accumulator.round == round {
            accumulator.clone()
        } else {
            RoundAccumulator::new(round)
        };
        let mut current = current.with_block(block);
        let mut outcome = TickOutcome {
            round,
            ..TickOutcome::default()
        };

        if self.params.is_round_finish(height) {
            let summary = self.sum_round(state, block)?;
            let list = if height == 1 {
                Vec::new()
            } else {
                self.delegates.generate_delegate_list(round)?
            };
            outcome.outsiders = outsiders(height, &list, &summary);
            self.land(state, round, height, &summary, &outcome.outsiders)?;
            if height != 1 {
                state.stage_delegate_snapshot(round, list);
            }
            info!(round, height, outsiders = outcome.outsiders.len(), "round finished");
            outcome.finished_round = Some(round);
            outcome.invalidate_rounds.push(next_round);
            if next_round != round {
                current = RoundAccumulator::new(next_round);
            }
        }
        Ok((current, outcome))
    }

    /// Reverse the accounting of `block`, which is about to be removed. Must
    /// run before its transactions are undone and before its deletion is
    /// staged.
    pub fn backward_tick(
        &self,
        state: &mut StateStore<'_>,
        block: &Block,
    ) -> Result<(RoundAccumulator, TickOutcome), RoundError> {
        let _guard = self.begin()?;
        let height = block.height;
        let round = self.params.calc_round(height);

        update_account(state, &block.generator_public_key, |account| {
            account.produced_blocks = account.produced_blocks.saturating_sub(1);
        })?;

        let summary = self.sum_round(state, block)?;
        let mut outcome = TickOutcome {
            round,
            ..TickOutcome::default()
        };

        if self.params.is_round_finish(height) {
            let list = if height == 1 {
                Vec::new()
            } else {
                self.delegates.round_delegates(round)?
            };
            outcome.outsiders = outsiders(height, &list, &summary);
            self.unland(state, round, height, &summary, &outcome.outsiders)?;
            if height != 1 {
                state.stage_delegate_snapshot_removal(round);
            }
            info!(round, height, "round unlanded");
            outcome.invalidate_rounds.push(self.params.calc_round(height + 1));
        }

        let mut remaining = summary;
        if remaining.delegates.last() == Some(&block.generator_public_key) {
            remaining.delegates.pop();
            remaining.rewards.pop();
            remaining.fees = remaining.fees.saturating_sub(block.total_fee);
        }
        Ok((RoundAccumulator::from_summary(round, remaining), outcome))
    }

    /// The round's fees, rewards and producers. The genesis block stands for
    /// a round of its own forged by its generator alone.
    fn sum_round(&self, state: &StateStore<'_>, block: &Block) -> Result<RoundSummary, RoundError> {
        if block.height == 1 {
            return Ok(RoundSummary {
                fees: 0,
                rewards: vec![0],
                delegates: vec![block.generator_public_key],
            });
        }
        let round = self.params.calc_round(block.height);
        let summary = state.sum_round(round, self.params.active_delegates)?;
        if summary.delegates.is_empty() {
            return Err(RoundError::EmptyRound {
                round,
                height: block.height,
            });
        }
        Ok(summary)
    }

    fn land(
        &self,
        state: &mut StateStore<'_>,
        round: u64,
        height: u64,
        summary: &RoundSummary,
        outsiders: &[PublicKey],
    ) -> Result<(), RoundError> {
        let mut archive = self.fold_votes(state, round)?;
        for key in outsiders {
            update_account(state, key, |account| {
                account.missed_blocks = account.missed_blocks.saturating_add(1);
            })?;
        }
        self.apply_round(state, round, summary, Direction::Forward)?;
        archive.extend(self.fold_votes(state, round)?);
        debug!(round, height, deltas = archive.len(), "round archived");
        state.stage_round_archive(height, archive);
        Ok(())
    }

    fn unland(
        &self,
        state: &mut StateStore<'_>,
        round: u64,
        height: u64,
        summary: &RoundSummary,
        outsiders: &[PublicKey],
    ) -> Result<(), RoundError> {
        let archive = state.take_round_archive(height)?;
        let mut totals: BTreeMap<PublicKey, i64> = BTreeMap::new();
        for row in &archive {
            *totals.entry(row.delegate).or_default() += row.amount;
        }
        for (delegate, amount) in totals {
            adjust_vote(state, &delegate, -amount)?;
        }
        state.restore_round(round, archive)?;
        self.apply_round(state, round, summary, Direction::Backward)?;
        for key in outsiders {
            update_account(state, key, |account| {
                account.missed_blocks = account.missed_blocks.saturating_sub(1);
            })?;
        }
        Ok(())
    }

    /// Add the round's pending vote totals to delegate weights and consume
    /// the pending rows.
    fn fold_votes(
        &self,
        state: &mut StateStore<'_>,
        round: u64,
    ) -> Result<Vec<VoteDelta>, RoundError> {
        for (delegate, amount) in state.vote_totals(round)? {
            adjust_vote(state, &delegate, amount)?;
        }
        Ok(state.flush_round(round)?)
    }

    /// Credit (or, backward, debit) every producer's share. Backward visits
    /// producers in reverse so the remainder comes off the last producer
    /// first.
    fn apply_round(
        &self,
        state: &mut StateStore<'_>,
        round: u64,
        summary: &RoundSummary,
        direction: Direction,
    ) -> Result<(), RoundError> {
        let changes = RoundChanges::new(
            summary,
            self.exceptions.round(round),
            self.params.active_delegates,
        );
        let producers = summary.delegates.len();
        let remainder_index = producers.saturating_sub(1);
        let order: Vec<usize> = match direction {
            Direction::Forward => (0..producers).collect(),
            Direction::Backward => (0..producers).rev().collect(),
        };

        for index in order {
            let delegate = summary.delegates[index];
            let share = changes.at(index);
            let mut fees = share.fees;
            if index == remainder_index {
                fees = fees.saturating_add(share.fees_remaining);
            }
            let total = fees.saturating_add(share.rewards);

            let mark = state.journal_position();
            update_account(state, &delegate, |account| match direction {
                Direction::Forward => {
                    account.balance = account.balance.saturating_add(total);
                    account.u_balance = account.u_balance.saturating_add(total);
                    account.fees = account.fees.saturating_add(fees);
                    account.rewards = account.rewards.saturating_add(share.rewards);
                }
                Direction::Backward => {
                    account.balance = account.balance.saturating_sub(total);
                    account.u_balance = account.u_balance.saturating_sub(total);
                    account.fees = account.fees.saturating_sub(fees);
                    account.rewards = account.rewards.saturating_sub(share.rewards);
                }
            })?;
            record_vote_deltas(state, mark, round)?;
        }
        Ok(())
    }
}

/// Scheduled delegates that forged nothing this round. None at genesis.
fn outsiders(height: u64, list: &[PublicKey], summary: &RoundSummary) -> Vec<PublicKey> {
    if height == 1 {
        return Vec::new();
    }
    let producers: BTreeSet<&PublicKey> = summary.delegates.iter().collect();
    list.iter()
        .filter(|key| !producers.contains(key))
        .copied()
        .collect()
}

fn update_account(
    state: &mut StateStore<'_>,
    key: &PublicKey,
    change: impl FnOnce(&mut Account),
) -> Result<(), RoundError> {
    let mut account = state.get_account(&derive_address(key))?;
    if account.public_key.is_none() {
        account.public_key = Some(*key);
    }
    change(&mut account);
    state.set_account(account);
    Ok(())
}

fn adjust_vote(state: &mut StateStore<'_>, delegate: &PublicKey, amount: i64) -> Result<(), RoundError> {
    update_account(state, delegate, |account| {
        account.vote = if amount >= 0 {
            account.vote.saturating_add(amount.unsigned_abs())
        } else {
            account.vote.saturating_sub(amount.unsigned_abs())
        };
    })
}
