//! Vote deltas derived from account changes.
//!
//! A voter contributes its balance to every delegate it votes for. When an
//! operation changes balances or votes, the change in contribution per
//! delegate is recorded against the round, to be folded into delegate vote
//! weights when the round lands. Deltas are computed from the account images
//! before and after, so reversing an operation records the exact negation.

use kestrel_store::{Account, StateStore, StoreError, VoteDelta};
use kestrel_types::PublicKey;
use std::collections::BTreeSet;

fn contribution(account: &Account, delegate: &PublicKey) -> i64 {
    if account.votes_for(delegate) {
        i64::try_from(account.balance).unwrap_or(i64::MAX)
    } else {
        0
    }
}

/// Per-delegate change in what `before` contributed versus `after`.
pub fn vote_changes(before: &Account, after: &Account) -> Vec<(PublicKey, i64)> {
    let delegates: BTreeSet<PublicKey> = before
        .voted_delegates
        .iter()
        .chain(after.voted_delegates.iter())
        .copied()
        .collect();
    delegates
        .into_iter()
        .filter_map(|delegate| {
            let amount = contribution(after, &delegate) - contribution(before, &delegate);
            (amount != 0).then_some((delegate, amount))
        })
        .collect()
}

/// Record deltas into `round` for every account changed since journal
/// position `mark`.
pub fn record_vote_deltas(
    state: &mut StateStore<'_>,
    mark: usize,
    round: u64,
) -> Result<usize, StoreError> {
    let mut recorded = 0;
    for (address, before) in state.accounts_changed_since(mark) {
        let after = state.get_account(&address)?;
        for (delegate, amount) in vote_changes(&before, &after) {
            state.add_vote_delta(VoteDelta {
                round,
                delegate,
                voter: address,
                amount,
            });
            recorded += 1;
        }
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::Address;

    fn voter(balance: u64, votes: &[u8]) -> Account {
        let mut account = Account::new(Address(1));
        account.balance = balance;
        account.voted_delegates = votes.iter().map(|b| PublicKey([*b; 32])).collect();
        account
    }

    #[test]
    fn balance_change_moves_every_voted_delegate() {
        let changes = vote_changes(&voter(100, &[1, 2]), &voter(70, &[1, 2]));
        assert_eq!(
            changes,
            vec![(PublicKey([1; 32]), -30), (PublicKey([2; 32]), -30)]
        );
    }

    #[test]
    fn new_vote_contributes_full_balance() {
        let changes = vote_changes(&voter(100, &[]), &voter(99, &[3]));
        assert_eq!(changes, vec![(PublicKey([3; 32]), 99)]);
    }

    #[test]
    fn reversal_is_exact_negation() {
        let before = voter(100, &[1]);
        let after = voter(40, &[2]);
        let forward = vote_changes(&before, &after);
        let backward = vote_changes(&after, &before);
        let negated: Vec<_> = forward.iter().map(|(d, a)| (*d, -a)).collect();
        assert_eq!(backward, negated);
    }

    #[test]
    fn unchanged_account_records_nothing() {
        assert!(vote_changes(&voter(5, &[1]), &voter(5, &[1])).is_empty());
    }
}
