//! The behaviour every transaction kind provides.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, PrepareRequest, StateStore};
use kestrel_types::{ChainParams, FeeSchedule};

/// Kind-specific rules layered on top of the shared envelope handling.
///
/// `apply` and `undo` receive the sender already loaded (and, for `apply`,
/// already debited); the caller writes the sender back afterwards. Any other
/// account a kind touches is read from and written to `state` directly.
pub trait TransactionKind {
    fn transaction_type(&self) -> TransactionType;

    fn fee(&self, fees: &FeeSchedule) -> u64;

    /// Append the asset's canonical bytes.
    fn write_asset_bytes(&self, out: &mut Vec<u8>);

    /// Stateless checks on the asset and the envelope fields it constrains.
    fn validate(&self, tx: &Transaction, params: &ChainParams) -> Result<(), TransactionError>;

    /// Rows beyond the sender that `apply` or `undo` will read.
    fn prepare(&self, _tx: &Transaction, _request: &mut PrepareRequest) {}

    fn apply(
        &self,
        tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError>;

    fn undo(
        &self,
        tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError>;
}

// ── Shared helpers ──────────────────────────────────────────────────────

pub(crate) fn require_no_recipient(tx: &Transaction) -> Result<(), TransactionError> {
    match tx.recipient_id {
        None => Ok(()),
        Some(recipient) => Err(TransactionError::InvalidRecipient(format!(
            "{} transactions take no recipient, got {recipient}",
            tx.transaction_type()
        ))),
    }
}

pub(crate) fn require_zero_amount(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.amount == 0 {
        Ok(())
    } else {
        Err(TransactionError::InvalidAmount(format!(
            "{} transactions must have zero amount",
            tx.transaction_type()
        )))
    }
}

pub(crate) fn require_positive_amount(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.amount > 0 {
        Ok(())
    } else {
        Err(TransactionError::InvalidAmount("amount must be positive".into()))
    }
}

/// Credit `amount` to `address` in both balance views.
///
/// The sender is held outside `state` during apply, so a credit to the
/// sender's own address goes to `sender` directly.
pub(crate) fn credit(
    sender: &mut Account,
    state: &mut StateStore<'_>,
    address: &kestrel_types::Address,
    amount: u64,
) -> Result<(), TransactionError> {
    if sender.address == *address {
        add_balance(sender, amount)?;
        return Ok(());
    }
    let mut account = state.get_account(address)?;
    add_balance(&mut account, amount)?;
    state.set_account(account);
    Ok(())
}

/// Reverse a [`credit`].
pub(crate) fn debit(
    sender: &mut Account,
    state: &mut StateStore<'_>,
    address: &kestrel_types::Address,
    amount: u64,
) -> Result<(), TransactionError> {
    if sender.address == *address {
        sub_balance(sender, amount)?;
        return Ok(());
    }
    let mut account = state.get_account(address)?;
    sub_balance(&mut account, amount)?;
    state.set_account(account);
    Ok(())
}

pub(crate) fn add_balance(account: &mut Account, amount: u64) -> Result<(), TransactionError> {
    let overflow = || TransactionError::InvalidAmount(format!("balance overflow on {}", account.address));
    let balance = account.balance.checked_add(amount).ok_or_else(overflow)?;
    let u_balance = account.u_balance.checked_add(amount).ok_or_else(overflow)?;
    account.balance = balance;
    account.u_balance = u_balance;
    Ok(())
}

pub(crate) fn sub_balance(account: &mut Account, amount: u64) -> Result<(), TransactionError> {
    let underflow = || TransactionError::UndoUnderflow(account.address);
    let balance = account.balance.checked_sub(amount).ok_or_else(underflow)?;
    let u_balance = account.u_balance.checked_sub(amount).ok_or_else(underflow)?;
    account.balance = balance;
    account.u_balance = u_balance;
    Ok(())
}
