//! Balance computation.
//!
//! Aggregates a group's expenses and payments into one signed net balance per
//! member. Positive means the group owes the member; negative means the
//! member owes the group.
//!
//! # Invariants
//!
//! - Every member passed in appears exactly once in the output, even with no
//!   activity.
//! - Balances sum to zero: every credit has a matching debit.
//! - Output is sorted by member id, so input ordering never shows through.
//!
//! Expenses are assumed to have passed the split validator when they were
//! written. Only the cheap share-sum check is repeated here.

use crate::error::{EngineError, Result};
use crate::expense::Expense;
use crate::member::{Member, MemberId};
use crate::money::{Currency, Money};
use crate::payment::Payment;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// A member's net position within a group at one point in time.
///
/// Balances are immutable snapshots: every computation produces new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub member: MemberId,
    pub name: String,

    /// Signed net amount: credits minus debits.
    pub amount: Money,
    pub currency: Currency,
}

impl Balance {
    pub fn new(
        member: impl Into<MemberId>,
        name: impl Into<String>,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Balance {
            member: member.into(),
            name: name.into(),
            amount,
            currency,
        }
    }

    /// Returns `true` if the balance is within tolerance of zero.
    pub fn is_settled(&self) -> bool {
        self.amount.is_negligible()
    }
}

/// Returns `true` if every member's balance is within tolerance of zero.
pub fn is_group_settled(balances: &[Balance]) -> bool {
    balances.iter().all(Balance::is_settled)
}

struct Tally<'a> {
    name: &'a str,
    amount: Money,
}

/// Computes every member's net balance from the group's expenses and payments.
///
/// For each expense the payer is credited the full total and each participant
/// is debited their share. For each payment the payer's balance rises and the
/// recipient's falls by the amount paid.
///
/// # Errors
///
/// The whole computation is aborted, never partially returned, on:
///
/// - [`EngineError::DuplicateMember`] if `members` names an id twice
/// - [`EngineError::UnknownMemberReference`] if a record names a member not in `members`
/// - [`EngineError::InconsistentExpense`] if an expense's shares do not sum to its total
/// - [`EngineError::CurrencyMismatch`] if a record is not in `currency`
/// - [`EngineError::AmountOutOfRange`] if a record amount exceeds [`Money::MAX`]
///   or a running balance overflows
pub fn compute_balances(
    currency: &Currency,
    members: &[Member],
    expenses: &[Expense],
    payments: &[Payment],
) -> Result<Vec<Balance>> {
    let mut tallies: BTreeMap<&MemberId, Tally<'_>> = BTreeMap::new();
    for member in members {
        let tally = Tally {
            name: &member.name,
            amount: Money::ZERO,
        };
        if tallies.insert(&member.id, tally).is_some() {
            return Err(EngineError::DuplicateMember {
                member: member.id.clone(),
            });
        }
    }

    for expense in expenses {
        apply_expense(&mut tallies, currency, expense)?;
    }
    for payment in payments {
        apply_payment(&mut tallies, currency, payment)?;
    }

    Ok(tallies
        .into_iter()
        .map(|(member, tally)| Balance {
            member: member.clone(),
            name: tally.name.to_string(),
            amount: Money::new(tally.amount.as_decimal()),
            currency: currency.clone(),
        })
        .collect())
}

fn apply_expense(
    tallies: &mut BTreeMap<&MemberId, Tally<'_>>,
    currency: &Currency,
    expense: &Expense,
) -> Result<()> {
    ensure_currency(currency, &expense.id, &expense.currency)?;
    ensure_in_range(&expense.id, expense.total)?;
    for share in &expense.shares {
        ensure_in_range(&expense.id, share.amount)?;
    }

    let share_total = expense.share_total();
    if !(share_total - expense.total).is_negligible() {
        return Err(EngineError::InconsistentExpense {
            expense: expense.id.clone(),
            expected: expense.total,
            actual: share_total,
        });
    }

    adjust(tallies, &expense.id, &expense.payer, expense.total)?;
    for share in &expense.shares {
        adjust(tallies, &expense.id, &share.member, -share.amount)?;
    }

    debug!(
        "Expense {}: credited {} to {}, debited {} participants",
        expense.id,
        expense.total,
        expense.payer,
        expense.shares.len()
    );
    Ok(())
}

fn apply_payment(
    tallies: &mut BTreeMap<&MemberId, Tally<'_>>,
    currency: &Currency,
    payment: &Payment,
) -> Result<()> {
    ensure_currency(currency, &payment.id, &payment.currency)?;
    ensure_in_range(&payment.id, payment.amount)?;

    // Paying down a debt: the payer moves up, the recipient down.
    adjust(tallies, &payment.id, &payment.payer, payment.amount)?;
    adjust(tallies, &payment.id, &payment.recipient, -payment.amount)?;

    debug!(
        "Payment {}: {} paid {} {}",
        payment.id, payment.payer, payment.recipient, payment.amount
    );
    Ok(())
}

fn adjust(
    tallies: &mut BTreeMap<&MemberId, Tally<'_>>,
    record: &str,
    member: &MemberId,
    delta: Money,
) -> Result<()> {
    let tally = tallies
        .get_mut(member)
        .ok_or_else(|| EngineError::UnknownMemberReference {
            record: record.to_string(),
            member: member.clone(),
        })?;
    tally.amount = tally
        .amount
        .checked_add(delta)
        .ok_or_else(|| EngineError::AmountOutOfRange {
            record: record.to_string(),
            amount: delta.abs(),
        })?;
    Ok(())
}

fn ensure_in_range(record: &str, amount: Money) -> Result<()> {
    if !amount.is_in_range() {
        return Err(EngineError::AmountOutOfRange {
            record: record.to_string(),
            amount,
        });
    }
    Ok(())
}

fn ensure_currency(expected: &Currency, record: &str, found: &Currency) -> Result<()> {
    if expected != found {
        return Err(EngineError::CurrencyMismatch {
            record: record.to_string(),
            expected: expected.clone(),
            found: found.clone(),
        });
    }
    Ok(())
}
