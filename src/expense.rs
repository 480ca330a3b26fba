//! Expense model: split methods, raw split input and validated shares.

use crate::error::SplitError;
use crate::member::MemberId;
use crate::money::{Currency, Money};
use crate::split;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The rule by which an expense's total is divided among participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    Equal,
    Percentage,
    Exact,
    Shares,
}

impl FromStr for SplitMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal" => Ok(SplitMethod::Equal),
            "percentage" => Ok(SplitMethod::Percentage),
            "exact" => Ok(SplitMethod::Exact),
            "shares" => Ok(SplitMethod::Shares),
            other => Err(format!("unknown split method '{}'", other)),
        }
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Percentage => "percentage",
            SplitMethod::Exact => "exact",
            SplitMethod::Shares => "shares",
        };
        f.write_str(name)
    }
}

/// Raw participant input as entered by the user, one variant per split method.
///
/// Participant order is significant: `Equal` hands residual cents to the
/// first participants in this order.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitInput {
    Equal(Vec<MemberId>),

    /// Percentage per participant; must total 100.
    Percentage(Vec<(MemberId, Decimal)>),

    /// Exact amount per participant; must total the expense amount.
    Exact(Vec<(MemberId, Money)>),

    /// Integer share count per participant.
    Shares(Vec<(MemberId, u32)>),
}

impl SplitInput {
    pub fn method(&self) -> SplitMethod {
        match self {
            SplitInput::Equal(_) => SplitMethod::Equal,
            SplitInput::Percentage(_) => SplitMethod::Percentage,
            SplitInput::Exact(_) => SplitMethod::Exact,
            SplitInput::Shares(_) => SplitMethod::Shares,
        }
    }

    /// Participants in input order.
    pub fn participants(&self) -> Vec<&MemberId> {
        match self {
            SplitInput::Equal(members) => members.iter().collect(),
            SplitInput::Percentage(entries) => entries.iter().map(|(m, _)| m).collect(),
            SplitInput::Exact(entries) => entries.iter().map(|(m, _)| m).collect(),
            SplitInput::Shares(entries) => entries.iter().map(|(m, _)| m).collect(),
        }
    }
}

/// One participant's portion of an expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantShare {
    pub member: MemberId,

    /// Amount this participant owes towards the expense. Never negative.
    pub amount: Money,

    /// `amount / total * 100`, rounded to 2 places. Display only.
    pub percentage: Decimal,
}

/// A validated expense.
///
/// Built through [`Expense::new`], which runs the split validator, so a stored
/// `Expense` satisfies `sum(shares) == total` within tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expense {
    pub id: String,
    pub group_id: String,

    /// Member who fronted the money. Need not be a participant.
    pub payer: MemberId,
    pub total: Money,
    pub currency: Currency,
    pub method: SplitMethod,
    pub shares: Vec<ParticipantShare>,
}

impl Expense {
    /// Builds an expense from raw split input, computing and validating shares.
    pub fn new(
        id: impl Into<String>,
        group_id: impl Into<String>,
        payer: impl Into<MemberId>,
        total: Money,
        currency: Currency,
        input: &SplitInput,
    ) -> std::result::Result<Self, SplitError> {
        let shares = split::compute_shares(total, input)?;
        let expense = Expense {
            id: id.into(),
            group_id: group_id.into(),
            payer: payer.into(),
            total,
            currency,
            method: input.method(),
            shares,
        };
        split::validate(&expense)?;
        Ok(expense)
    }

    /// Sum of all participant share amounts.
    pub fn share_total(&self) -> Money {
        self.shares.iter().map(|s| s.amount).sum()
    }

    pub fn share_of(&self, member: &MemberId) -> Option<Money> {
        self.shares
            .iter()
            .find(|s| &s.member == member)
            .map(|s| s.amount)
    }
}

/// An expense as submitted to a [`crate::GroupLedger`], before group id and
/// currency are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseDraft {
    pub id: String,
    pub payer: MemberId,
    pub total: Money,
    pub split: SplitInput,
}

impl ExpenseDraft {
    pub fn new(
        id: impl Into<String>,
        payer: impl Into<MemberId>,
        total: Money,
        split: SplitInput,
    ) -> Self {
        ExpenseDraft {
            id: id.into(),
            payer: payer.into(),
            total,
            split,
        }
    }
}
