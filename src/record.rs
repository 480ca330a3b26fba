//! Ledger CSV rows and their parsing into typed records.
//!
//! A ledger file describes one group:
//!
//! ```text
//! type,id,member,target,amount,detail
//! group,trip,,,,EUR
//! member,alice,,,,Alice
//! expense,e1,alice,,100.00,equal
//! share,e1,alice,,,
//! payment,p1,bob,alice,20.00,
//! ```

use crate::error::{EngineError, Result, SplitError};
use crate::expense::{ExpenseDraft, SplitInput, SplitMethod};
use crate::member::{Member, MemberId};
use crate::money::{Currency, Money};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Raw ledger row as read from CSV.
///
/// Only `type` and `id` are present on every row; the meaning of the other
/// columns depends on the row type.
#[derive(Debug, Deserialize)]
pub struct LedgerRecord {
    /// Row type: group, member, expense, share, payment
    #[serde(rename = "type")]
    pub kind: String,

    /// Group, member, expense or payment id. For `share` rows, the expense id.
    pub id: String,

    /// Payer for expenses and payments, participant for shares
    pub member: Option<String>,

    /// Recipient for payments
    pub target: Option<String>,

    /// Expense total, payment amount, or raw share value
    pub amount: Option<String>,

    /// Currency for the group row, display name for members, split method for expenses
    pub detail: Option<String>,
}

/// A parsed ledger row.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerRow {
    Group {
        id: String,
        currency: Currency,
    },
    Member(Member),
    Expense {
        id: String,
        payer: MemberId,
        total: Money,
        method: SplitMethod,
    },
    Share {
        expense: String,
        member: MemberId,
        value: Option<String>,
    },
    Payment {
        id: String,
        payer: MemberId,
        recipient: MemberId,
        amount: Money,
    },
}

impl LedgerRecord {
    /// Parses the raw CSV record into a typed row.
    ///
    /// Returns a human-readable message describing the first problem found.
    pub fn parse(&self) -> std::result::Result<LedgerRow, String> {
        let kind = self.kind.trim().to_lowercase();
        let id = self.id.trim();
        if id.is_empty() {
            return Err(format!("{} row has no id", kind));
        }

        match kind.as_str() {
            "group" => {
                let currency = Currency::new(required(&self.detail, "currency")?);
                if !currency.is_well_formed() {
                    return Err(format!("invalid currency code '{}'", currency));
                }
                Ok(LedgerRow::Group {
                    id: id.to_string(),
                    currency,
                })
            }
            "member" => {
                let name = optional(&self.detail).unwrap_or(id);
                Ok(LedgerRow::Member(Member::new(id, name)))
            }
            "expense" => Ok(LedgerRow::Expense {
                id: id.to_string(),
                payer: required(&self.member, "payer")?.into(),
                total: parse_money(required(&self.amount, "total")?)?,
                method: required(&self.detail, "split method")?.parse()?,
            }),
            "share" => Ok(LedgerRow::Share {
                expense: id.to_string(),
                member: required(&self.member, "participant")?.into(),
                value: optional(&self.amount).map(str::to_string),
            }),
            "payment" => Ok(LedgerRow::Payment {
                id: id.to_string(),
                payer: required(&self.member, "payer")?.into(),
                recipient: required(&self.target, "recipient")?.into(),
                amount: parse_money(required(&self.amount, "amount")?)?,
            }),
            other => Err(format!("unknown row type '{}'", other)),
        }
    }
}

fn optional(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(field: &'a Option<String>, name: &str) -> std::result::Result<&'a str, String> {
    optional(field).ok_or_else(|| format!("missing {}", name))
}

fn parse_money(raw: &str) -> std::result::Result<Money, String> {
    let amount = Money::from_str(raw).map_err(|e| format!("invalid amount '{}': {}", raw, e))?;
    if !amount.is_in_range() {
        return Err(format!("amount '{}' exceeds {}", raw, Money::MAX));
    }
    Ok(amount)
}

fn parse_decimal(raw: &str) -> std::result::Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|e| format!("invalid value '{}': {}", raw, e))
}

/// A `share` row waiting for its expense to be assembled.
#[derive(Debug, Clone)]
pub struct PendingShare {
    pub row: usize,
    pub member: MemberId,
    pub value: Option<String>,
}

/// An expense collected from CSV rows. Its split is only known once every
/// `share` row has been read.
#[derive(Debug, Clone)]
pub struct PendingExpense {
    pub row: usize,
    pub id: String,
    pub payer: MemberId,
    pub total: Money,
    pub method: SplitMethod,
    pub shares: Vec<PendingShare>,
}

impl PendingExpense {
    /// Interprets the collected share values according to the split method.
    pub fn into_draft(self) -> Result<ExpenseDraft> {
        let split = match self.method {
            SplitMethod::Equal => {
                SplitInput::Equal(self.shares.iter().map(|s| s.member.clone()).collect())
            }
            SplitMethod::Percentage => SplitInput::Percentage(share_values(&self.shares, |s| {
                parse_decimal(share_value(s)?).map_err(at(s))
            })?),
            SplitMethod::Exact => SplitInput::Exact(share_values(&self.shares, |s| {
                parse_money(share_value(s)?).map_err(at(s))
            })?),
            SplitMethod::Shares => {
                SplitInput::Shares(share_values(&self.shares, |s| share_count(&self.id, s))?)
            }
        };

        Ok(ExpenseDraft::new(self.id, self.payer, self.total, split))
    }
}

fn share_values<T>(
    shares: &[PendingShare],
    parse: impl Fn(&PendingShare) -> Result<T>,
) -> Result<Vec<(MemberId, T)>> {
    let mut values = Vec::with_capacity(shares.len());
    for share in shares {
        values.push((share.member.clone(), parse(share)?));
    }
    Ok(values)
}

fn at(share: &PendingShare) -> impl Fn(String) -> EngineError + '_ {
    move |message| EngineError::InvalidRecord {
        row: share.row,
        message,
    }
}

fn share_value(share: &PendingShare) -> Result<&str> {
    share.value.as_deref().ok_or_else(|| EngineError::InvalidRecord {
        row: share.row,
        message: format!("missing share value for {}", share.member),
    })
}

fn share_count(expense: &str, share: &PendingShare) -> Result<u32> {
    let count = parse_decimal(share_value(share)?).map_err(at(share))?;
    if count < Decimal::ZERO {
        return Err(EngineError::InvalidSplit {
            expense: expense.to_string(),
            reason: SplitError::NegativeShare {
                member: share.member.clone(),
            },
        });
    }
    if !count.fract().is_zero() {
        return Err(EngineError::InvalidRecord {
            row: share.row,
            message: format!("share count {} is not a whole number", count),
        });
    }
    count.to_u32().ok_or_else(|| EngineError::InvalidRecord {
        row: share.row,
        message: format!("share count {} is too large", count),
    })
}
