//! Error types for split validation, balance computation and settlement planning.

use crate::member::MemberId;
use crate::money::{Currency, Money};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Why an expense's split was rejected at write time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    /// Shares (or percentages) do not add up to the expected total
    #[error("shares sum to {actual}, expected {expected}")]
    SumMismatch { expected: Decimal, actual: Decimal },

    /// A participant was given a negative share
    #[error("negative share for member {member}")]
    NegativeShare { member: MemberId },

    #[error("expense has no participants")]
    NoParticipants,

    #[error("expense total {total} is not positive")]
    NonPositiveTotal { total: Money },

    #[error("member {member} appears more than once in the split")]
    DuplicateParticipant { member: MemberId },

    /// Every participant of a `shares` split has a count of zero
    #[error("share counts sum to zero")]
    ZeroShareCount,

    /// The total or an exact share exceeds [`Money::MAX`]
    #[error("amount {amount} is out of range")]
    AmountOutOfRange { amount: Money },
}

/// Why a payment record was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment amount {amount} is not positive")]
    NonPositiveAmount { amount: Money },

    #[error("payer and recipient are both {member}")]
    SelfPayment { member: MemberId },

    #[error("payment amount {amount} is out of range")]
    AmountOutOfRange { amount: Money },
}

/// Errors that can occur during engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Expense rejected by the split validator
    #[error("Invalid split for expense {expense}: {reason}")]
    InvalidSplit { expense: String, reason: SplitError },

    /// Payment rejected on creation
    #[error("Invalid payment {payment}: {reason}")]
    InvalidPayment { payment: String, reason: PaymentError },

    /// An expense or payment names a member missing from the group
    #[error("Record {record} references unknown member {member}")]
    UnknownMemberReference { record: String, member: MemberId },

    /// A stored expense whose shares do not sum to its total
    #[error("Expense {expense} is inconsistent: shares sum to {actual}, total is {expected}")]
    InconsistentExpense {
        expense: String,
        expected: Money,
        actual: Money,
    },

    /// Balances handed to the planner do not net to zero
    #[error("Balances do not net to zero (residual {residual})")]
    UnbalancedInput { residual: Money },

    /// A record carries a different currency than the computation
    #[error("Record {record} is in {found}, expected {expected}")]
    CurrencyMismatch {
        record: String,
        expected: Currency,
        found: Currency,
    },

    /// An amount too large to add up safely
    #[error("Record {record} carries an out-of-range amount {amount}")]
    AmountOutOfRange { record: String, amount: Money },

    #[error("Member {member} is listed more than once")]
    DuplicateMember { member: MemberId },

    /// Duplicate expense or payment ID
    #[error("Duplicate record ID {id}")]
    DuplicateRecordId { id: String },

    #[error("Unknown record {id}")]
    UnknownRecord { id: String },

    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed ledger row
    #[error("Invalid record at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Missing input file argument
    #[error("Missing input file argument. Usage: split-engine <ledger.csv>")]
    MissingArgument,
}

impl EngineError {
    /// Returns `true` for data-integrity failures that point at an upstream
    /// bug rather than at bad user input.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            EngineError::InconsistentExpense { .. } | EngineError::UnbalancedInput { .. }
        )
    }
}
