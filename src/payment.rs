//! Direct payments between members.

use crate::error::PaymentError;
use crate::member::MemberId;
use crate::money::{Currency, Money};
use serde::Serialize;

/// A recorded transfer from one member to another, independent of any expense.
///
/// # Invariants
///
/// - `0 < amount <= Money::MAX`
/// - `payer != recipient`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: String,
    pub group_id: String,
    pub payer: MemberId,
    pub recipient: MemberId,
    pub amount: Money,
    pub currency: Currency,
}

impl Payment {
    /// Creates a payment, enforcing its invariants.
    pub fn new(
        id: impl Into<String>,
        group_id: impl Into<String>,
        payer: impl Into<MemberId>,
        recipient: impl Into<MemberId>,
        amount: Money,
        currency: Currency,
    ) -> std::result::Result<Self, PaymentError> {
        let payer = payer.into();
        let recipient = recipient.into();

        if !amount.is_positive() {
            return Err(PaymentError::NonPositiveAmount { amount });
        }
        if !amount.is_in_range() {
            return Err(PaymentError::AmountOutOfRange { amount });
        }
        if payer == recipient {
            return Err(PaymentError::SelfPayment { member: payer });
        }

        Ok(Payment {
            id: id.into(),
            group_id: group_id.into(),
            payer,
            recipient,
            amount,
            currency,
        })
    }
}
