//! Settlement planning.
//!
//! Turns a set of net balances into a short list of point-to-point transfers
//! that brings every balance to zero, using greedy largest-magnitude
//! matching: the biggest creditor is paid by the biggest debtor, the smaller
//! of the two is zeroed, and the loop repeats.
//!
//! Each round zeroes at least one member, so a plan never has more than
//! `non-zero members - 1` transfers. Ties on magnitude are broken by member
//! id ascending, making the plan independent of input ordering.
//!
//! Plans are advisory. A caller who acts on one records a new [`Payment`]
//! per transfer, see [`Settlement::to_payment`].

use crate::balance::Balance;
use crate::error::{EngineError, Result};
use crate::member::MemberId;
use crate::money::{Currency, Money};
use crate::payment::Payment;
use log::{debug, warn};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// A suggested transfer from a debtor to a creditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub payer: MemberId,
    pub payer_name: String,
    pub recipient: MemberId,
    pub recipient_name: String,

    /// Always positive.
    pub amount: Money,
    pub currency: Currency,
}

impl Settlement {
    /// Converts an accepted suggestion into a payment record.
    pub fn to_payment(
        &self,
        id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Result<Payment> {
        let id = id.into();
        Payment::new(
            id.clone(),
            group_id,
            self.payer.clone(),
            self.recipient.clone(),
            self.amount,
            self.currency.clone(),
        )
        .map_err(|reason| EngineError::InvalidPayment {
            payment: id,
            reason,
        })
    }
}

/// One side of the matching: a creditor or a debtor with the magnitude still
/// outstanding.
struct Party<'a> {
    balance: &'a Balance,
    outstanding: Money,
}

impl Ord for Party<'_> {
    // Max-heap order: larger outstanding first, then lower member id.
    fn cmp(&self, other: &Self) -> Ordering {
        self.outstanding
            .cmp(&other.outstanding)
            .then_with(|| other.balance.member.cmp(&self.balance.member))
    }
}

impl PartialOrd for Party<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Party<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Party<'_> {}

/// Plans the transfers that settle every balance.
///
/// Members within tolerance of zero take no part. The result is ordered as
/// the transfers were chosen.
///
/// # Errors
///
/// - [`EngineError::UnbalancedInput`] if the balances do not net to zero
/// - [`EngineError::CurrencyMismatch`] if the balances mix currencies
/// - [`EngineError::AmountOutOfRange`] if the balances overflow when summed
pub fn plan_settlement(balances: &[Balance]) -> Result<Vec<Settlement>> {
    let Some(first) = balances.first() else {
        return Ok(Vec::new());
    };

    for balance in balances {
        if balance.currency != first.currency {
            return Err(EngineError::CurrencyMismatch {
                record: balance.member.to_string(),
                expected: first.currency.clone(),
                found: balance.currency.clone(),
            });
        }
    }

    let mut residual = Money::ZERO;
    for balance in balances {
        residual = residual
            .checked_add(balance.amount)
            .ok_or_else(|| EngineError::AmountOutOfRange {
                record: balance.member.to_string(),
                amount: balance.amount,
            })?;
    }
    if !residual.is_negligible() {
        warn!("Refusing to plan settlement: balances net to {}", residual);
        return Err(EngineError::UnbalancedInput { residual });
    }

    let mut creditors = BinaryHeap::new();
    let mut debtors = BinaryHeap::new();
    for balance in balances.iter().filter(|b| !b.is_settled()) {
        let party = Party {
            balance,
            outstanding: balance.amount.abs(),
        };
        if balance.amount.is_positive() {
            creditors.push(party);
        } else {
            debtors.push(party);
        }
    }

    let mut settlements = Vec::new();
    loop {
        let (Some(mut creditor), Some(mut debtor)) = (creditors.pop(), debtors.pop()) else {
            break;
        };

        let amount = creditor.outstanding.min(debtor.outstanding);
        debug!(
            "Settlement: {} pays {} {}",
            debtor.balance.member, creditor.balance.member, amount
        );
        settlements.push(Settlement {
            payer: debtor.balance.member.clone(),
            payer_name: debtor.balance.name.clone(),
            recipient: creditor.balance.member.clone(),
            recipient_name: creditor.balance.name.clone(),
            amount,
            currency: first.currency.clone(),
        });

        creditor.outstanding -= amount;
        debtor.outstanding -= amount;
        if !creditor.outstanding.is_negligible() {
            creditors.push(creditor);
        }
        if !debtor.outstanding.is_negligible() {
            debtors.push(debtor);
        }
    }

    if let Some(left) = creditors.peek().or_else(|| debtors.peek()) {
        debug!(
            "Absorbing residual {} for {}",
            left.outstanding, left.balance.member
        );
    }

    Ok(settlements)
}

/// Applies settlements to a balance snapshot and returns the result.
///
/// Each settlement moves its payer up and its recipient down by the amount.
/// Applying a plan from [`plan_settlement`] to the balances it was made from
/// leaves every balance settled.
pub fn apply_settlements(balances: &[Balance], settlements: &[Settlement]) -> Result<Vec<Balance>> {
    let mut updated = balances.to_vec();
    let index: HashMap<MemberId, usize> = updated
        .iter()
        .enumerate()
        .map(|(i, b)| (b.member.clone(), i))
        .collect();

    for settlement in settlements {
        for (member, delta) in [
            (&settlement.payer, settlement.amount),
            (&settlement.recipient, -settlement.amount),
        ] {
            let record = || format!("settlement {} -> {}", settlement.payer, settlement.recipient);
            let balance = index
                .get(member)
                .and_then(|&i| updated.get_mut(i))
                .ok_or_else(|| EngineError::UnknownMemberReference {
                    record: record(),
                    member: member.clone(),
                })?;
            balance.amount = balance.amount.checked_add(delta).ok_or_else(|| {
                EngineError::AmountOutOfRange {
                    record: record(),
                    amount: settlement.amount,
                }
            })?;
        }
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::is_group_settled;
    use std::str::FromStr;

    fn usd() -> Currency {
        Currency::new("USD")
    }

    fn balances(entries: &[(&str, &str)]) -> Vec<Balance> {
        entries
            .iter()
            .map(|(id, amount)| {
                Balance::new(*id, id.to_lowercase(), Money::from_str(amount).unwrap(), usd())
            })
            .collect()
    }

    fn transfers(plan: &[Settlement]) -> Vec<(String, String, String)> {
        plan.iter()
            .map(|s| (s.payer.to_string(), s.recipient.to_string(), s.amount.to_string()))
            .collect()
    }

    fn expected(entries: &[(&str, &str, &str)]) -> Vec<(String, String, String)> {
        entries
            .iter()
            .map(|(p, r, a)| (p.to_string(), r.to_string(), a.to_string()))
            .collect()
    }

    #[test]
    fn test_single_transfer_skips_settled_member() {
        let input = balances(&[("A", "33.33"), ("B", "0"), ("C", "-33.33")]);
        let plan = plan_settlement(&input).unwrap();

        assert_eq!(transfers(&plan), expected(&[("C", "A", "33.33")]));
        assert_eq!(plan[0].payer_name, "c");
        assert_eq!(plan[0].recipient_name, "a");
        assert_eq!(plan[0].currency, usd());
    }

    #[test]
    fn test_greedy_largest_magnitude_matching() {
        let input = balances(&[("A", "40"), ("B", "40"), ("C", "-30"), ("D", "-50")]);
        let plan = plan_settlement(&input).unwrap();

        // A wins the tie with B; after D pays A, C (30) outranks D (10).
        assert_eq!(
            transfers(&plan),
            expected(&[("D", "A", "40.00"), ("C", "B", "30.00"), ("D", "B", "10.00")])
        );
        assert!(is_group_settled(&apply_settlements(&input, &plan).unwrap()));
    }

    #[test]
    fn test_tie_break_is_independent_of_input_order() {
        let forward = balances(&[("m1", "10"), ("m2", "10"), ("m3", "-10"), ("m4", "-10")]);
        let mut backward = forward.clone();
        backward.reverse();

        let a = plan_settlement(&forward).unwrap();
        let b = plan_settlement(&backward).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            transfers(&a),
            expected(&[("m3", "m1", "10.00"), ("m4", "m2", "10.00")])
        );
    }

    #[test]
    fn test_empty_and_settled_inputs() {
        assert!(plan_settlement(&[]).unwrap().is_empty());

        let zeros = balances(&[("A", "0"), ("B", "0")]);
        assert!(plan_settlement(&zeros).unwrap().is_empty());
    }

    #[test]
    fn test_one_cent_debts_are_settled() {
        let input = balances(&[("A", "0.01"), ("B", "-0.01")]);
        let plan = plan_settlement(&input).unwrap();

        assert_eq!(transfers(&plan), expected(&[("B", "A", "0.01")]));
    }

    #[test]
    fn test_unbalanced_input() {
        let input = balances(&[("A", "10"), ("B", "-9.50")]);
        let err = plan_settlement(&input).unwrap_err();

        assert!(err.is_integrity_violation());
        assert!(matches!(
            err,
            EngineError::UnbalancedInput { residual } if residual.to_string() == "0.50"
        ));
    }

    #[test]
    fn test_overflowing_balances_are_rejected() {
        let input = balances(&[
            ("A", "50000000000000000000000000000"),
            ("B", "50000000000000000000000000000"),
        ]);

        assert!(matches!(
            plan_settlement(&input),
            Err(EngineError::AmountOutOfRange { ref record, .. }) if record == "B"
        ));
    }

    #[test]
    fn test_mixed_currency() {
        let mut input = balances(&[("A", "10"), ("B", "-10")]);
        input[1].currency = Currency::new("EUR");

        assert!(matches!(
            plan_settlement(&input),
            Err(EngineError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_minimality_bound() {
        let input = balances(&[
            ("a", "120.15"),
            ("b", "-20.05"),
            ("c", "-33.10"),
            ("d", "0"),
            ("e", "45.00"),
            ("f", "-112.00"),
        ]);
        let plan = plan_settlement(&input).unwrap();
        let non_zero = input.iter().filter(|b| !b.is_settled()).count();

        assert!(plan.len() <= non_zero - 1);
        assert!(plan.iter().all(|s| s.amount.is_positive()));
        assert!(is_group_settled(&apply_settlements(&input, &plan).unwrap()));
    }

    #[test]
    fn test_to_payment() {
        let input = balances(&[("A", "5"), ("B", "-5")]);
        let plan = plan_settlement(&input).unwrap();
        let payment = plan[0].to_payment("p9", "g1").unwrap();

        assert_eq!(payment.id, "p9");
        assert_eq!(payment.payer.as_str(), "B");
        assert_eq!(payment.recipient.as_str(), "A");
        assert_eq!(payment.amount.to_string(), "5.00");
    }

    #[test]
    fn test_apply_unknown_member() {
        let input = balances(&[("A", "5"), ("B", "-5")]);
        let mut plan = plan_settlement(&input).unwrap();
        plan[0].payer = "Z".into();

        assert!(matches!(
            apply_settlements(&input, &plan),
            Err(EngineError::UnknownMemberReference { .. })
        ));
    }
}
