//! Split validation.
//!
//! Turns raw [`SplitInput`] into per-participant shares and checks the
//! invariants every stored [`Expense`] must satisfy. Runs when an expense is
//! created or edited, never at balance-computation time.
//!
//! # Rounding
//!
//! All arithmetic happens in integer minor units:
//!
//! - `equal`: `total / n` each; the `total % n` leftover cents go one each to
//!   the first participants in input order.
//! - `percentage` and `shares`: largest-remainder apportionment. Every
//!   participant gets the floor of their exact portion, then leftover cents
//!   go to the largest fractional remainders, ties broken by member id.
//! - `exact`: no redistribution. A mismatch is an error.

use crate::error::SplitError;
use crate::expense::{Expense, ParticipantShare, SplitInput};
use crate::member::MemberId;
use crate::money::Money;
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;

type SplitResult<T> = std::result::Result<T, SplitError>;

/// Tolerance on the percentage sum: 99.99 through 100.01 are accepted.
const PERCENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

fn hundred() -> Decimal {
    Decimal::from(100)
}

/// Computes participant shares for `total` according to the split input.
///
/// Shares are returned in participant input order and always sum to `total`
/// exactly.
pub fn compute_shares(total: Money, input: &SplitInput) -> SplitResult<Vec<ParticipantShare>> {
    if !total.is_positive() {
        return Err(SplitError::NonPositiveTotal { total });
    }
    let units = total_units(total)?;

    let participants = input.participants();
    if participants.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    ensure_unique(participants.iter().copied())?;

    let amounts = match input {
        SplitInput::Equal(members) => split_equal(units, members.len()),
        SplitInput::Percentage(entries) => split_percentage(units, entries)?,
        SplitInput::Exact(entries) => split_exact(total, entries)?,
        SplitInput::Shares(entries) => split_shares(units, entries)?,
    };
    debug!(
        "Split {} {} over {} participants",
        input.method(),
        total,
        amounts.len()
    );

    Ok(participants
        .into_iter()
        .zip(amounts)
        .map(|(member, amount)| ParticipantShare {
            member: member.clone(),
            amount,
            percentage: percentage_of(amount, total),
        })
        .collect())
}

/// Checks the invariants of a stored expense.
///
/// This is method-agnostic: it looks only at the computed shares, so it also
/// guards expenses that were edited after creation.
pub fn validate(expense: &Expense) -> SplitResult<()> {
    if !expense.total.is_positive() {
        return Err(SplitError::NonPositiveTotal {
            total: expense.total,
        });
    }
    total_units(expense.total)?;
    if expense.shares.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    ensure_unique(expense.shares.iter().map(|s| &s.member))?;

    for share in &expense.shares {
        if share.amount.is_negative() || share.percentage < Decimal::ZERO {
            return Err(SplitError::NegativeShare {
                member: share.member.clone(),
            });
        }
        if !share.amount.is_in_range() {
            return Err(SplitError::AmountOutOfRange {
                amount: share.amount,
            });
        }
    }

    let sum = expense.share_total();
    let overshoot = expense.shares.iter().any(|s| s.percentage > hundred());
    if overshoot || !(sum - expense.total).is_negligible() {
        return Err(SplitError::SumMismatch {
            expected: expense.total.as_decimal(),
            actual: sum.as_decimal(),
        });
    }

    Ok(())
}

fn ensure_unique<'a>(members: impl Iterator<Item = &'a MemberId>) -> SplitResult<()> {
    let mut seen = HashSet::new();
    for member in members {
        if !seen.insert(member) {
            return Err(SplitError::DuplicateParticipant {
                member: member.clone(),
            });
        }
    }
    Ok(())
}

/// The total in minor units, once it is known to be within [`Money::MAX`].
fn total_units(total: Money) -> SplitResult<i64> {
    if !total.is_in_range() {
        return Err(SplitError::AmountOutOfRange { amount: total });
    }
    total
        .minor_units()
        .ok_or(SplitError::AmountOutOfRange { amount: total })
}

fn split_equal(units: i64, count: usize) -> Vec<Money> {
    let n = count as i64;
    let base = units / n;
    let leftover = units % n;

    (0..n)
        .map(|i| Money::from_minor_units(base + i64::from(i < leftover)))
        .collect()
}

fn split_percentage(units: i64, entries: &[(MemberId, Decimal)]) -> SplitResult<Vec<Money>> {
    for (member, percent) in entries {
        if *percent < Decimal::ZERO {
            return Err(SplitError::NegativeShare {
                member: member.clone(),
            });
        }
    }

    let sum = entries
        .iter()
        .fold(Decimal::ZERO, |acc, (_, p)| acc.saturating_add(*p));
    if (sum - hundred()).abs() > PERCENT_TOLERANCE {
        return Err(SplitError::SumMismatch {
            expected: hundred(),
            actual: sum,
        });
    }

    let weights: Vec<(&MemberId, Decimal)> = entries.iter().map(|(m, p)| (m, *p)).collect();
    Ok(apportion(units, &weights))
}

fn split_exact(total: Money, entries: &[(MemberId, Money)]) -> SplitResult<Vec<Money>> {
    for (member, amount) in entries {
        if amount.is_negative() {
            return Err(SplitError::NegativeShare {
                member: member.clone(),
            });
        }
        if !amount.is_in_range() {
            return Err(SplitError::AmountOutOfRange { amount: *amount });
        }
    }

    let sum: Money = entries.iter().map(|(_, a)| *a).sum();
    if !(sum - total).is_negligible() {
        return Err(SplitError::SumMismatch {
            expected: total.as_decimal(),
            actual: sum.as_decimal(),
        });
    }

    Ok(entries.iter().map(|(_, a)| *a).collect())
}

fn split_shares(units: i64, entries: &[(MemberId, u32)]) -> SplitResult<Vec<Money>> {
    if entries.iter().all(|(_, count)| *count == 0) {
        return Err(SplitError::ZeroShareCount);
    }

    let weights: Vec<(&MemberId, Decimal)> = entries
        .iter()
        .map(|(m, count)| (m, Decimal::from(*count)))
        .collect();
    Ok(apportion(units, &weights))
}

/// Largest-remainder apportionment of `units` minor units in proportion to
/// `weights`.
///
/// Weights are normalised by their sum, so they need not add up to exactly
/// 100; the result always sums to `units`.
fn apportion(units: i64, weights: &[(&MemberId, Decimal)]) -> Vec<Money> {
    let total_units = Decimal::from(units);
    let weight_sum: Decimal = weights.iter().map(|(_, w)| *w).sum();

    let mut floors = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (_, weight) in weights {
        let exact = total_units * *weight / weight_sum;
        let floor = exact.floor();
        floors.push(floor.to_i64().unwrap_or(0));
        remainders.push(exact - floor);
    }

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        remainders[b]
            .cmp(&remainders[a])
            .then_with(|| weights[a].0.cmp(weights[b].0))
    });

    // Leftover is below the participant count; cycle anyway in case the
    // division lost precision.
    let leftover = units - floors.iter().sum::<i64>();
    for k in 0..leftover.max(0) as usize {
        floors[order[k % order.len()]] += 1;
    }

    floors.into_iter().map(Money::from_minor_units).collect()
}

fn percentage_of(amount: Money, total: Money) -> Decimal {
    (amount.as_decimal() * hundred() / total.as_decimal())
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ids(names: &[&str]) -> Vec<MemberId> {
        names.iter().map(|n| MemberId::from(*n)).collect()
    }

    fn amounts(shares: &[ParticipantShare]) -> Vec<String> {
        shares.iter().map(|s| s.amount.to_string()).collect()
    }

    #[test]
    fn test_equal_split_gives_first_participant_the_extra_cent() {
        let input = SplitInput::Equal(ids(&["A", "B", "C"]));
        let shares = compute_shares(money("100.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["33.34", "33.33", "33.33"]);
        assert_eq!(shares[0].percentage, dec("33.34"));
    }

    #[test]
    fn test_equal_split_follows_input_order_not_id_order() {
        let input = SplitInput::Equal(ids(&["z", "y", "x", "w"]));
        let shares = compute_shares(money("0.10"), &input).unwrap();

        assert_eq!(amounts(&shares), ["0.03", "0.03", "0.02", "0.02"]);
    }

    #[test]
    fn test_equal_split_single_participant() {
        let input = SplitInput::Equal(ids(&["solo"]));
        let shares = compute_shares(money("12.34"), &input).unwrap();

        assert_eq!(amounts(&shares), ["12.34"]);
        assert_eq!(shares[0].percentage, dec("100"));
    }

    #[test]
    fn test_percentage_split_exact() {
        let input = SplitInput::Percentage(vec![
            ("A".into(), dec("60")),
            ("B".into(), dec("25")),
            ("C".into(), dec("15")),
        ]);
        let shares = compute_shares(money("100.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["60.00", "25.00", "15.00"]);
    }

    #[test]
    fn test_percentage_split_residual_goes_to_largest_remainder() {
        // 10.01 * 50% = 5.005 each; tie on remainder, lowest id wins.
        let input =
            SplitInput::Percentage(vec![("b".into(), dec("50")), ("a".into(), dec("50"))]);
        let shares = compute_shares(money("10.01"), &input).unwrap();

        assert_eq!(amounts(&shares), ["5.00", "5.01"]);
    }

    #[test]
    fn test_percentage_split_accepts_thirds_within_tolerance() {
        let input = SplitInput::Percentage(vec![
            ("A".into(), dec("33.33")),
            ("B".into(), dec("33.33")),
            ("C".into(), dec("33.33")),
        ]);
        let shares = compute_shares(money("100.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["33.34", "33.33", "33.33"]);
    }

    #[test]
    fn test_percentage_split_rejects_bad_sum() {
        let input =
            SplitInput::Percentage(vec![("A".into(), dec("60")), ("B".into(), dec("30"))]);
        let err = compute_shares(money("100.00"), &input).unwrap_err();

        assert_eq!(
            err,
            SplitError::SumMismatch {
                expected: dec("100"),
                actual: dec("90"),
            }
        );
    }

    #[test]
    fn test_percentage_split_rejects_negative() {
        let input =
            SplitInput::Percentage(vec![("A".into(), dec("110")), ("B".into(), dec("-10"))]);
        let err = compute_shares(money("100.00"), &input).unwrap_err();

        assert_eq!(err, SplitError::NegativeShare { member: "B".into() });
    }

    #[test]
    fn test_exact_split_mismatch_is_not_corrected() {
        let input =
            SplitInput::Exact(vec![("A".into(), money("50.00")), ("B".into(), money("49.00"))]);
        let err = compute_shares(money("100.00"), &input).unwrap_err();

        assert_eq!(
            err,
            SplitError::SumMismatch {
                expected: dec("100.00"),
                actual: dec("99.00"),
            }
        );
    }

    #[test]
    fn test_exact_split_keeps_amounts() {
        let input =
            SplitInput::Exact(vec![("A".into(), money("70.25")), ("B".into(), money("29.75"))]);
        let shares = compute_shares(money("100.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["70.25", "29.75"]);
    }

    #[test]
    fn test_exact_split_allows_zero_share() {
        let input =
            SplitInput::Exact(vec![("A".into(), money("100.00")), ("B".into(), money("0"))]);
        let shares = compute_shares(money("100.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["100.00", "0.00"]);
    }

    #[test]
    fn test_shares_split() {
        let input = SplitInput::Shares(vec![("A".into(), 1), ("B".into(), 2)]);
        let shares = compute_shares(money("100.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["33.33", "66.67"]);
    }

    #[test]
    fn test_shares_split_tie_break_by_member_id() {
        let input = SplitInput::Shares(vec![("c".into(), 1), ("b".into(), 1), ("a".into(), 1)]);
        let shares = compute_shares(money("1.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["0.33", "0.33", "0.34"]);
    }

    #[test]
    fn test_shares_split_zero_count_member_gets_nothing() {
        let input = SplitInput::Shares(vec![("a".into(), 0), ("b".into(), 3)]);
        let shares = compute_shares(money("10.00"), &input).unwrap();

        assert_eq!(amounts(&shares), ["0.00", "10.00"]);
    }

    #[test]
    fn test_shares_split_all_zero() {
        let input = SplitInput::Shares(vec![("a".into(), 0), ("b".into(), 0)]);
        let err = compute_shares(money("10.00"), &input).unwrap_err();

        assert_eq!(err, SplitError::ZeroShareCount);
    }

    #[test]
    fn test_rejects_non_positive_total() {
        let input = SplitInput::Equal(ids(&["A"]));

        assert!(matches!(
            compute_shares(Money::ZERO, &input),
            Err(SplitError::NonPositiveTotal { .. })
        ));
        assert!(matches!(
            compute_shares(money("-5"), &input),
            Err(SplitError::NonPositiveTotal { .. })
        ));
    }

    #[test]
    fn test_rejects_no_participants() {
        let input = SplitInput::Equal(Vec::new());

        assert_eq!(
            compute_shares(money("5"), &input).unwrap_err(),
            SplitError::NoParticipants
        );
    }

    #[test]
    fn test_rejects_duplicate_participant() {
        let input = SplitInput::Equal(ids(&["A", "B", "A"]));

        assert_eq!(
            compute_shares(money("5"), &input).unwrap_err(),
            SplitError::DuplicateParticipant { member: "A".into() }
        );
    }

    #[test]
    fn test_validate_catches_tampered_shares() {
        let input = SplitInput::Equal(ids(&["A", "B"]));
        let mut expense =
            Expense::new("e1", "g1", "A", money("10.00"), Currency::new("USD"), &input).unwrap();
        assert!(validate(&expense).is_ok());

        expense.shares[1].amount = money("4.00");
        assert!(matches!(
            validate(&expense),
            Err(SplitError::SumMismatch { .. })
        ));

        expense.shares[1].amount = money("-5.00");
        assert_eq!(
            validate(&expense).unwrap_err(),
            SplitError::NegativeShare { member: "B".into() }
        );
    }

    #[test]
    fn test_validate_reports_share_sum_for_percentage_over_hundred() {
        let input = SplitInput::Exact(vec![("A".into(), money("10.00")), ("B".into(), money("0"))]);
        let mut expense =
            Expense::new("e1", "g1", "A", money("10.00"), Currency::new("USD"), &input).unwrap();

        expense.shares[0].percentage = dec("150");
        assert_eq!(
            validate(&expense).unwrap_err(),
            SplitError::SumMismatch {
                expected: dec("10.00"),
                actual: dec("10.00"),
            }
        );

        expense.shares[0].amount = money("15.00");
        assert_eq!(
            validate(&expense).unwrap_err(),
            SplitError::SumMismatch {
                expected: dec("10.00"),
                actual: dec("15.00"),
            }
        );
    }

    #[test]
    fn test_rejects_out_of_range_amounts() {
        let pair = SplitInput::Equal(ids(&["A", "B"]));
        let huge = money("7922816251426433759354395033");

        assert_eq!(
            compute_shares(huge, &pair).unwrap_err(),
            SplitError::AmountOutOfRange { amount: huge }
        );
        assert!(matches!(
            compute_shares(money("1000000000000.01"), &pair),
            Err(SplitError::AmountOutOfRange { .. })
        ));

        let shares = compute_shares(Money::MAX, &pair).unwrap();
        assert_eq!(amounts(&shares), ["500000000000.00", "500000000000.00"]);

        let big = money("50000000000000000000000000000");
        let exact = SplitInput::Exact(vec![("A".into(), big), ("B".into(), big)]);
        assert_eq!(
            compute_shares(money("100"), &exact).unwrap_err(),
            SplitError::AmountOutOfRange { amount: big }
        );

        let percentage = SplitInput::Percentage(vec![
            ("A".into(), dec("50000000000000000000000000000")),
            ("B".into(), dec("50000000000000000000000000000")),
        ]);
        assert!(matches!(
            compute_shares(money("100"), &percentage),
            Err(SplitError::SumMismatch { .. })
        ));
    }

    #[test]
    fn test_split_sum_invariant_across_methods() {
        let total = money("987.65");
        let inputs = [
            SplitInput::Equal(ids(&["a", "b", "c", "d", "e", "f", "g"])),
            SplitInput::Percentage(vec![
                ("a".into(), dec("12.5")),
                ("b".into(), dec("33.3")),
                ("c".into(), dec("54.2")),
            ]),
            SplitInput::Exact(vec![("a".into(), money("900")), ("b".into(), money("87.65"))]),
            SplitInput::Shares(vec![("a".into(), 3), ("b".into(), 7), ("c".into(), 11)]),
        ];

        for input in &inputs {
            let shares = compute_shares(total, input).unwrap();
            let sum: Money = shares.iter().map(|s| s.amount).sum();
            assert_eq!(sum, total, "split {:?}", input.method());
        }
    }
}
