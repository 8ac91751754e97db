//! Property-based tests for entry validation.
//!
//! The balance rule is exact: any non-zero difference is rejected and
//! reported as-is, never rounded away.

use proptest::prelude::*;
use rust_decimal::Decimal;
use saldo_shared::types::Currency;

use super::entry::{JournalLine, LineRequest};
use super::error::{LedgerError, LineIssue};
use super::validation::{EntryTotals, MAX_AMOUNT, validate_lines};

/// Amounts from 0.01 to 1,000,000.00.
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn numbered(requests: Vec<LineRequest>) -> Vec<JournalLine> {
    (1..)
        .zip(requests)
        .map(|(n, r)| JournalLine::from_request(n, r))
        .collect()
}

/// Debit lines plus a single credit line for their total.
fn balanced_lines() -> impl Strategy<Value = Vec<JournalLine>> {
    prop::collection::vec(positive_amount(), 1..8).prop_map(|amounts| {
        let total: Decimal = amounts.iter().copied().sum();
        let mut requests: Vec<LineRequest> = amounts
            .into_iter()
            .enumerate()
            .map(|(i, a)| LineRequest::debit(format!("5{i:03}"), a))
            .collect();
        requests.push(LineRequest::credit("1101", total));
        numbered(requests)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_balanced_lines_are_accepted(lines in balanced_lines()) {
        let totals = validate_lines(&lines, Currency::Idr).unwrap();
        prop_assert_eq!(totals.debit, totals.credit);
        prop_assert_eq!(totals, EntryTotals::of(&lines).unwrap());
    }

    /// Nudging one amount by any non-zero delta is caught with that exact delta.
    #[test]
    fn prop_any_difference_is_rejected_exactly(
        lines in balanced_lines(),
        delta_cents in 1i64..1_000_000i64,
    ) {
        let delta = Decimal::new(delta_cents, 2);
        let mut lines = lines;
        lines[0].debit_amount += delta;

        match validate_lines(&lines, Currency::Idr) {
            Err(LedgerError::UnbalancedEntry { difference, .. }) => {
                prop_assert_eq!(difference, delta);
            }
            other => prop_assert!(false, "expected UnbalancedEntry, got {:?}", other),
        }
    }

    /// A third decimal place never fits a two-decimal currency.
    #[test]
    fn prop_sub_minor_amounts_are_rejected(mills in 1i64..10_000_000i64) {
        prop_assume!(mills % 10 != 0);
        let amount = Decimal::new(mills, 3);
        let lines = numbered(vec![
            LineRequest::debit("1101", amount),
            LineRequest::credit("4101", amount),
        ]);
        let result = validate_lines(&lines, Currency::Idr);
        let rejected = matches!(
            result,
            Err(LedgerError::InvalidLine { line_number: 1, issue: LineIssue::ExcessPrecision })
        );
        prop_assert!(rejected, "expected ExcessPrecision, got {:?}", result);
    }

    /// Amounts anywhere in the `Decimal` range are rejected cleanly, never
    /// by panicking, once they or their totals pass the storable maximum.
    #[test]
    fn prop_oversized_amounts_are_rejected(
        mantissa in (MAX_AMOUNT.mantissa() + 1)..=(i128::from(i64::MAX) << 32),
        copies in 1usize..4,
    ) {
        let amount = Decimal::from_i128_with_scale(mantissa, 2);
        let mut requests = vec![LineRequest::debit("1101", amount); copies];
        requests.push(LineRequest::credit("4101", amount));
        let result = validate_lines(&numbered(requests), Currency::Idr);
        let rejected = matches!(
            result,
            Err(LedgerError::InvalidLine { line_number: 1, issue: LineIssue::ExceedsMaximum })
        );
        prop_assert!(rejected, "expected ExceedsMaximum, got {:?}", result);
    }

    /// Lines on one side only never validate, whatever the amounts.
    #[test]
    fn prop_single_sided_is_rejected(amounts in prop::collection::vec(positive_amount(), 1..5)) {
        let lines = numbered(
            amounts.into_iter().map(|a| LineRequest::debit("1101", a)).collect(),
        );
        prop_assert!(matches!(
            validate_lines(&lines, Currency::Idr),
            Err(LedgerError::SingleSidedEntry)
        ));
    }
}
