//! Property tests for reversing entries.

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::ledger::{
    Account, AccountType, ChartOfAccounts, EntryBuilder, EntryStatus, JournalEntry, LineRequest,
    derive_balances,
};
use crate::workflow::reversal::reversal_entry;

const CODES: [(&str, AccountType); 5] = [
    ("1101", AccountType::Asset),
    ("2101", AccountType::Liability),
    ("3101", AccountType::Equity),
    ("4101", AccountType::Revenue),
    ("5101", AccountType::Expense),
];

fn chart() -> ChartOfAccounts {
    ChartOfAccounts::new(CODES.iter().map(|(c, t)| Account::leaf(*c, *c, *t))).unwrap()
}

fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// A balanced entry: several debits and one credit for their total.
fn arb_entry() -> impl Strategy<Value = JournalEntry> {
    (
        prop::collection::vec((0usize..CODES.len(), arb_amount()), 1..5),
        0usize..CODES.len(),
    )
        .prop_map(|(debits, credit_idx)| {
            let total: Decimal = debits.iter().map(|(_, a)| *a).sum();
            let mut lines: Vec<LineRequest> = debits
                .into_iter()
                .map(|(i, a)| LineRequest::debit(CODES[i].0, a))
                .collect();
            lines.push(LineRequest::credit(CODES[credit_idx].0, total));
            let draft = EntryBuilder::new(
                crate::ledger::ReferenceType::Adjustment,
                NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            )
            .lines(lines)
            .build()
            .unwrap();
            JournalEntry::from_draft(draft, EntryStatus::Posted, Utc::now())
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Original plus reversal nets every account to zero.
    #[test]
    fn prop_reversal_cancels_original(original in arb_entry()) {
        let reversal = reversal_entry(&original, original.entry_date, None, Utc::now());
        let lines = original.lines.iter().chain(reversal.lines.iter());
        let balances = derive_balances(&chart(), lines).unwrap();
        prop_assert!(balances.values().all(Decimal::is_zero));
    }

    /// The reversal is balanced and mirrors the original line by line.
    #[test]
    fn prop_reversal_mirrors_lines(original in arb_entry()) {
        let reversal = reversal_entry(&original, original.entry_date, Some("fix"), Utc::now());
        prop_assert_eq!(reversal.total_debit, reversal.total_credit);
        prop_assert_eq!(reversal.lines.len(), original.lines.len());
        for (o, r) in original.lines.iter().zip(&reversal.lines) {
            prop_assert_eq!(&o.account_code, &r.account_code);
            prop_assert_eq!(o.line_number, r.line_number);
            prop_assert_eq!(o.debit_amount, r.credit_amount);
            prop_assert_eq!(o.credit_amount, r.debit_amount);
        }
    }
}
