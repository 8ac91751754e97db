//! Property-based tests for the posting engine.
//!
//! Whatever sequence of postings and reversals is applied, the stored
//! balances must equal a full recomputation from the journal, and the
//! accounting equation must hold.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::account::Account;
use super::entry::LineRequest;
use super::memory::MemoryStore;
use super::service::{Ledger, LedgerOptions};
use super::types::{AccountType, ReferenceType};
use crate::clock::FixedClock;

const LEAVES: [(&str, AccountType); 6] = [
    ("1101", AccountType::Asset),
    ("1201", AccountType::Asset),
    ("2101", AccountType::Liability),
    ("3201", AccountType::Equity),
    ("4101", AccountType::Revenue),
    ("5101", AccountType::Expense),
];

#[derive(Debug, Clone)]
enum Op {
    Post {
        debit: usize,
        credit: usize,
        cents: i64,
    },
    ReverseLast,
    Replay,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..LEAVES.len(), 0..LEAVES.len(), 1i64..10_000_000i64)
            .prop_map(|(debit, credit, cents)| Op::Post { debit, credit, cents }),
        1 => Just(Op::ReverseLast),
        1 => Just(Op::Replay),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn ledger() -> Ledger<MemoryStore, FixedClock> {
    let store = MemoryStore::with_accounts(LEAVES.iter().map(|(c, t)| Account::leaf(*c, *c, *t))).unwrap();
    Ledger::new(
        store,
        FixedClock::on(NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()),
        LedgerOptions::default(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_balances_always_match_journal(ops in prop::collection::vec(arb_op(), 1..25)) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = ledger();
            let date = NaiveDate::from_ymd_opt(2026, 5, 20).unwrap();
            let mut last = None;

            for (i, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Post { debit, credit, cents } => {
                        let amount = Decimal::new(cents, 2);
                        let draft = ledger
                            .entry(ReferenceType::Adjustment, date)
                            .source_id(format!("adj-{i}"))
                            .line(LineRequest::debit(LEAVES[debit].0, amount))
                            .line(LineRequest::credit(LEAVES[credit].0, amount))
                            .build()
                            .unwrap();
                        last = Some(draft.clone());
                        ledger.post(draft).await.unwrap();
                    }
                    Op::ReverseLast => {
                        if let Some(draft) = &last {
                            // A second reversal of the same entry is refused.
                            let _ = ledger.reverse(draft.id, None, Some("prop")).await;
                        }
                    }
                    Op::Replay => {
                        if let Some(draft) = last.clone() {
                            let err = ledger.post(draft).await.unwrap_err();
                            assert!(err.is_duplicate());
                        }
                    }
                }
            }

            let report = ledger.reconcile().await.unwrap();
            assert!(report.is_consistent(), "drift: {:?}", report.mismatches);
            assert!(ledger.accounting_equation().await.unwrap().holds());
            assert!(ledger.trial_balance().await.unwrap().is_balanced());
        });
    }

    /// Posting the same draft any number of times applies it once.
    #[test]
    fn prop_replays_apply_once(cents in 1i64..10_000_000i64, replays in 1usize..5) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = ledger();
            let amount = Decimal::new(cents, 2);
            let draft = ledger
                .entry(ReferenceType::Sale, NaiveDate::from_ymd_opt(2026, 5, 20).unwrap())
                .source_id("sale-1")
                .debit("1101", amount)
                .credit("4101", amount)
                .build()
                .unwrap();

            ledger.post(draft.clone()).await.unwrap();
            for _ in 0..replays {
                assert!(ledger.post(draft.clone()).await.unwrap_err().is_duplicate());
            }
            assert_eq!(ledger.get_balance("1101").await.unwrap().amount, amount);
            assert_eq!(ledger.get_balance("4101").await.unwrap().amount, amount);
        });
    }
}
