//! Property tests for entry status transitions.

use proptest::prelude::*;
use saldo_shared::types::JournalEntryId;

use crate::ledger::EntryStatus;
use crate::workflow::lifecycle::EntryLifecycle;

fn arb_status() -> impl Strategy<Value = EntryStatus> {
    prop::sample::select(EntryStatus::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A successful transition is always one the state machine allows.
    #[test]
    fn prop_transitions_follow_state_machine(from in arb_status()) {
        let id = JournalEntryId::new();
        if let Ok(to) = EntryLifecycle::post(id, from) {
            prop_assert!(EntryLifecycle::can_transition(from, to));
        }
        if let Ok(to) = EntryLifecycle::void(id, from) {
            prop_assert!(EntryLifecycle::can_transition(from, to));
        }
    }

    /// Balance-affecting statuses never return to a non-affecting one.
    #[test]
    fn prop_posted_is_terminal_for_balance(from in arb_status(), to in arb_status()) {
        if from.affects_balance() && EntryLifecycle::can_transition(from, to) {
            prop_assert!(to.affects_balance());
        }
    }

    /// Nothing transitions back to DRAFT.
    #[test]
    fn prop_no_transition_into_draft(from in arb_status()) {
        prop_assert!(!EntryLifecycle::can_transition(from, EntryStatus::Draft));
    }
}
