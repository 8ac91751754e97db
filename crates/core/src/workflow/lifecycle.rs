//! Journal entry status transitions.
//!
//! ```text
//! DRAFT ──post──▶ POSTED ──reverse──▶ REVERSED
//!   │
//!   └──void──▶ VOIDED
//! ```
//!
//! POSTED and REVERSED entries are immutable; the only undo for a posted
//! entry is a new REVERSAL entry.

use saldo_shared::types::JournalEntryId;

use crate::ledger::{EntryStatus, JournalEntry, LedgerError, ReferenceType};

/// Stateless transition rules for journal entries.
pub struct EntryLifecycle;

impl EntryLifecycle {
    /// Status after posting an entry currently in `from`.
    ///
    /// # Errors
    ///
    /// - `AlreadyPosted` if the balance effect was already applied
    /// - `InvalidTransition` for voided entries
    pub fn post(entry_id: JournalEntryId, from: EntryStatus) -> Result<EntryStatus, LedgerError> {
        match from {
            EntryStatus::Draft => Ok(EntryStatus::Posted),
            EntryStatus::Posted | EntryStatus::Reversed => {
                Err(LedgerError::AlreadyPosted { entry_id })
            }
            EntryStatus::Voided => Err(LedgerError::InvalidTransition {
                entry_id,
                from,
                action: "post",
            }),
        }
    }

    /// Status after voiding. Only drafts can be voided.
    pub fn void(entry_id: JournalEntryId, from: EntryStatus) -> Result<EntryStatus, LedgerError> {
        match from {
            EntryStatus::Draft => Ok(EntryStatus::Voided),
            _ => Err(LedgerError::InvalidTransition {
                entry_id,
                from,
                action: "void",
            }),
        }
    }

    /// Status of `original` after it is reversed.
    ///
    /// Reversal entries cannot themselves be reversed, and closing entries
    /// are reversed only by reopening their period.
    pub fn reverse(original: &JournalEntry) -> Result<EntryStatus, LedgerError> {
        Self::reverse_any(original).and_then(|status| match original.reference_type {
            ReferenceType::Closing => Err(LedgerError::InvalidTransition {
                entry_id: original.id,
                from: original.status,
                action: "reverse a closing entry outside reopen",
            }),
            _ => Ok(status),
        })
    }

    /// Like [`EntryLifecycle::reverse`] but allows closing entries.
    pub(crate) fn reverse_any(original: &JournalEntry) -> Result<EntryStatus, LedgerError> {
        if original.reference_type == ReferenceType::Reversal {
            return Err(LedgerError::InvalidTransition {
                entry_id: original.id,
                from: original.status,
                action: "reverse a reversal",
            });
        }
        match original.status {
            EntryStatus::Posted => Ok(EntryStatus::Reversed),
            EntryStatus::Reversed => Err(LedgerError::AlreadyReversed {
                entry_id: original.id,
            }),
            from @ (EntryStatus::Draft | EntryStatus::Voided) => {
                Err(LedgerError::InvalidTransition {
                    entry_id: original.id,
                    from,
                    action: "reverse",
                })
            }
        }
    }

    /// Whether `from -> to` is a legal transition.
    #[must_use]
    pub fn can_transition(from: EntryStatus, to: EntryStatus) -> bool {
        matches!(
            (from, to),
            (EntryStatus::Draft, EntryStatus::Posted)
                | (EntryStatus::Draft, EntryStatus::Voided)
                | (EntryStatus::Posted, EntryStatus::Reversed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EntryBuilder;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn entry(reference_type: ReferenceType, status: EntryStatus) -> JournalEntry {
        let draft = EntryBuilder::new(reference_type, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
            .debit("1101", dec!(10))
            .credit("4101", dec!(10))
            .build()
            .unwrap();
        JournalEntry::from_draft(draft, status, Utc::now())
    }

    #[test]
    fn test_post_only_from_draft() {
        let id = JournalEntryId::new();
        assert_eq!(
            EntryLifecycle::post(id, EntryStatus::Draft).unwrap(),
            EntryStatus::Posted
        );
        assert!(matches!(
            EntryLifecycle::post(id, EntryStatus::Posted),
            Err(LedgerError::AlreadyPosted { .. })
        ));
        assert!(matches!(
            EntryLifecycle::post(id, EntryStatus::Voided),
            Err(LedgerError::InvalidTransition { action: "post", .. })
        ));
    }

    #[test]
    fn test_void_rejects_posted() {
        let id = JournalEntryId::new();
        assert_eq!(
            EntryLifecycle::void(id, EntryStatus::Draft).unwrap(),
            EntryStatus::Voided
        );
        let err = EntryLifecycle::void(id, EntryStatus::Posted).unwrap_err();
        assert!(err.to_string().contains("Cannot void"));
    }

    #[test]
    fn test_reverse_rules() {
        let posted = entry(ReferenceType::Sale, EntryStatus::Posted);
        assert_eq!(
            EntryLifecycle::reverse(&posted).unwrap(),
            EntryStatus::Reversed
        );

        let reversed = entry(ReferenceType::Sale, EntryStatus::Reversed);
        assert!(matches!(
            EntryLifecycle::reverse(&reversed),
            Err(LedgerError::AlreadyReversed { .. })
        ));

        let reversal = entry(ReferenceType::Reversal, EntryStatus::Posted);
        assert!(matches!(
            EntryLifecycle::reverse(&reversal),
            Err(LedgerError::InvalidTransition { .. })
        ));

        let draft = entry(ReferenceType::Sale, EntryStatus::Draft);
        assert!(EntryLifecycle::reverse(&draft).is_err());
    }

    #[test]
    fn test_closing_entries_reverse_only_through_reopen() {
        let closing = entry(ReferenceType::Closing, EntryStatus::Posted);
        assert!(EntryLifecycle::reverse(&closing).is_err());
        assert_eq!(
            EntryLifecycle::reverse_any(&closing).unwrap(),
            EntryStatus::Reversed
        );
    }
}
