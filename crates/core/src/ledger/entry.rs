//! Journal entries and their lines.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use saldo_shared::types::JournalEntryId;
use serde::{Deserialize, Serialize};

use super::types::{Direction, EntryStatus, ReferenceType};
use super::validation::EntryTotals;

/// One requested line, as supplied by a business service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    /// Target account code.
    pub account_code: String,
    /// Positive amount.
    pub amount: Decimal,
    /// Debit or credit.
    pub direction: Direction,
    /// Optional line memo.
    pub description: Option<String>,
}

impl LineRequest {
    /// A debit line.
    pub fn debit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            amount,
            direction: Direction::Debit,
            description: None,
        }
    }

    /// A credit line.
    pub fn credit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            amount,
            direction: Direction::Credit,
            description: None,
        }
    }

    /// Attaches a line memo.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A stored journal line. Immutable once its entry is posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// One-based position, assigned in insertion order.
    pub line_number: u32,
    /// Target account code.
    pub account_code: String,
    /// Debit side (zero on credit lines).
    pub debit_amount: Decimal,
    /// Credit side (zero on debit lines).
    pub credit_amount: Decimal,
    /// Optional line memo.
    pub description: Option<String>,
}

impl JournalLine {
    /// Converts a request into a numbered line.
    #[must_use]
    pub fn from_request(line_number: u32, request: LineRequest) -> Self {
        let (debit_amount, credit_amount) = match request.direction {
            Direction::Debit => (request.amount, Decimal::ZERO),
            Direction::Credit => (Decimal::ZERO, request.amount),
        };
        Self {
            line_number,
            account_code: request.account_code,
            debit_amount,
            credit_amount,
            description: request.description,
        }
    }

    /// The non-zero side, or `None` for a zero or mixed line.
    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        match (self.debit_amount.is_zero(), self.credit_amount.is_zero()) {
            (false, true) => Some(Direction::Debit),
            (true, false) => Some(Direction::Credit),
            _ => None,
        }
    }

    /// The line with debit and credit exchanged.
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            debit_amount: self.credit_amount,
            credit_amount: self.debit_amount,
            ..self.clone()
        }
    }
}

/// An unsaved, already balanced entry produced by the entry builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftEntry {
    /// Entry id; posting the same id twice is rejected.
    pub id: JournalEntryId,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Header description.
    pub description: String,
    /// Business document code (invoice number etc).
    pub reference: Option<String>,
    /// Business event type.
    pub reference_type: ReferenceType,
    /// Id of the business event; unique per reference type once posted.
    pub source_id: Option<String>,
    /// Lines in insertion order.
    pub lines: Vec<JournalLine>,
    /// Debit and credit totals.
    pub totals: EntryTotals,
}

/// A persisted journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Entry id.
    pub id: JournalEntryId,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Header description.
    pub description: String,
    /// Business document code.
    pub reference: Option<String>,
    /// Business event type.
    pub reference_type: ReferenceType,
    /// Id of the business event.
    pub source_id: Option<String>,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Sum of debit amounts.
    pub total_debit: Decimal,
    /// Sum of credit amounts.
    pub total_credit: Decimal,
    /// For reversal entries, the entry being reversed.
    pub reverses_entry_id: Option<JournalEntryId>,
    /// For reversed entries, the reversal that cancelled it.
    pub reversed_by_entry_id: Option<JournalEntryId>,
    /// When the balance effect was applied.
    pub posted_at: Option<DateTime<Utc>>,
    /// When the entry was first stored.
    pub created_at: DateTime<Utc>,
    /// Lines in `line_number` order.
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Materialises a draft with the given status.
    #[must_use]
    pub fn from_draft(draft: DraftEntry, status: EntryStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: draft.id,
            entry_date: draft.entry_date,
            description: draft.description,
            reference: draft.reference,
            reference_type: draft.reference_type,
            source_id: draft.source_id,
            status,
            total_debit: draft.totals.debit,
            total_credit: draft.totals.credit,
            reverses_entry_id: None,
            reversed_by_entry_id: None,
            posted_at: status.affects_balance().then_some(now),
            created_at: now,
            lines: draft.lines,
        }
    }

    /// The `(reference_type, source_id)` idempotency key, if any.
    #[must_use]
    pub fn source_key(&self) -> Option<(ReferenceType, &str)> {
        self.source_id
            .as_deref()
            .map(|source| (self.reference_type, source))
    }

    /// Distinct account codes, sorted. This is the lock order.
    #[must_use]
    pub fn account_codes(&self) -> BTreeSet<String> {
        self.lines.iter().map(|l| l.account_code.clone()).collect()
    }
}

/// Net change applied to one account by a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Account code.
    pub account_code: String,
    /// Signed change under the account's normal-balance rule.
    pub delta: Decimal,
    /// Balance after the posting.
    pub balance_after: Decimal,
}

/// Result of a successful posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedEntry {
    /// The entry as stored.
    pub entry: JournalEntry,
    /// One change per touched account, in code order.
    pub balance_changes: Vec<BalanceChange>,
}

impl PostedEntry {
    /// Change applied to `account_code`, if it was touched.
    #[must_use]
    pub fn change_for(&self, account_code: &str) -> Option<&BalanceChange> {
        self.balance_changes
            .iter()
            .find(|c| c.account_code == account_code)
    }
}

/// A requested status transition, applied only if the entry is still in
/// `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// Entry being transitioned.
    pub entry_id: JournalEntryId,
    /// Expected current status.
    pub from: EntryStatus,
    /// New status.
    pub to: EntryStatus,
    /// Transition time; becomes `posted_at` when `to` is `Posted`.
    pub at: DateTime<Utc>,
    /// Set when `to` is `Reversed`.
    pub reversed_by: Option<JournalEntryId>,
}
