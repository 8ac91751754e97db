//! Ledger error types.
//!
//! Every error is scoped to the single requested operation: when one is
//! returned, no entry, balance or period has been changed.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use saldo_shared::AppError;
use saldo_shared::types::{AccountingPeriodId, JournalEntryId};
use thiserror::Error;

use super::balance::BalanceMismatch;
use super::types::EntryStatus;

/// Why an account cannot receive a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountIssue {
    /// No account with this code exists.
    NotFound,
    /// Header accounts are rollups and never posted to.
    Header,
    /// The account has been deactivated.
    Inactive,
    /// The account exists but has the wrong type for its role.
    WrongType,
}

impl fmt::Display for AccountIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "account does not exist",
            Self::Header => "header accounts cannot be posted to",
            Self::Inactive => "account is inactive",
            Self::WrongType => "account type is not allowed here",
        })
    }
}

/// What is wrong with a single journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineIssue {
    /// Both sides are zero.
    ZeroAmount,
    /// A side is below zero.
    NegativeAmount,
    /// Debit and credit are both non-zero.
    MixedSides,
    /// The amount has more decimals than the currency's minor unit.
    ExcessPrecision,
    /// The amount is above [`MAX_AMOUNT`](super::validation::MAX_AMOUNT).
    ExceedsMaximum,
}

impl fmt::Display for LineIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ZeroAmount => "amount cannot be zero",
            Self::NegativeAmount => "amount cannot be negative",
            Self::MixedSides => "line must be either debit or credit, not both",
            Self::ExcessPrecision => "amount is finer than the currency's minor unit",
            Self::ExceedsMaximum => "amount exceeds the largest storable amount",
        })
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Entry Validation Errors ==========
    /// The entry has no lines.
    #[error("Journal entry has no lines")]
    EmptyEntry,

    /// The entry lacks a debit or a credit side.
    #[error("Journal entry needs at least one debit and one credit line")]
    SingleSidedEntry,

    /// A line is malformed.
    #[error("Line {line_number}: {issue}")]
    InvalidLine {
        /// One-based line number.
        line_number: u32,
        /// The problem.
        issue: LineIssue,
    },

    /// Debits and credits differ. Never rounded away.
    #[error("Journal entry is not balanced. Debit: {debit}, Credit: {credit}, Difference: {difference}")]
    UnbalancedEntry {
        /// Sum of debit amounts.
        debit: Decimal,
        /// Sum of credit amounts.
        credit: Decimal,
        /// `debit - credit`.
        difference: Decimal,
    },

    /// A total or balance would leave the storable range.
    #[error("Amount out of range while {0}")]
    AmountOverflow(String),

    // ========== Account Errors ==========
    /// Posting to a missing, header, or inactive account.
    #[error("Account {code}: {issue}")]
    InvalidAccount {
        /// Account code from the line.
        code: String,
        /// The problem.
        issue: AccountIssue,
    },

    /// The chart of accounts violates a structural rule.
    #[error("Invalid chart of accounts: {0}")]
    InvalidHierarchy(String),

    // ========== Entry State Errors ==========
    /// The entry (or its business event) was already posted. Safe no-op.
    #[error("Journal entry {entry_id} is already posted")]
    AlreadyPosted {
        /// The entry that holds the balance effect.
        entry_id: JournalEntryId,
    },

    /// An entry with this id is already stored.
    #[error("Journal entry {0} already exists")]
    DuplicateEntry(JournalEntryId),

    /// No entry with this id.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(JournalEntryId),

    /// The entry's status does not allow the requested action.
    #[error("Cannot {action} journal entry {entry_id} in status {from}")]
    InvalidTransition {
        /// The entry.
        entry_id: JournalEntryId,
        /// Its current status.
        from: EntryStatus,
        /// What was attempted.
        action: &'static str,
    },

    /// The entry already has a reversal.
    #[error("Journal entry {entry_id} has already been reversed")]
    AlreadyReversed {
        /// The original entry.
        entry_id: JournalEntryId,
    },

    // ========== Period Errors ==========
    /// The entry date lies in a closed period.
    #[error("Date {date} falls in closed accounting period {period_id}")]
    PeriodClosed {
        /// The rejected entry date.
        date: NaiveDate,
        /// The closed period.
        period_id: AccountingPeriodId,
    },

    /// The range to close overlaps a period that is already closed.
    #[error("Range overlaps closed accounting period {period_id} ({start} to {end})")]
    PeriodAlreadyClosed {
        /// The closed period.
        period_id: AccountingPeriodId,
        /// Its first day.
        start: NaiveDate,
        /// Its last day.
        end: NaiveDate,
    },

    /// No period with this id.
    #[error("Accounting period not found: {0}")]
    PeriodNotFound(AccountingPeriodId),

    /// Reopen was requested for a period that is open.
    #[error("Accounting period {0} is not closed")]
    PeriodNotClosed(AccountingPeriodId),

    /// A later period is still closed and must be reopened first.
    #[error("Accounting period {period_id} closes after this one and must be reopened first")]
    LaterPeriodClosed {
        /// The later closed period.
        period_id: AccountingPeriodId,
    },

    /// Start date after end date.
    #[error("Invalid period range: {start} is after {end}")]
    InvalidPeriodRange {
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
    },

    /// The range overlaps an open period with different bounds.
    #[error("Range overlaps open accounting period {period_id} ({start} to {end})")]
    PeriodOverlap {
        /// The open period.
        period_id: AccountingPeriodId,
        /// Its first day.
        start: NaiveDate,
        /// Its last day.
        end: NaiveDate,
    },

    /// Draft entries dated inside the range must be posted or voided first.
    #[error("Drafts dated between {start} and {end} must be posted or voided first ({count} found)")]
    DraftsInPeriod {
        /// Number of drafts found.
        count: usize,
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
    },

    /// Every revenue and expense balance is already zero.
    #[error("Nothing to close between {start} and {end}: revenue and expense balances are zero")]
    NothingToClose {
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
    },

    // ========== Consistency Errors ==========
    /// Incremental balances disagree with the posted journal.
    #[error("Balance reconciliation found {} mismatched account(s)", .mismatches.len())]
    ReconciliationMismatch {
        /// One record per drifted account.
        mismatches: Vec<BalanceMismatch>,
    },

    /// An audited operation was requested without a reason.
    #[error("A reason is required to {0}")]
    MissingReason(&'static str),

    // ========== Concurrency Errors ==========
    /// Locks could not be acquired in time. Nothing was written; retry.
    #[error("Timed out after {waited_ms}ms waiting for ledger locks")]
    PostingTimeout {
        /// Configured wait.
        waited_ms: u64,
    },

    // ========== Storage Errors ==========
    /// The backing store failed. The unit of work was rolled back.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::InvalidAccount`].
    pub fn invalid_account(code: impl Into<String>, issue: AccountIssue) -> Self {
        Self::InvalidAccount {
            code: code.into(),
            issue,
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyEntry => "EMPTY_ENTRY",
            Self::SingleSidedEntry => "SINGLE_SIDED_ENTRY",
            Self::InvalidLine { .. } => "INVALID_LINE",
            Self::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            Self::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            Self::InvalidAccount { .. } => "INVALID_ACCOUNT",
            Self::InvalidHierarchy(_) => "INVALID_HIERARCHY",
            Self::AlreadyPosted { .. } => "ALREADY_POSTED",
            Self::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::AlreadyReversed { .. } => "ALREADY_REVERSED",
            Self::PeriodClosed { .. } => "PERIOD_CLOSED",
            Self::PeriodAlreadyClosed { .. } => "PERIOD_ALREADY_CLOSED",
            Self::PeriodNotFound(_) => "PERIOD_NOT_FOUND",
            Self::PeriodNotClosed(_) => "PERIOD_NOT_CLOSED",
            Self::LaterPeriodClosed { .. } => "LATER_PERIOD_CLOSED",
            Self::InvalidPeriodRange { .. } => "INVALID_PERIOD_RANGE",
            Self::PeriodOverlap { .. } => "PERIOD_OVERLAP",
            Self::DraftsInPeriod { .. } => "DRAFTS_IN_PERIOD",
            Self::NothingToClose { .. } => "NOTHING_TO_CLOSE",
            Self::ReconciliationMismatch { .. } => "RECONCILIATION_MISMATCH",
            Self::MissingReason(_) => "MISSING_REASON",
            Self::PostingTimeout { .. } => "POSTING_TIMEOUT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns true if the same request may simply be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PostingTimeout { .. })
    }

    /// Returns true if the requested effect is already in the books, so the
    /// caller can treat the error as a successful no-op.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::AlreadyPosted { .. } | Self::AlreadyReversed { .. })
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::EmptyEntry
            | LedgerError::SingleSidedEntry
            | LedgerError::InvalidLine { .. }
            | LedgerError::UnbalancedEntry { .. }
            | LedgerError::AmountOverflow(_)
            | LedgerError::InvalidAccount { .. }
            | LedgerError::InvalidHierarchy(_)
            | LedgerError::InvalidPeriodRange { .. }
            | LedgerError::MissingReason(_) => Self::Validation(message),

            LedgerError::EntryNotFound(_) | LedgerError::PeriodNotFound(_) => {
                Self::NotFound(message)
            }

            LedgerError::AlreadyPosted { .. }
            | LedgerError::DuplicateEntry(_)
            | LedgerError::AlreadyReversed { .. }
            | LedgerError::PeriodAlreadyClosed { .. }
            | LedgerError::PeriodOverlap { .. } => Self::Conflict(message),

            LedgerError::InvalidTransition { .. }
            | LedgerError::PeriodClosed { .. }
            | LedgerError::PeriodNotClosed(_)
            | LedgerError::LaterPeriodClosed { .. }
            | LedgerError::NothingToClose { .. }
            | LedgerError::DraftsInPeriod { .. } => Self::BusinessRule(message),

            LedgerError::PostingTimeout { .. } => Self::Timeout(message),
            LedgerError::Storage(_) => Self::Database(message),
            LedgerError::ReconciliationMismatch { .. } => Self::Internal(message),
        }
    }
}
