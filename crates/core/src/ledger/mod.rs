//! Double-entry posting engine.
//!
//! - `types` - account types, normal balances, entry status, reference types
//! - `account` - accounts and the validated chart of accounts
//! - `entry` / `builder` - journal entries and how drafts are assembled
//! - `validation` - the balance rule and per-line checks
//! - `balance` - full recomputation, reconciliation, equation, trial balance
//! - `store` / `memory` - the persistence seam and its in-memory store
//! - `service` - the [`Ledger`] engine
//! - `error` - ledger errors

pub mod account;
pub mod balance;
pub mod builder;
pub mod entry;
pub mod error;
pub mod memory;
pub mod service;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod service_props;
#[cfg(test)]
mod validation_props;

pub use account::{Account, ChartOfAccounts, MAX_HIERARCHY_DEPTH};
pub use balance::{
    AccountingEquation, BalanceCorrection, BalanceMismatch, ReconciliationReport, TrialBalance,
    TrialBalanceRow, derive_balances, reconcile,
};
pub use builder::{EntryBuilder, build_entry};
pub use entry::{
    BalanceChange, DraftEntry, JournalEntry, JournalLine, LineRequest, PostedEntry, StatusChange,
};
pub use error::{AccountIssue, LedgerError, LineIssue};
pub use memory::{MemoryStore, MemoryTx};
pub use service::{Ledger, LedgerOptions, RepairOutcome};
pub use store::{LedgerStore, LedgerTx, LockScope};
pub use types::{AccountType, Direction, EntryStatus, NormalBalance, ReferenceType, UnknownVariant};
pub use validation::{EntryTotals, MAX_AMOUNT, bounded_add, validate_line, validate_lines};
