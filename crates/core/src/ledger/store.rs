//! Persistence seam for the ledger engine.
//!
//! A [`LedgerStore`] hands out units of work ([`LedgerTx`]). Within one:
//!
//! - account rows are locked in ascending code order and stay locked until
//!   the unit ends, so postings to the same account serialize while
//!   disjoint postings run in parallel;
//! - writes are staged and become visible together on [`LedgerTx::commit`];
//! - dropping the unit without committing discards every staged write.
//!
//! [`LockScope::Posting`] units share period postability with each other;
//! [`LockScope::Exclusive`] units (close, reopen, repair) exclude all others.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use saldo_shared::types::{AccountingPeriodId, JournalEntryId};

use super::account::{Account, ChartOfAccounts};
use super::balance::BalanceCorrection;
use super::entry::{JournalEntry, JournalLine, StatusChange};
use super::error::LedgerError;
use super::types::ReferenceType;
use crate::fiscal::AccountingPeriod;

/// How a unit of work interacts with period postability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// Ordinary posting; runs alongside other postings.
    Posting,
    /// Period close, reopen, or balance repair; runs alone.
    Exclusive,
}

/// Durable storage for accounts, journal entries, periods and corrections.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Unit of work type.
    type Tx: LedgerTx;

    /// Opens a unit of work, waiting for the period lock implied by `scope`.
    async fn begin(&self, scope: LockScope) -> Result<Self::Tx, LedgerError>;

    /// Committed snapshot of the chart of accounts.
    async fn load_chart(&self) -> Result<ChartOfAccounts, LedgerError>;

    /// Committed journal entry by id.
    async fn find_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, LedgerError>;

    /// All accounting periods, ordered by start date.
    async fn list_periods(&self) -> Result<Vec<AccountingPeriod>, LedgerError>;

    /// All balance corrections, oldest first.
    async fn list_corrections(&self) -> Result<Vec<BalanceCorrection>, LedgerError>;

    /// Number of committed DRAFT entries dated within `[start, end]`.
    async fn count_drafts(&self, start: NaiveDate, end: NaiveDate) -> Result<usize, LedgerError>;
}

/// A single atomic unit of ledger work.
#[async_trait]
pub trait LedgerTx: Send {
    /// Locks the given accounts in ascending code order and returns their
    /// current rows. Accounts already locked by this unit are not re-locked.
    ///
    /// # Errors
    ///
    /// `InvalidAccount` with `NotFound` for a code with no row.
    async fn lock_accounts(&mut self, codes: &BTreeSet<String>) -> Result<Vec<Account>, LedgerError>;

    /// Locks every account and returns the chart as seen under the locks.
    async fn lock_all_accounts(&mut self) -> Result<ChartOfAccounts, LedgerError>;

    /// Journal entry by id, including entries committed by others after
    /// this unit began.
    async fn find_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, LedgerError>;

    /// Balance-affecting entry holding the idempotency key, if any.
    async fn find_by_source(
        &mut self,
        reference_type: ReferenceType,
        source_id: &str,
    ) -> Result<Option<JournalEntryId>, LedgerError>;

    /// Periods whose range intersects `[start, end]`.
    async fn periods_overlapping(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AccountingPeriod>, LedgerError>;

    /// All periods, ordered by start date.
    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, LedgerError>;

    /// Period by id.
    async fn find_period(
        &mut self,
        id: AccountingPeriodId,
    ) -> Result<Option<AccountingPeriod>, LedgerError>;

    /// Number of DRAFT entries dated within `[start, end]`.
    async fn count_drafts(&mut self, start: NaiveDate, end: NaiveDate) -> Result<usize, LedgerError>;

    /// Lines of every POSTED or REVERSED entry.
    async fn balance_affecting_lines(&mut self) -> Result<Vec<JournalLine>, LedgerError>;

    /// Stages a new entry with its lines.
    ///
    /// # Errors
    ///
    /// `AlreadyPosted` or `DuplicateEntry` if the id or a balance-affecting
    /// idempotency key is taken (possibly only detected at commit).
    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), LedgerError>;

    /// Stages a status transition guarded by the expected current status.
    async fn change_status(&mut self, change: &StatusChange) -> Result<(), LedgerError>;

    /// Stages `balance += delta` on a locked leaf account.
    async fn apply_balance_delta(&mut self, code: &str, delta: Decimal) -> Result<(), LedgerError>;

    /// Stages a repaired balance together with its audit record.
    async fn record_correction(&mut self, correction: &BalanceCorrection) -> Result<(), LedgerError>;

    /// Stages an insert or update of a period.
    async fn save_period(&mut self, period: &AccountingPeriod) -> Result<(), LedgerError>;

    /// Applies every staged write atomically and releases all locks.
    async fn commit(self) -> Result<(), LedgerError>;
}
