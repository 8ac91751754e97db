//! The ledger engine.
//!
//! [`Ledger`] is the only component that transitions entries to POSTED and
//! the only writer of account balances. Each operation runs in one
//! [`LedgerTx`]: either every staged write commits or none does.
//!
//! Posting steps, all inside one unit of work:
//!
//! 1. Re-validate lines (balance, sides, precision)
//! 2. Lock touched accounts in ascending code order (bounded wait)
//! 3. Reject duplicates by entry id and by `(reference_type, source_id)`
//! 4. Reject dates inside a closed period unless CLOSING or REVERSAL
//! 5. Reject header, inactive, or unknown accounts
//! 6. Stage the entry and one balance delta per line, then commit

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use saldo_shared::config::LedgerSettings;
use saldo_shared::types::{Currency, JournalEntryId, Money};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::account::{Account, ChartOfAccounts};
use super::balance::{
    AccountingEquation, BalanceCorrection, ReconciliationReport, TrialBalance, derive_balances,
    reconcile,
};
use super::builder::EntryBuilder;
use super::entry::{BalanceChange, DraftEntry, JournalEntry, LineRequest, PostedEntry, StatusChange};
use super::error::LedgerError;
use super::store::{LedgerStore, LedgerTx, LockScope};
use super::types::{EntryStatus, ReferenceType};
use super::validation::{bounded_add, validate_lines};
use crate::clock::{Clock, SystemClock};
use crate::fiscal;
use crate::workflow::EntryLifecycle;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOptions {
    /// Longest wait for period or account locks.
    pub lock_timeout: Duration,
    /// Equity account receiving net income on close.
    pub retained_earnings_code: String,
    /// Functional currency; bounds amount precision.
    pub currency: Currency,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self::from(&LedgerSettings::default())
    }
}

impl From<&LedgerSettings> for LedgerOptions {
    fn from(settings: &LedgerSettings) -> Self {
        Self {
            lock_timeout: Duration::from_millis(settings.lock_timeout_ms),
            retained_earnings_code: settings.retained_earnings_code.clone(),
            currency: settings.currency,
        }
    }
}

/// Result of an audited balance repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    /// What was found before repairing.
    pub report: ReconciliationReport,
    /// One audit record per repaired account.
    pub corrections: Vec<BalanceCorrection>,
}

/// Ledger posting and balance consistency engine.
#[derive(Debug, Clone)]
pub struct Ledger<S, C = SystemClock> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) options: LedgerOptions,
}

impl<S: LedgerStore, C: Clock> Ledger<S, C> {
    /// Creates an engine over `store`.
    pub fn new(store: S, clock: C, options: LedgerOptions) -> Self {
        Self {
            store,
            clock,
            options,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Engine settings.
    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    /// A builder preset with the functional currency.
    pub fn entry(&self, reference_type: ReferenceType, entry_date: NaiveDate) -> EntryBuilder {
        EntryBuilder::new(reference_type, entry_date).currency(self.options.currency)
    }

    /// Builds a balanced draft and checks every account against the
    /// current chart. Writes nothing.
    pub async fn build_entry(
        &self,
        reference_type: ReferenceType,
        entry_date: NaiveDate,
        lines: Vec<LineRequest>,
    ) -> Result<DraftEntry, LedgerError> {
        let draft = self.entry(reference_type, entry_date).lines(lines).build()?;
        let chart = self.store.load_chart().await?;
        for line in &draft.lines {
            chart.ensure_postable(&line.account_code)?;
        }
        Ok(draft)
    }

    /// Posts a draft: stores it as POSTED and applies its balance effect
    /// exactly once.
    ///
    /// # Errors
    ///
    /// - `AlreadyPosted` if the id or `(reference_type, source_id)` is taken
    /// - `PeriodClosed` if the date falls in a closed period
    /// - `InvalidAccount` for header, inactive, or unknown accounts
    /// - `PostingTimeout` if locks are not acquired in time
    /// - any validation error from re-checking the lines
    #[instrument(skip(self, draft), fields(entry_id = %draft.id, reference_type = %draft.reference_type))]
    pub async fn post(&self, draft: DraftEntry) -> Result<PostedEntry, LedgerError> {
        let totals = validate_lines(&draft.lines, self.options.currency)?;
        let draft = DraftEntry { totals, ..draft };
        let entry = JournalEntry::from_draft(draft, EntryStatus::Posted, self.clock.now());

        let mut tx = self.begin(LockScope::Posting).await?;
        let accounts = self.lock(&mut tx, entry.account_codes()).await?;
        if tx.find_entry(entry.id).await?.is_some() {
            return Err(LedgerError::AlreadyPosted { entry_id: entry.id });
        }
        self.ensure_source_unused(&mut tx, &entry).await?;
        self.ensure_period_open(&mut tx, &entry).await?;
        ensure_all_postable(&accounts)?;

        tx.insert_entry(&entry).await?;
        let balance_changes = stage_deltas(&mut tx, &accounts, &entry).await?;
        tx.commit().await?;

        info!(
            entry_id = %entry.id,
            total = %entry.total_debit,
            accounts = balance_changes.len(),
            "journal entry posted"
        );
        Ok(PostedEntry {
            entry,
            balance_changes,
        })
    }

    /// Stores a draft without balance effect. Drafts dated inside a closed
    /// period are rejected like postings.
    #[instrument(skip(self, draft), fields(entry_id = %draft.id))]
    pub async fn save_draft(&self, draft: DraftEntry) -> Result<JournalEntry, LedgerError> {
        let totals = validate_lines(&draft.lines, self.options.currency)?;
        let draft = DraftEntry { totals, ..draft };
        let chart = self.store.load_chart().await?;
        for line in &draft.lines {
            chart.ensure_postable(&line.account_code)?;
        }
        let entry = JournalEntry::from_draft(draft, EntryStatus::Draft, self.clock.now());

        let mut tx = self.begin(LockScope::Posting).await?;
        if tx.find_entry(entry.id).await?.is_some() {
            return Err(LedgerError::DuplicateEntry(entry.id));
        }
        self.ensure_period_open(&mut tx, &entry).await?;
        tx.insert_entry(&entry).await?;
        tx.commit().await?;

        info!(entry_id = %entry.id, "journal draft saved");
        Ok(entry)
    }

    /// Posts a previously saved draft.
    #[instrument(skip(self))]
    pub async fn post_draft(&self, id: JournalEntryId) -> Result<PostedEntry, LedgerError> {
        let mut tx = self.begin(LockScope::Posting).await?;
        let stored = tx
            .find_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        let accounts = self.lock(&mut tx, stored.account_codes()).await?;

        // Re-read under the account locks; a concurrent post may have won.
        let mut entry = tx
            .find_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        let to = EntryLifecycle::post(id, entry.status)?;
        validate_lines(&entry.lines, self.options.currency)?;
        self.ensure_source_unused(&mut tx, &entry).await?;
        self.ensure_period_open(&mut tx, &entry).await?;
        ensure_all_postable(&accounts)?;

        let now = self.clock.now();
        tx.change_status(&StatusChange {
            entry_id: id,
            from: EntryStatus::Draft,
            to,
            at: now,
            reversed_by: None,
        })
        .await?;
        let balance_changes = stage_deltas(&mut tx, &accounts, &entry).await?;
        tx.commit().await?;

        entry.status = to;
        entry.posted_at = Some(now);
        info!(entry_id = %id, "journal draft posted");
        Ok(PostedEntry {
            entry,
            balance_changes,
        })
    }

    /// Voids a draft. Posted entries can only be reversed.
    #[instrument(skip(self))]
    pub async fn void(&self, id: JournalEntryId) -> Result<JournalEntry, LedgerError> {
        let mut tx = self.begin(LockScope::Posting).await?;
        let mut entry = tx
            .find_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        let to = EntryLifecycle::void(id, entry.status)?;
        tx.change_status(&StatusChange {
            entry_id: id,
            from: EntryStatus::Draft,
            to,
            at: self.clock.now(),
            reversed_by: None,
        })
        .await?;
        tx.commit().await?;

        entry.status = to;
        info!(entry_id = %id, "journal draft voided");
        Ok(entry)
    }

    /// Journal entry by id.
    pub async fn find_entry(&self, id: JournalEntryId) -> Result<JournalEntry, LedgerError> {
        self.store
            .find_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))
    }

    /// Balance of an account. Header balances are summed from leaves.
    pub async fn get_balance(&self, code: &str) -> Result<Money, LedgerError> {
        let chart = self.store.load_chart().await?;
        let amount = chart.rollup_balance(code)?;
        Ok(Money::new(amount, self.options.currency))
    }

    /// Committed snapshot of the chart of accounts.
    pub async fn chart(&self) -> Result<ChartOfAccounts, LedgerError> {
        self.store.load_chart().await
    }

    /// Per-type totals for the accounting equation.
    pub async fn accounting_equation(&self) -> Result<AccountingEquation, LedgerError> {
        Ok(AccountingEquation::from_chart(&self.store.load_chart().await?))
    }

    /// Leaf balances in debit/credit columns.
    pub async fn trial_balance(&self) -> Result<TrialBalance, LedgerError> {
        Ok(TrialBalance::from_chart(&self.store.load_chart().await?))
    }

    /// Recomputes every balance from the journal and compares it with the
    /// stored one. Holds the exclusive scope so no posting is in flight.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconciliationReport, LedgerError> {
        let mut tx = self.begin(LockScope::Exclusive).await?;
        let chart = self.within(tx.lock_all_accounts()).await?;
        let lines = tx.balance_affecting_lines().await?;
        drop(tx);

        let derived = derive_balances(&chart, &lines)?;
        let report = reconcile(&chart, &derived);
        info!(
            checked = report.checked_accounts,
            mismatched = report.mismatches.len(),
            "balance reconciliation finished"
        );
        Ok(report)
    }

    /// Like [`Ledger::reconcile`], but drift is an error.
    ///
    /// # Errors
    ///
    /// `ReconciliationMismatch` listing every drifted account.
    pub async fn verify(&self) -> Result<ReconciliationReport, LedgerError> {
        let report = self.reconcile().await?;
        if report.is_consistent() {
            return Ok(report);
        }
        for m in &report.mismatches {
            warn!(
                account = %m.account_code,
                recorded = %m.recorded,
                derived = %m.derived,
                "balance drift detected"
            );
        }
        Err(LedgerError::ReconciliationMismatch {
            mismatches: report.mismatches,
        })
    }

    /// Re-derives drifted balances from the journal and writes them, each
    /// with an audit record carrying `reason`. Nothing is written for
    /// accounts that already agree.
    #[instrument(skip(self))]
    pub async fn repair_balances(&self, reason: &str) -> Result<RepairOutcome, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::MissingReason("repair balances"));
        }
        let mut tx = self.begin(LockScope::Exclusive).await?;
        let chart = self.within(tx.lock_all_accounts()).await?;
        let lines = tx.balance_affecting_lines().await?;
        let derived = derive_balances(&chart, &lines)?;
        let report = reconcile(&chart, &derived);

        let now = self.clock.now();
        let mut corrections = Vec::with_capacity(report.mismatches.len());
        for mismatch in &report.mismatches {
            let correction = BalanceCorrection::for_mismatch(mismatch, reason, now);
            tx.record_correction(&correction).await?;
            corrections.push(correction);
        }
        tx.commit().await?;

        for c in &corrections {
            warn!(
                account = %c.account_code,
                from = %c.recorded_balance,
                to = %c.derived_balance,
                reason = %c.reason,
                "balance repaired from journal"
            );
        }
        Ok(RepairOutcome {
            report,
            corrections,
        })
    }

    /// Opens a unit of work within the lock timeout.
    pub(crate) async fn begin(&self, scope: LockScope) -> Result<S::Tx, LedgerError> {
        self.within(self.store.begin(scope)).await
    }

    /// Locks `codes` within the lock timeout, keyed by code.
    pub(crate) async fn lock(
        &self,
        tx: &mut S::Tx,
        codes: BTreeSet<String>,
    ) -> Result<BTreeMap<String, Account>, LedgerError> {
        let accounts = self.within(tx.lock_accounts(&codes)).await?;
        Ok(accounts.into_iter().map(|a| (a.code.clone(), a)).collect())
    }

    /// Bounds a lock wait by the configured timeout.
    pub(crate) async fn within<T>(
        &self,
        wait: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        if let Ok(result) = tokio::time::timeout(self.options.lock_timeout, wait).await {
            return result;
        }
        let waited_ms = u64::try_from(self.options.lock_timeout.as_millis()).unwrap_or(u64::MAX);
        warn!(waited_ms, "gave up waiting for ledger locks");
        Err(LedgerError::PostingTimeout { waited_ms })
    }

    /// Rejects an entry whose idempotency key belongs to another entry.
    pub(crate) async fn ensure_source_unused(
        &self,
        tx: &mut S::Tx,
        entry: &JournalEntry,
    ) -> Result<(), LedgerError> {
        let Some((reference_type, source_id)) = entry.source_key() else {
            return Ok(());
        };
        match tx.find_by_source(reference_type, source_id).await? {
            Some(existing) if existing != entry.id => {
                Err(LedgerError::AlreadyPosted { entry_id: existing })
            }
            _ => Ok(()),
        }
    }

    /// Rejects an entry dated inside a closed period unless it may bypass.
    pub(crate) async fn ensure_period_open(
        &self,
        tx: &mut S::Tx,
        entry: &JournalEntry,
    ) -> Result<(), LedgerError> {
        if entry.reference_type.bypasses_closed_period() {
            return Ok(());
        }
        let periods = tx
            .periods_overlapping(entry.entry_date, entry.entry_date)
            .await?;
        fiscal::ensure_postable(&periods, entry.entry_date, entry.reference_type)
    }
}

/// Every locked account must be an active leaf.
pub(crate) fn ensure_all_postable(accounts: &BTreeMap<String, Account>) -> Result<(), LedgerError> {
    for account in accounts.values() {
        if let Some(issue) = account.posting_issue() {
            return Err(LedgerError::invalid_account(&account.code, issue));
        }
    }
    Ok(())
}

/// Stages one balance delta per line and returns the net change per
/// account, in code order.
pub(crate) async fn stage_deltas<T: LedgerTx>(
    tx: &mut T,
    accounts: &BTreeMap<String, Account>,
    entry: &JournalEntry,
) -> Result<Vec<BalanceChange>, LedgerError> {
    let mut net: BTreeMap<&str, Decimal> = BTreeMap::new();
    for line in &entry.lines {
        let account = accounts.get(&line.account_code).ok_or_else(|| {
            LedgerError::Storage(format!("account {} was not locked", line.account_code))
        })?;
        let delta = account
            .normal_balance()
            .balance_change(line.debit_amount, line.credit_amount);
        tx.apply_balance_delta(&line.account_code, delta).await?;
        let slot = net.entry(account.code.as_str()).or_default();
        *slot = bounded_add(*slot, delta, || format!("netting account {}", account.code))?;
    }

    net.into_iter()
        .map(|(code, delta)| {
            let before = accounts.get(code).map_or(Decimal::ZERO, |a| a.balance);
            Ok(BalanceChange {
                account_code: code.to_string(),
                delta,
                balance_after: bounded_add(before, delta, || {
                    format!("updating the balance of {code}")
                })?,
            })
        })
        .collect()
}
