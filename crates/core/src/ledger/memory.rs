//! In-memory ledger store.
//!
//! Committed state lives behind one mutex and is replaced wholesale on
//! commit, so a failed commit leaves no partial writes. Row locks are one
//! async mutex per account code; the period postability lock is an async
//! read/write lock (postings read, close/reopen/repair write).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use saldo_shared::types::{AccountingPeriodId, JournalEntryId};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

use super::account::{Account, ChartOfAccounts};
use super::balance::BalanceCorrection;
use super::entry::{JournalEntry, JournalLine, StatusChange};
use super::error::{AccountIssue, LedgerError};
use super::store::{LedgerStore, LedgerTx, LockScope};
use super::types::{EntryStatus, ReferenceType};
use super::validation::bounded_add;
use crate::fiscal::AccountingPeriod;

#[derive(Debug, Clone, Default)]
struct State {
    accounts: BTreeMap<String, Account>,
    entries: BTreeMap<JournalEntryId, JournalEntry>,
    sources: HashMap<(ReferenceType, String), JournalEntryId>,
    periods: BTreeMap<AccountingPeriodId, AccountingPeriod>,
    corrections: Vec<BalanceCorrection>,
}

impl State {
    fn chart(&self) -> Result<ChartOfAccounts, LedgerError> {
        ChartOfAccounts::new(self.accounts.values().cloned())
    }

    fn sorted_periods(&self) -> Vec<AccountingPeriod> {
        let mut periods: Vec<_> = self.periods.values().cloned().collect();
        periods.sort_by_key(|p| p.start_date);
        periods
    }

    fn count_drafts(&self, start: NaiveDate, end: NaiveDate) -> usize {
        self.entries
            .values()
            .filter(|e| e.status == EntryStatus::Draft && (start..=end).contains(&e.entry_date))
            .count()
    }

    fn claim_source(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        let Some((reference_type, source_id)) = entry.source_key() else {
            return Ok(());
        };
        let key = (reference_type, source_id.to_string());
        match self.sources.get(&key) {
            Some(existing) if *existing != entry.id => {
                Err(LedgerError::AlreadyPosted { entry_id: *existing })
            }
            _ => {
                self.sources.insert(key, entry.id);
                Ok(())
            }
        }
    }

    fn apply(&mut self, write: StagedWrite) -> Result<(), LedgerError> {
        match write {
            StagedWrite::InsertEntry(entry) => {
                if let Some(existing) = self.entries.get(&entry.id) {
                    return Err(if existing.status.affects_balance() {
                        LedgerError::AlreadyPosted { entry_id: entry.id }
                    } else {
                        LedgerError::DuplicateEntry(entry.id)
                    });
                }
                if entry.status.affects_balance() {
                    self.claim_source(&entry)?;
                }
                self.entries.insert(entry.id, entry);
            }
            StagedWrite::ChangeStatus(change) => {
                let current = self
                    .entries
                    .get(&change.entry_id)
                    .cloned()
                    .ok_or(LedgerError::EntryNotFound(change.entry_id))?;
                if current.status != change.from {
                    return Err(LedgerError::InvalidTransition {
                        entry_id: change.entry_id,
                        from: current.status,
                        action: "change status of",
                    });
                }
                if change.to == EntryStatus::Posted {
                    self.claim_source(&current)?;
                }
                if let Some(entry) = self.entries.get_mut(&change.entry_id) {
                    entry.status = change.to;
                    match change.to {
                        EntryStatus::Posted => entry.posted_at = Some(change.at),
                        EntryStatus::Reversed => entry.reversed_by_entry_id = change.reversed_by,
                        EntryStatus::Draft | EntryStatus::Voided => {}
                    }
                }
            }
            StagedWrite::ApplyDelta { code, delta } => {
                let account = self.leaf_mut(&code)?;
                account.balance = bounded_add(account.balance, delta, || {
                    format!("updating the balance of {code}")
                })?;
            }
            StagedWrite::Correction(correction) => {
                let account = self.leaf_mut(&correction.account_code)?;
                account.balance = correction.derived_balance;
                self.corrections.push(correction);
            }
            StagedWrite::SavePeriod(period) => {
                self.periods.insert(period.id, period);
            }
        }
        Ok(())
    }

    fn leaf_mut(&mut self, code: &str) -> Result<&mut Account, LedgerError> {
        let account = self
            .accounts
            .get_mut(code)
            .ok_or_else(|| LedgerError::invalid_account(code, AccountIssue::NotFound))?;
        if account.is_header {
            return Err(LedgerError::invalid_account(code, AccountIssue::Header));
        }
        Ok(account)
    }
}

#[derive(Debug)]
enum StagedWrite {
    InsertEntry(JournalEntry),
    ChangeStatus(StatusChange),
    ApplyDelta { code: String, delta: Decimal },
    Correction(BalanceCorrection),
    SavePeriod(AccountingPeriod),
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    account_locks: DashMap<String, Arc<Mutex<()>>>,
    postability: Arc<RwLock<()>>,
    fail_next_commit: AtomicBool,
}

/// [`LedgerStore`] kept in process memory.
///
/// Cloning is cheap and clones share state, so one store can back several
/// [`Ledger`](super::Ledger) handles across tasks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with a validated chart of accounts.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Result<Self, LedgerError> {
        let chart = ChartOfAccounts::new(accounts)?;
        let state = State {
            accounts: chart.iter().map(|a| (a.code.clone(), a.clone())).collect(),
            ..State::default()
        };
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                ..Shared::default()
            }),
        })
    }

    /// Adds an account, rejecting it if the chart would become invalid.
    pub async fn insert_account(&self, account: Account) -> Result<(), LedgerError> {
        let mut state = self.shared.state.lock().await;
        let candidate = state
            .accounts
            .values()
            .cloned()
            .chain(std::iter::once(account.clone()));
        ChartOfAccounts::new(candidate)?;
        state.accounts.insert(account.code.clone(), account);
        Ok(())
    }

    /// Marks an account inactive. Its balance and history are kept.
    pub async fn deactivate_account(&self, code: &str) -> Result<(), LedgerError> {
        let mut state = self.shared.state.lock().await;
        let account = state
            .accounts
            .get_mut(code)
            .ok_or_else(|| LedgerError::invalid_account(code, AccountIssue::NotFound))?;
        account.is_active = false;
        Ok(())
    }

    /// Makes the next commit fail midway, as if the process crashed.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Overwrites a stored balance without touching the journal.
    #[cfg(test)]
    pub(crate) async fn corrupt_balance(&self, code: &str, balance: Decimal) {
        let mut state = self.shared.state.lock().await;
        if let Some(account) = state.accounts.get_mut(code) {
            account.balance = balance;
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self, scope: LockScope) -> Result<MemoryTx, LedgerError> {
        let postability = Arc::clone(&self.shared.postability);
        let (shared_guard, exclusive_guard) = match scope {
            LockScope::Posting => (Some(postability.read_owned().await), None),
            LockScope::Exclusive => (None, Some(postability.write_owned().await)),
        };
        debug!(?scope, "ledger unit of work started");
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            _shared_guard: shared_guard,
            _exclusive_guard: exclusive_guard,
            held: BTreeMap::new(),
            staged: Vec::new(),
        })
    }

    async fn load_chart(&self) -> Result<ChartOfAccounts, LedgerError> {
        self.shared.state.lock().await.chart()
    }

    async fn find_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, LedgerError> {
        Ok(self.shared.state.lock().await.entries.get(&id).cloned())
    }

    async fn list_periods(&self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        Ok(self.shared.state.lock().await.sorted_periods())
    }

    async fn list_corrections(&self) -> Result<Vec<BalanceCorrection>, LedgerError> {
        Ok(self.shared.state.lock().await.corrections.clone())
    }

    async fn count_drafts(&self, start: NaiveDate, end: NaiveDate) -> Result<usize, LedgerError> {
        Ok(self.shared.state.lock().await.count_drafts(start, end))
    }
}

/// Unit of work over a [`MemoryStore`]. Dropping it rolls back.
pub struct MemoryTx {
    shared: Arc<Shared>,
    _shared_guard: Option<OwnedRwLockReadGuard<()>>,
    _exclusive_guard: Option<OwnedRwLockWriteGuard<()>>,
    held: BTreeMap<String, OwnedMutexGuard<()>>,
    staged: Vec<StagedWrite>,
}

impl MemoryTx {
    async fn lock_codes<'a>(&mut self, codes: impl IntoIterator<Item = &'a String>) {
        for code in codes {
            if self.held.contains_key(code) {
                continue;
            }
            let lock = Arc::clone(&*self.shared.account_locks.entry(code.clone()).or_default());
            let guard = lock.lock_owned().await;
            self.held.insert(code.clone(), guard);
        }
    }

    fn ensure_held(&self, code: &str) -> Result<(), LedgerError> {
        if self.held.contains_key(code) {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!("account {code} is not locked")))
        }
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_accounts(&mut self, codes: &BTreeSet<String>) -> Result<Vec<Account>, LedgerError> {
        self.lock_codes(codes).await;
        let state = self.shared.state.lock().await;
        codes
            .iter()
            .map(|code| {
                state
                    .accounts
                    .get(code)
                    .cloned()
                    .ok_or_else(|| LedgerError::invalid_account(code, AccountIssue::NotFound))
            })
            .collect()
    }

    async fn lock_all_accounts(&mut self) -> Result<ChartOfAccounts, LedgerError> {
        let codes: BTreeSet<String> = {
            let state = self.shared.state.lock().await;
            state.accounts.keys().cloned().collect()
        };
        self.lock_codes(&codes).await;
        self.shared.state.lock().await.chart()
    }

    async fn find_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, LedgerError> {
        Ok(self.shared.state.lock().await.entries.get(&id).cloned())
    }

    async fn find_by_source(
        &mut self,
        reference_type: ReferenceType,
        source_id: &str,
    ) -> Result<Option<JournalEntryId>, LedgerError> {
        let state = self.shared.state.lock().await;
        Ok(state
            .sources
            .get(&(reference_type, source_id.to_string()))
            .copied())
    }

    async fn periods_overlapping(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AccountingPeriod>, LedgerError> {
        let state = self.shared.state.lock().await;
        Ok(state
            .sorted_periods()
            .into_iter()
            .filter(|p| p.overlaps(start, end))
            .collect())
    }

    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        Ok(self.shared.state.lock().await.sorted_periods())
    }

    async fn find_period(
        &mut self,
        id: AccountingPeriodId,
    ) -> Result<Option<AccountingPeriod>, LedgerError> {
        Ok(self.shared.state.lock().await.periods.get(&id).cloned())
    }

    async fn count_drafts(&mut self, start: NaiveDate, end: NaiveDate) -> Result<usize, LedgerError> {
        Ok(self.shared.state.lock().await.count_drafts(start, end))
    }

    async fn balance_affecting_lines(&mut self) -> Result<Vec<JournalLine>, LedgerError> {
        let state = self.shared.state.lock().await;
        Ok(state
            .entries
            .values()
            .filter(|e| e.status.affects_balance())
            .flat_map(|e| e.lines.iter().cloned())
            .collect())
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        self.staged.push(StagedWrite::InsertEntry(entry.clone()));
        Ok(())
    }

    async fn change_status(&mut self, change: &StatusChange) -> Result<(), LedgerError> {
        self.staged.push(StagedWrite::ChangeStatus(change.clone()));
        Ok(())
    }

    async fn apply_balance_delta(&mut self, code: &str, delta: Decimal) -> Result<(), LedgerError> {
        self.ensure_held(code)?;
        self.staged.push(StagedWrite::ApplyDelta {
            code: code.to_string(),
            delta,
        });
        Ok(())
    }

    async fn record_correction(&mut self, correction: &BalanceCorrection) -> Result<(), LedgerError> {
        self.ensure_held(&correction.account_code)?;
        self.staged.push(StagedWrite::Correction(correction.clone()));
        Ok(())
    }

    async fn save_period(&mut self, period: &AccountingPeriod) -> Result<(), LedgerError> {
        self.staged.push(StagedWrite::SavePeriod(period.clone()));
        Ok(())
    }

    async fn commit(mut self) -> Result<(), LedgerError> {
        let staged = std::mem::take(&mut self.staged);
        let crash_at = self
            .shared
            .fail_next_commit
            .swap(false, Ordering::SeqCst)
            .then_some(staged.len() / 2);

        let mut state = self.shared.state.lock().await;
        let mut next = state.clone();
        let writes = staged.len();
        for (i, write) in staged.into_iter().enumerate() {
            if crash_at == Some(i) {
                return Err(LedgerError::Storage("simulated crash during commit".into()));
            }
            next.apply(write)?;
        }
        *state = next;
        debug!(writes, "ledger unit of work committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AccountType, MAX_AMOUNT};
    use rust_decimal_macros::dec;

    fn store() -> MemoryStore {
        MemoryStore::with_accounts([
            Account::leaf("1101", "Kas", AccountType::Asset),
            Account::leaf("4101", "Pendapatan", AccountType::Revenue),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_writes_nothing() {
        let store = store();
        let mut tx = store.begin(LockScope::Posting).await.unwrap();
        tx.lock_accounts(&BTreeSet::from(["1101".to_string()]))
            .await
            .unwrap();
        tx.apply_balance_delta("1101", dec!(5)).await.unwrap();
        drop(tx);

        let chart = store.load_chart().await.unwrap();
        assert_eq!(chart.get("1101").unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_delta_requires_lock() {
        let store = store();
        let mut tx = store.begin(LockScope::Posting).await.unwrap();
        let err = tx.apply_balance_delta("1101", dec!(5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_unknown_account_lock_fails() {
        let store = store();
        let mut tx = store.begin(LockScope::Posting).await.unwrap();
        let err = tx
            .lock_accounts(&BTreeSet::from(["9999".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidAccount {
                issue: AccountIssue::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_crash_discards_every_write() {
        let store = store();
        store.fail_next_commit();
        let mut tx = store.begin(LockScope::Posting).await.unwrap();
        tx.lock_accounts(&BTreeSet::from(["1101".to_string(), "4101".to_string()]))
            .await
            .unwrap();
        tx.apply_balance_delta("1101", dec!(5)).await.unwrap();
        tx.apply_balance_delta("4101", dec!(5)).await.unwrap();
        assert!(tx.commit().await.is_err());

        let chart = store.load_chart().await.unwrap();
        assert!(chart.iter().all(|a| a.balance.is_zero()));
    }

    #[tokio::test]
    async fn test_out_of_range_balance_fails_commit() {
        let store = store();
        let mut tx = store.begin(LockScope::Posting).await.unwrap();
        tx.lock_accounts(&BTreeSet::from(["1101".to_string()]))
            .await
            .unwrap();
        tx.apply_balance_delta("1101", MAX_AMOUNT).await.unwrap();
        tx.apply_balance_delta("1101", MAX_AMOUNT).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, LedgerError::AmountOverflow(_)));

        let chart = store.load_chart().await.unwrap();
        assert_eq!(chart.get("1101").unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_exclusive_scope_waits_for_postings() {
        let store = store();
        let posting = store.begin(LockScope::Posting).await.unwrap();
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.begin(LockScope::Exclusive),
        )
        .await;
        assert!(pending.is_err());
        drop(posting);
        assert!(store.begin(LockScope::Exclusive).await.is_ok());
    }

    #[tokio::test]
    async fn test_insert_account_validates_chart() {
        let store = store();
        let orphan = Account::leaf("1102", "Bank", AccountType::Asset).under("1100");
        assert!(store.insert_account(orphan).await.is_err());
        store
            .insert_account(Account::leaf("1102", "Bank", AccountType::Asset))
            .await
            .unwrap();
        assert_eq!(store.load_chart().await.unwrap().len(), 3);
    }
}
