//! Reversal operation of the ledger engine.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use saldo_shared::types::JournalEntryId;
use tracing::{info, instrument};

use super::lifecycle::EntryLifecycle;
use super::reversal::reversal_entry;
use crate::clock::Clock;
use crate::ledger::service::stage_deltas;
use crate::ledger::{
    Account, EntryStatus, JournalEntry, Ledger, LedgerError, LedgerStore, LedgerTx, LockScope,
    PostedEntry, ReferenceType, StatusChange,
};

impl<S: LedgerStore, C: Clock> Ledger<S, C> {
    /// Reverses a POSTED entry with a new REVERSAL entry and marks the
    /// original REVERSED, atomically.
    ///
    /// `date` defaults to today. Reversals may be dated into closed periods.
    ///
    /// # Errors
    ///
    /// - `EntryNotFound` for an unknown id
    /// - `AlreadyReversed` if a reversal already exists
    /// - `InvalidTransition` for drafts, voided entries, reversals, and
    ///   closing entries (use `reopen_period`)
    #[instrument(skip(self, reason))]
    pub async fn reverse(
        &self,
        id: JournalEntryId,
        date: Option<NaiveDate>,
        reason: Option<&str>,
    ) -> Result<PostedEntry, LedgerError> {
        let date = date.unwrap_or_else(|| self.clock.today());
        let mut tx = self.begin(LockScope::Posting).await?;
        let (original, accounts) = self.lock_original(&mut tx, id).await?;
        EntryLifecycle::reverse(&original)?;

        let posted = self
            .reverse_locked(&mut tx, &original, &accounts, date, reason)
            .await?;
        tx.commit().await?;
        Ok(posted)
    }

    /// Loads `id` and locks its accounts, re-reading the entry under the
    /// locks so a concurrent reversal is observed.
    pub(crate) async fn lock_original(
        &self,
        tx: &mut S::Tx,
        id: JournalEntryId,
    ) -> Result<(JournalEntry, BTreeMap<String, Account>), LedgerError> {
        let found = tx
            .find_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        let accounts = self.lock(tx, found.account_codes()).await?;
        let original = tx
            .find_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        Ok((original, accounts))
    }

    /// Stages the reversal of an already locked `original`.
    ///
    /// Accounts are not re-checked for postability: a reversal must
    /// succeed even after an account was deactivated.
    pub(crate) async fn reverse_locked(
        &self,
        tx: &mut S::Tx,
        original: &JournalEntry,
        accounts: &BTreeMap<String, Account>,
        date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<PostedEntry, LedgerError> {
        EntryLifecycle::reverse_any(original)?;
        let source = original.id.to_string();
        if tx
            .find_by_source(ReferenceType::Reversal, &source)
            .await?
            .is_some()
        {
            return Err(LedgerError::AlreadyReversed {
                entry_id: original.id,
            });
        }

        let now = self.clock.now();
        let reversal = reversal_entry(original, date, reason, now);
        tx.insert_entry(&reversal).await?;
        let balance_changes = stage_deltas(tx, accounts, &reversal).await?;
        tx.change_status(&StatusChange {
            entry_id: original.id,
            from: EntryStatus::Posted,
            to: EntryStatus::Reversed,
            at: now,
            reversed_by: Some(reversal.id),
        })
        .await?;

        info!(
            original = %original.id,
            reversal = %reversal.id,
            "journal entry reversed"
        );
        Ok(PostedEntry {
            entry: reversal,
            balance_changes,
        })
    }
}
