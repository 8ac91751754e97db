//! Period closing operations of the ledger engine.
//!
//! Close, reopen and balance repair run in the exclusive scope: no posting
//! is in flight while revenue and expense balances are read and zeroed, and
//! none can slip into the period between the check and the close.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use saldo_shared::types::AccountingPeriodId;
use tracing::{info, instrument};

use super::closing::{
    ClosingPreview, ClosingResult, LastClosingInfo, ReopenResult, plan_closing,
};
use super::period::{AccountingPeriod, PeriodStatus, validate_range};
use crate::clock::Clock;
use crate::ledger::service::stage_deltas;
use crate::ledger::{
    EntryStatus, JournalEntry, Ledger, LedgerError, LedgerStore, LedgerTx, LockScope, PostedEntry,
    ReferenceType,
};

/// Idempotency key of a period's `seq`-th closing entry. The first close
/// uses the bare period id; closes after a reopen append the sequence.
fn closing_source_id(period_id: AccountingPeriodId, seq: u32) -> String {
    if seq <= 1 {
        period_id.to_string()
    } else {
        format!("{period_id}/{seq}")
    }
}

/// Why `[start, end]` cannot become a period next to `overlapping`: it
/// touches a closed period, or an open one with other bounds.
fn range_conflict(
    overlapping: &[AccountingPeriod],
    start: NaiveDate,
    end: NaiveDate,
) -> Option<LedgerError> {
    if let Some(closed) = overlapping.iter().find(|p| p.is_closed) {
        return Some(LedgerError::PeriodAlreadyClosed {
            period_id: closed.id,
            start: closed.start_date,
            end: closed.end_date,
        });
    }
    overlapping
        .iter()
        .find(|p| p.start_date != start || p.end_date != end)
        .map(|open| LedgerError::PeriodOverlap {
            period_id: open.id,
            start: open.start_date,
            end: open.end_date,
        })
}

fn closing_description(description: &str, start: NaiveDate, end: NaiveDate) -> String {
    match description.trim() {
        "" => format!("Closing entry {start} to {end}"),
        given => given.to_string(),
    }
}

impl<S: LedgerStore, C: Clock> Ledger<S, C> {
    /// Computes what closing `[start, end]` would post, without writing.
    #[instrument(skip(self))]
    pub async fn preview_close(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ClosingPreview, LedgerError> {
        validate_range(start, end)?;
        let chart = self.store.load_chart().await?;
        let periods = self.store.list_periods().await?;
        let plan = plan_closing(&chart, &self.options.retained_earnings_code)?;

        let overlapping: Vec<_> = periods
            .into_iter()
            .filter(|p| p.overlaps(start, end))
            .collect();
        let drafts = self.store.count_drafts(start, end).await?;

        let blocked_by = range_conflict(&overlapping, start, end)
            .or_else(|| {
                (drafts > 0).then_some(LedgerError::DraftsInPeriod {
                    count: drafts,
                    start,
                    end,
                })
            })
            .or_else(|| plan.is_empty().then_some(LedgerError::NothingToClose { start, end }))
            .map(|err| err.to_string());

        Ok(ClosingPreview {
            start_date: start,
            end_date: end,
            status: PeriodStatus::Closing,
            plan,
            can_close: blocked_by.is_none(),
            blocked_by,
        })
    }

    /// Closes `[start, end]`: posts one CLOSING entry dated `end` that zeroes
    /// every revenue and expense leaf into retained earnings, and marks the
    /// period CLOSED, atomically.
    ///
    /// An existing open period with exactly this range is reused; otherwise
    /// a new one is created. `description` becomes the header of the closing
    /// entry and of a newly created period.
    ///
    /// # Errors
    ///
    /// - `PeriodAlreadyClosed` if the range overlaps a closed period
    /// - `PeriodOverlap` if it overlaps an open period with other bounds
    /// - `DraftsInPeriod` while drafts dated inside the range exist
    /// - `NothingToClose` if all temporary balances are zero
    /// - `InvalidAccount` if retained earnings is missing or not equity
    #[instrument(skip(self, description))]
    pub async fn close_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        description: &str,
    ) -> Result<ClosingResult, LedgerError> {
        validate_range(start, end)?;
        let mut tx = self.begin(LockScope::Exclusive).await?;

        let overlapping = tx.periods_overlapping(start, end).await?;
        if let Some(conflict) = range_conflict(&overlapping, start, end) {
            return Err(conflict);
        }
        let drafts = tx.count_drafts(start, end).await?;
        if drafts > 0 {
            return Err(LedgerError::DraftsInPeriod {
                count: drafts,
                start,
                end,
            });
        }
        let now = self.clock.now();
        let description = closing_description(description, start, end);
        let mut period = match overlapping.into_iter().next() {
            Some(existing) => existing,
            None => AccountingPeriod::open(start, end, description.as_str(), now)?,
        };

        let chart = self.within(tx.lock_all_accounts()).await?;
        let plan = plan_closing(&chart, &self.options.retained_earnings_code)?;
        if plan.is_empty() {
            return Err(LedgerError::NothingToClose { start, end });
        }

        let mut seq = 1;
        while tx
            .find_by_source(ReferenceType::Closing, &closing_source_id(period.id, seq))
            .await?
            .is_some()
        {
            seq += 1;
        }
        let draft = self
            .entry(ReferenceType::Closing, end)
            .description(description)
            .reference(format!("CLOSE-{start}-{end}"))
            .source_id(closing_source_id(period.id, seq))
            .lines(plan.lines.clone())
            .build()?;
        let entry = JournalEntry::from_draft(draft, EntryStatus::Posted, now);

        let accounts: BTreeMap<_, _> = chart
            .leaves()
            .filter(|a| entry.lines.iter().any(|l| l.account_code == a.code))
            .map(|a| (a.code.clone(), a.clone()))
            .collect();
        tx.insert_entry(&entry).await?;
        let balance_changes = stage_deltas(&mut tx, &accounts, &entry).await?;

        period.mark_closed(entry.id, plan.total_revenue, plan.total_expense, now);
        tx.save_period(&period).await?;
        tx.commit().await?;

        info!(
            period_id = %period.id,
            closing_entry = %entry.id,
            net_income = %period.net_income,
            "accounting period closed"
        );
        Ok(ClosingResult {
            period,
            closing_entry: PostedEntry {
                entry,
                balance_changes,
            },
        })
    }

    /// Reopens the latest closed period by reversing its closing entry.
    ///
    /// # Errors
    ///
    /// - `MissingReason` for a blank reason
    /// - `PeriodNotFound` / `PeriodNotClosed`
    /// - `LaterPeriodClosed` if a later period is still closed
    #[instrument(skip(self, reason))]
    pub async fn reopen_period(
        &self,
        period_id: AccountingPeriodId,
        reason: &str,
    ) -> Result<ReopenResult, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::MissingReason("reopen a period"));
        }
        let mut tx = self.begin(LockScope::Exclusive).await?;
        let mut period = tx
            .find_period(period_id)
            .await?
            .ok_or(LedgerError::PeriodNotFound(period_id))?;
        if !period.is_closed {
            return Err(LedgerError::PeriodNotClosed(period_id));
        }
        let periods = tx.list_periods().await?;
        if let Some(later) = periods
            .iter()
            .find(|p| p.is_closed && p.id != period.id && p.end_date > period.end_date)
        {
            return Err(LedgerError::LaterPeriodClosed {
                period_id: later.id,
            });
        }
        let closing_id = period.closing_journal_id.ok_or_else(|| {
            LedgerError::Storage(format!("closed period {period_id} has no closing journal"))
        })?;

        let (closing, accounts) = self.lock_original(&mut tx, closing_id).await?;
        let reversal = self
            .reverse_locked(&mut tx, &closing, &accounts, period.end_date, Some(reason))
            .await?;
        period.mark_reopened(self.clock.now());
        tx.save_period(&period).await?;
        tx.commit().await?;

        info!(period_id = %period.id, reason, "accounting period reopened");
        Ok(ReopenResult { period, reversal })
    }

    /// The latest closed period and the suggested next start date.
    pub async fn last_closing_info(&self) -> Result<LastClosingInfo, LedgerError> {
        let periods = self.store.list_periods().await?;
        Ok(LastClosingInfo::from_periods(&periods))
    }

    /// Whether `date` falls inside a closed period.
    pub async fn is_date_in_closed_period(&self, date: NaiveDate) -> Result<bool, LedgerError> {
        let periods = self.store.list_periods().await?;
        Ok(periods.iter().any(|p| p.is_closed && p.contains_date(date)))
    }

    /// Every accounting period, ordered by start date.
    pub async fn periods(&self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        self.store.list_periods().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_source_id_sequence() {
        let id = AccountingPeriodId::new();
        assert_eq!(closing_source_id(id, 1), id.to_string());
        assert_eq!(closing_source_id(id, 3), format!("{id}/3"));
    }
}
