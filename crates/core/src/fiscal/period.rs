//! Accounting periods.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use saldo_shared::types::{AccountingPeriodId, JournalEntryId};
use serde::{Deserialize, Serialize};

use crate::ledger::{LedgerError, ReferenceType};

/// State of a period in the closing state machine.
///
/// `OPEN -> CLOSING -> CLOSED`. `CLOSING` is the preview state: totals and
/// closing lines are computed but nothing is committed. `CLOSED -> OPEN`
/// happens only by reversing the closing journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    /// Accepting postings.
    Open,
    /// Close previewed, not committed.
    Closing,
    /// Closing journal posted; only closing and reversal entries may land.
    Closed,
}

/// A date range whose revenue and expense are closed to retained earnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    /// Period id; also the `source_id` of its closing journal.
    pub id: AccountingPeriodId,
    /// First day, inclusive.
    pub start_date: NaiveDate,
    /// Last day, inclusive. The closing journal is dated here.
    pub end_date: NaiveDate,
    /// Free-text description.
    pub description: String,
    /// Whether the period is closed.
    pub is_closed: bool,
    /// The CLOSING entry, while closed.
    pub closing_journal_id: Option<JournalEntryId>,
    /// Σ revenue balances closed.
    pub total_revenue: Decimal,
    /// Σ expense balances closed.
    pub total_expense: Decimal,
    /// `total_revenue - total_expense`.
    pub net_income: Decimal,
    /// When it was closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// When it was last reopened.
    pub reopened_at: Option<DateTime<Utc>>,
    /// When the period record was created.
    pub created_at: DateTime<Utc>,
}

impl AccountingPeriod {
    /// Creates an open period.
    pub fn open(
        start_date: NaiveDate,
        end_date: NaiveDate,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        validate_range(start_date, end_date)?;
        Ok(Self {
            id: AccountingPeriodId::new(),
            start_date,
            end_date,
            description: description.into(),
            is_closed: false,
            closing_journal_id: None,
            total_revenue: Decimal::ZERO,
            total_expense: Decimal::ZERO,
            net_income: Decimal::ZERO,
            closed_at: None,
            reopened_at: None,
            created_at: now,
        })
    }

    /// Committed status.
    #[must_use]
    pub const fn status(&self) -> PeriodStatus {
        if self.is_closed {
            PeriodStatus::Closed
        } else {
            PeriodStatus::Open
        }
    }

    /// Returns true if the given date falls within this period.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Returns true if `[start, end]` shares at least one day with this period.
    #[must_use]
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }

    /// Records a committed close.
    pub fn mark_closed(
        &mut self,
        closing_journal_id: JournalEntryId,
        total_revenue: Decimal,
        total_expense: Decimal,
        now: DateTime<Utc>,
    ) {
        self.is_closed = true;
        self.closing_journal_id = Some(closing_journal_id);
        self.total_revenue = total_revenue;
        self.total_expense = total_expense;
        self.net_income = total_revenue - total_expense;
        self.closed_at = Some(now);
    }

    /// Returns the period to OPEN after its closing journal was reversed.
    pub fn mark_reopened(&mut self, now: DateTime<Utc>) {
        self.is_closed = false;
        self.closing_journal_id = None;
        self.total_revenue = Decimal::ZERO;
        self.total_expense = Decimal::ZERO;
        self.net_income = Decimal::ZERO;
        self.closed_at = None;
        self.reopened_at = Some(now);
    }
}

/// Rejects a range whose start is after its end.
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), LedgerError> {
    if start > end {
        return Err(LedgerError::InvalidPeriodRange { start, end });
    }
    Ok(())
}

/// Checks that an entry dated `date` may be posted given `periods`.
///
/// Closing and reversal entries are allowed into closed periods.
pub fn ensure_postable(
    periods: &[AccountingPeriod],
    date: NaiveDate,
    reference_type: ReferenceType,
) -> Result<(), LedgerError> {
    if reference_type.bypasses_closed_period() {
        return Ok(());
    }
    match periods.iter().find(|p| p.is_closed && p.contains_date(date)) {
        Some(period) => Err(LedgerError::PeriodClosed {
            date,
            period_id: period.id,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn january() -> AccountingPeriod {
        AccountingPeriod::open(d(2026, 1, 1), d(2026, 1, 31), "January", Utc::now()).unwrap()
    }

    #[test]
    fn test_contains_date_is_inclusive() {
        let p = january();
        assert!(p.contains_date(d(2026, 1, 1)));
        assert!(p.contains_date(d(2026, 1, 31)));
        assert!(!p.contains_date(d(2026, 2, 1)));
    }

    #[test]
    fn test_overlaps() {
        let p = january();
        assert!(p.overlaps(d(2026, 1, 31), d(2026, 2, 28)));
        assert!(p.overlaps(d(2025, 12, 1), d(2026, 3, 1)));
        assert!(!p.overlaps(d(2026, 2, 1), d(2026, 2, 28)));
    }

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            AccountingPeriod::open(d(2026, 2, 1), d(2026, 1, 1), "", Utc::now()),
            Err(LedgerError::InvalidPeriodRange { .. })
        ));
    }

    #[test]
    fn test_close_and_reopen_lifecycle() {
        let mut p = january();
        assert_eq!(p.status(), PeriodStatus::Open);

        let journal = JournalEntryId::new();
        p.mark_closed(journal, dec!(100000), dec!(30000), Utc::now());
        assert_eq!(p.status(), PeriodStatus::Closed);
        assert_eq!(p.closing_journal_id, Some(journal));
        assert_eq!(p.net_income, dec!(70000));

        p.mark_reopened(Utc::now());
        assert_eq!(p.status(), PeriodStatus::Open);
        assert!(p.closing_journal_id.is_none());
        assert!(p.reopened_at.is_some());
    }

    #[test]
    fn test_closed_period_blocks_ordinary_postings_only() {
        let mut p = january();
        p.mark_closed(JournalEntryId::new(), dec!(0), dec!(0), Utc::now());
        let periods = [p];

        assert!(matches!(
            ensure_postable(&periods, d(2026, 1, 15), ReferenceType::Sale),
            Err(LedgerError::PeriodClosed { .. })
        ));
        assert!(ensure_postable(&periods, d(2026, 1, 15), ReferenceType::Reversal).is_ok());
        assert!(ensure_postable(&periods, d(2026, 1, 15), ReferenceType::Closing).is_ok());
        assert!(ensure_postable(&periods, d(2026, 2, 1), ReferenceType::Sale).is_ok());
    }
}
