//! Time source for the ledger.
//!
//! Entry dates are business dates, so "today" is taken in the books' time
//! zone rather than UTC.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

/// Provides the current instant and business date.
pub trait Clock: Send + Sync {
    /// Current instant, used for `posted_at`, `closed_at` and audit records.
    fn now(&self) -> DateTime<Utc>;

    /// Current business date, used when a caller omits an entry date.
    fn today(&self) -> NaiveDate;
}

/// Wall clock in a fixed business time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    /// Creates a clock that reports dates in `tz`.
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Tz::Asia__Jakarta)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    today: NaiveDate,
}

impl FixedClock {
    /// Freezes the clock at midnight UTC of `date`.
    #[must_use]
    pub fn on(date: NaiveDate) -> Self {
        Self {
            now: date.and_time(NaiveTime::MIN).and_utc(),
            today: date,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_fixed_clock() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let clock = FixedClock::on(date);
        assert_eq!(clock.today(), date);
        assert_eq!(clock.now().date_naive(), date);
    }

    #[test]
    fn test_system_clock_uses_business_zone() {
        let clock = SystemClock::new(Tz::Asia__Jakarta);
        let utc_today = Utc::now().date_naive();
        // Jakarta is UTC+7, so its date is never behind UTC.
        assert!(clock.today() >= utc_today);

        let late_utc = Utc.with_ymd_and_hms(2026, 1, 31, 20, 0, 0).unwrap();
        assert_eq!(late_utc.with_timezone(&Tz::Asia__Jakarta).day(), 1);
    }
}
