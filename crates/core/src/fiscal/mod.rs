//! Accounting periods and period closing.
//!
//! Closing zeroes every revenue and expense leaf into retained earnings
//! with one CLOSING journal entry and blocks ordinary postings dated inside
//! the period. Reopening reverses that entry.

pub mod closing;
pub mod period;
pub mod service;

pub use closing::{ClosingPlan, ClosingPreview, ClosingResult, LastClosingInfo, ReopenResult, plan_closing};
pub use period::{AccountingPeriod, PeriodStatus, ensure_postable, validate_range};
