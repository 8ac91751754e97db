//! Core ledger logic for Saldo.
//!
//! This crate turns business events into balanced double-entry postings,
//! keeps the per-account balance projection consistent with the posted
//! journal, and closes accounting periods. It has ZERO web or database
//! dependencies: persistence sits behind [`ledger::LedgerStore`].
//!
//! # Modules
//!
//! - `ledger` - Chart of accounts, entry building, posting, balance projection
//! - `fiscal` - Accounting periods and the period-closing state machine
//! - `workflow` - Reversal and void of journal entries
//! - `clock` - Time source for entry dates and audit timestamps

pub mod clock;
pub mod fiscal;
pub mod ledger;
pub mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ledger::{Ledger, LedgerError, LedgerOptions};
