//! Repository abstractions for data access.
//!
//! [`PgLedgerStore`] is the only path that writes journal entries or
//! balances. [`AccountRepository`] maintains the chart of accounts.

pub mod account;
pub mod ledger_store;

pub use account::{AccountError, AccountRepository};
pub use ledger_store::{PgLedgerStore, PgLedgerTx};
