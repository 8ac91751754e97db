//! `SeaORM` entities for the ledger schema.

pub mod accounting_periods;
pub mod accounts;
pub mod balance_corrections;
pub mod journal_entries;
pub mod journal_lines;
pub mod sea_orm_active_enums;

pub mod prelude {
    //! Entity re-exports.
    pub use super::accounting_periods::Entity as AccountingPeriods;
    pub use super::accounts::Entity as Accounts;
    pub use super::balance_corrections::Entity as BalanceCorrections;
    pub use super::journal_entries::Entity as JournalEntries;
    pub use super::journal_lines::Entity as JournalLines;
}
