//! Postgres enum types and their mapping to ledger types.

use saldo_core::ledger;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "account_type")]
#[allow(missing_docs)]
pub enum AccountType {
    #[sea_orm(string_value = "ASSET")]
    Asset,
    #[sea_orm(string_value = "LIABILITY")]
    Liability,
    #[sea_orm(string_value = "EQUITY")]
    Equity,
    #[sea_orm(string_value = "REVENUE")]
    Revenue,
    #[sea_orm(string_value = "EXPENSE")]
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "reference_type")]
#[allow(missing_docs)]
pub enum ReferenceType {
    #[sea_orm(string_value = "SALE")]
    Sale,
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    #[sea_orm(string_value = "PAYMENT")]
    Payment,
    #[sea_orm(string_value = "CLOSING")]
    Closing,
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
    #[sea_orm(string_value = "REVERSAL")]
    Reversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "entry_status")]
#[allow(missing_docs)]
pub enum EntryStatus {
    #[sea_orm(string_value = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "POSTED")]
    Posted,
    #[sea_orm(string_value = "VOIDED")]
    Voided,
    #[sea_orm(string_value = "REVERSED")]
    Reversed,
}

/// Generates both `From` directions between a column enum and the ledger
/// enum of the same name.
macro_rules! mirror_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl From<ledger::$name> for $name {
            fn from(value: ledger::$name) -> Self {
                match value {
                    $(ledger::$name::$variant => Self::$variant,)+
                }
            }
        }

        impl From<$name> for ledger::$name {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => Self::$variant,)+
                }
            }
        }
    };
}

mirror_enum!(AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
});

mirror_enum!(ReferenceType {
    Sale,
    Purchase,
    Payment,
    Closing,
    Adjustment,
    Reversal,
});

mirror_enum!(EntryStatus {
    Draft,
    Posted,
    Voided,
    Reversed,
});

impl EntryStatus {
    /// Statuses whose lines count toward balances.
    pub const BALANCE_AFFECTING: [Self; 2] = [Self::Posted, Self::Reversed];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_status_maps_back() {
        for status in ledger::EntryStatus::ALL {
            let column: EntryStatus = status.into();
            assert_eq!(ledger::EntryStatus::from(column), status);
        }
    }

    #[test]
    fn test_balance_affecting_matches_domain() {
        for status in ledger::EntryStatus::ALL {
            let column: EntryStatus = status.into();
            assert_eq!(
                EntryStatus::BALANCE_AFFECTING.contains(&column),
                status.affects_balance()
            );
        }
    }
}
