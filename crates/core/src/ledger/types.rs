//! Domain enums for the ledger.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored enum label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected label.
    pub value: String,
}

/// Account classification in the chart of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Resources owned (cash, receivables, inventory).
    Asset,
    /// Obligations owed (payables, taxes).
    Liability,
    /// Owner's interest, including retained earnings.
    Equity,
    /// Income earned; closed to retained earnings at period end.
    Revenue,
    /// Costs incurred; closed to retained earnings at period end.
    Expense,
}

impl AccountType {
    /// All account types in chart order.
    pub const ALL: [Self; 5] = [
        Self::Asset,
        Self::Liability,
        Self::Equity,
        Self::Revenue,
        Self::Expense,
    ];

    /// The side on which this type's balance increases.
    #[must_use]
    pub const fn normal_balance(self) -> NormalBalance {
        match self {
            Self::Asset | Self::Expense => NormalBalance::Debit,
            Self::Liability | Self::Equity | Self::Revenue => NormalBalance::Credit,
        }
    }

    /// Revenue and expense accounts are reset to zero by period close.
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        matches!(self, Self::Revenue | Self::Expense)
    }

    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "ASSET",
            Self::Liability => "LIABILITY",
            Self::Equity => "EQUITY",
            Self::Revenue => "REVENUE",
            Self::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant {
                kind: "account type",
                value: s.to_string(),
            })
    }
}

/// Normal-balance convention of an account.
///
/// - Debit-normal (Asset, Expense): balance change = debit - credit
/// - Credit-normal (Liability, Equity, Revenue): balance change = credit - debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalBalance {
    /// Increases on debit.
    Debit,
    /// Increases on credit.
    Credit,
}

impl NormalBalance {
    /// Signed effect of one line on an account's balance.
    #[must_use]
    pub fn balance_change(self, debit: Decimal, credit: Decimal) -> Decimal {
        match self {
            Self::Debit => debit - credit,
            Self::Credit => credit - debit,
        }
    }

    /// The side that increases this balance.
    #[must_use]
    pub const fn increasing_side(self) -> Direction {
        match self {
            Self::Debit => Direction::Debit,
            Self::Credit => Direction::Credit,
        }
    }
}

/// Side of a journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Left side.
    Debit,
    /// Right side.
    Credit,
}

impl Direction {
    /// The other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }
}

/// Business event that produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    /// Sales invoice.
    Sale,
    /// Purchase approval.
    Purchase,
    /// Cash or bank payment/receipt.
    Payment,
    /// Period closing journal.
    Closing,
    /// Manual adjustment.
    Adjustment,
    /// Inverse of an earlier entry.
    Reversal,
}

impl ReferenceType {
    /// All reference types.
    pub const ALL: [Self; 6] = [
        Self::Sale,
        Self::Purchase,
        Self::Payment,
        Self::Closing,
        Self::Adjustment,
        Self::Reversal,
    ];

    /// Closing and reversal entries may be dated inside a closed period.
    #[must_use]
    pub const fn bypasses_closed_period(self) -> bool {
        matches!(self, Self::Closing | Self::Reversal)
    }

    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "SALE",
            Self::Purchase => "PURCHASE",
            Self::Payment => "PAYMENT",
            Self::Closing => "CLOSING",
            Self::Adjustment => "ADJUSTMENT",
            Self::Reversal => "REVERSAL",
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant {
                kind: "reference type",
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of a journal entry.
///
/// `DRAFT -> POSTED -> REVERSED`, or `DRAFT -> VOIDED`. Nothing returns to
/// `DRAFT` and nothing is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    /// Saved but without balance effect.
    Draft,
    /// Balance effect applied.
    Posted,
    /// Draft discarded before posting.
    Voided,
    /// Posted, then cancelled by a reversal entry. Its lines still count.
    Reversed,
}

impl EntryStatus {
    /// All statuses.
    pub const ALL: [Self; 4] = [Self::Draft, Self::Posted, Self::Voided, Self::Reversed];

    /// Whether the entry's lines are part of the balance projection.
    #[must_use]
    pub const fn affects_balance(self) -> bool {
        matches!(self, Self::Posted | Self::Reversed)
    }

    /// Storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Voided => "VOIDED",
            Self::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant {
                kind: "entry status",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(AccountType::Asset, dec!(100), dec!(0), dec!(100))]
    #[case(AccountType::Expense, dec!(0), dec!(40), dec!(-40))]
    #[case(AccountType::Liability, dec!(100), dec!(0), dec!(-100))]
    #[case(AccountType::Equity, dec!(0), dec!(75.50), dec!(75.50))]
    #[case(AccountType::Revenue, dec!(0), dec!(100000), dec!(100000))]
    fn test_balance_change_by_type(
        #[case] account_type: AccountType,
        #[case] debit: Decimal,
        #[case] credit: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(
            account_type.normal_balance().balance_change(debit, credit),
            expected
        );
    }

    #[test]
    fn test_temporary_accounts() {
        assert!(AccountType::Revenue.is_temporary());
        assert!(AccountType::Expense.is_temporary());
        assert!(!AccountType::Equity.is_temporary());
    }

    #[test]
    fn test_only_closing_and_reversal_bypass_closed_periods() {
        for rt in ReferenceType::ALL {
            assert_eq!(
                rt.bypasses_closed_period(),
                matches!(rt, ReferenceType::Closing | ReferenceType::Reversal)
            );
        }
    }

    #[test]
    fn test_reversed_entries_still_affect_balance() {
        assert!(EntryStatus::Posted.affects_balance());
        assert!(EntryStatus::Reversed.affects_balance());
        assert!(!EntryStatus::Draft.affects_balance());
        assert!(!EntryStatus::Voided.affects_balance());
    }

    #[test]
    fn test_labels_parse_back() {
        assert_eq!("revenue".parse::<AccountType>().unwrap(), AccountType::Revenue);
        assert_eq!("CLOSING".parse::<ReferenceType>().unwrap(), ReferenceType::Closing);
        assert_eq!("Reversed".parse::<EntryStatus>().unwrap(), EntryStatus::Reversed);
        let err = "bogus".parse::<EntryStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown entry status: bogus");
    }
}
