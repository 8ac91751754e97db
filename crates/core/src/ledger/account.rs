//! Chart of accounts registry.
//!
//! Leaf accounts hold balances; header accounts only group them. A header's
//! balance is always derived on read as the sum of its leaf descendants and
//! is never stored or written.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{AccountIssue, LedgerError};
use super::types::{AccountType, NormalBalance};

/// Deepest allowed nesting, counting the root as level 1.
pub const MAX_HIERARCHY_DEPTH: usize = 5;

/// An entry in the chart of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique hierarchical code, e.g. `"1101"`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Classification.
    pub account_type: AccountType,
    /// Parent header, if any.
    pub parent_code: Option<String>,
    /// Header accounts never receive postings.
    pub is_header: bool,
    /// Inactive accounts keep their history but accept no postings.
    pub is_active: bool,
    /// Stored balance for leaves, always zero for headers.
    pub balance: Decimal,
}

impl Account {
    /// Creates an active leaf account with a zero balance.
    pub fn leaf(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            account_type,
            parent_code: None,
            is_header: false,
            is_active: true,
            balance: Decimal::ZERO,
        }
    }

    /// Creates an active header account.
    pub fn header(
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
    ) -> Self {
        Self {
            is_header: true,
            ..Self::leaf(code, name, account_type)
        }
    }

    /// Sets the parent header.
    #[must_use]
    pub fn under(mut self, parent_code: impl Into<String>) -> Self {
        self.parent_code = Some(parent_code.into());
        self
    }

    /// Marks the account inactive.
    #[must_use]
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Returns the normal-balance side for this account's type.
    #[must_use]
    pub const fn normal_balance(&self) -> NormalBalance {
        self.account_type.normal_balance()
    }

    /// Why this account cannot take a posting, if it cannot.
    #[must_use]
    pub const fn posting_issue(&self) -> Option<AccountIssue> {
        if self.is_header {
            Some(AccountIssue::Header)
        } else if !self.is_active {
            Some(AccountIssue::Inactive)
        } else {
            None
        }
    }

    /// True for active leaf accounts.
    #[must_use]
    pub const fn is_postable(&self) -> bool {
        self.posting_issue().is_none()
    }
}

/// A validated snapshot of the chart of accounts.
#[derive(Debug, Clone, Default)]
pub struct ChartOfAccounts {
    accounts: BTreeMap<String, Account>,
    children: BTreeMap<String, Vec<String>>,
}

impl ChartOfAccounts {
    /// Builds a chart, rejecting structural problems:
    /// duplicate codes, missing or non-header parents, children whose type
    /// differs from their parent's, cycles, nesting deeper than
    /// [`MAX_HIERARCHY_DEPTH`], and headers carrying a stored balance.
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Result<Self, LedgerError> {
        let mut by_code = BTreeMap::new();
        for account in accounts {
            if by_code.contains_key(&account.code) {
                return Err(LedgerError::InvalidHierarchy(format!(
                    "duplicate account code {}",
                    account.code
                )));
            }
            by_code.insert(account.code.clone(), account);
        }

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for account in by_code.values() {
            if account.is_header && !account.balance.is_zero() {
                return Err(LedgerError::InvalidHierarchy(format!(
                    "header account {} carries a stored balance",
                    account.code
                )));
            }
            let Some(parent_code) = &account.parent_code else {
                continue;
            };
            let parent = by_code.get(parent_code).ok_or_else(|| {
                LedgerError::InvalidHierarchy(format!(
                    "account {} references missing parent {parent_code}",
                    account.code
                ))
            })?;
            if !parent.is_header {
                return Err(LedgerError::InvalidHierarchy(format!(
                    "parent {parent_code} of account {} is not a header",
                    account.code
                )));
            }
            if parent.account_type != account.account_type {
                return Err(LedgerError::InvalidHierarchy(format!(
                    "account {} is {} but its parent {parent_code} is {}",
                    account.code, account.account_type, parent.account_type
                )));
            }
            children
                .entry(parent_code.clone())
                .or_default()
                .push(account.code.clone());
        }

        for code in by_code.keys() {
            let mut seen = BTreeSet::new();
            let mut current = Some(code);
            while let Some(c) = current {
                if !seen.insert(c) {
                    return Err(LedgerError::InvalidHierarchy(format!(
                        "circular parent chain through account {c}"
                    )));
                }
                current = by_code.get(c).and_then(|a| a.parent_code.as_ref());
            }
            if seen.len() > MAX_HIERARCHY_DEPTH {
                return Err(LedgerError::InvalidHierarchy(format!(
                    "account {code} is nested {} levels deep (max {MAX_HIERARCHY_DEPTH})",
                    seen.len()
                )));
            }
        }

        Ok(Self {
            accounts: by_code,
            children,
        })
    }

    /// Looks up an account by code.
    pub fn resolve(&self, code: &str) -> Result<&Account, LedgerError> {
        self.accounts
            .get(code)
            .ok_or_else(|| LedgerError::invalid_account(code, AccountIssue::NotFound))
    }

    /// Looks up an account by code, if present.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Account> {
        self.accounts.get(code)
    }

    /// False for missing, header, or inactive accounts.
    #[must_use]
    pub fn is_postable(&self, code: &str) -> bool {
        self.accounts.get(code).is_some_and(Account::is_postable)
    }

    /// Resolves `code` and checks it can take a posting.
    pub fn ensure_postable(&self, code: &str) -> Result<&Account, LedgerError> {
        let account = self.resolve(code)?;
        match account.posting_issue() {
            Some(issue) => Err(LedgerError::invalid_account(code, issue)),
            None => Ok(account),
        }
    }

    /// Direct children of `code`, in code order.
    pub fn children(&self, code: &str) -> impl Iterator<Item = &Account> {
        self.children
            .get(code)
            .into_iter()
            .flatten()
            .filter_map(|c| self.accounts.get(c))
    }

    /// All leaf accounts below `code`. A leaf's only descendant is itself.
    #[must_use]
    pub fn leaf_descendants(&self, code: &str) -> Vec<&Account> {
        let mut leaves = Vec::new();
        let mut stack = vec![code];
        while let Some(c) = stack.pop() {
            let Some(account) = self.accounts.get(c) else {
                continue;
            };
            if account.is_header {
                if let Some(kids) = self.children.get(c) {
                    stack.extend(kids.iter().rev().map(String::as_str));
                }
            } else {
                leaves.push(account);
            }
        }
        leaves
    }

    /// Balance of `code`: stored balance for a leaf, sum of leaf
    /// descendants for a header.
    pub fn rollup_balance(&self, code: &str) -> Result<Decimal, LedgerError> {
        let account = self.resolve(code)?;
        if !account.is_header {
            return Ok(account.balance);
        }
        Ok(self
            .leaf_descendants(code)
            .into_iter()
            .map(|a| a.balance)
            .sum())
    }

    /// Headers and leaves of one type, in code order.
    pub fn accounts_of_type(&self, account_type: AccountType) -> impl Iterator<Item = &Account> {
        self.accounts
            .values()
            .filter(move |a| a.account_type == account_type)
    }

    /// Leaf accounts of one type.
    pub fn leaves_of_type(&self, account_type: AccountType) -> impl Iterator<Item = &Account> {
        self.leaves().filter(move |a| a.account_type == account_type)
    }

    /// All leaf accounts, in code order.
    pub fn leaves(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values().filter(|a| !a.is_header)
    }

    /// All accounts, in code order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// True if the chart is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_chart() -> ChartOfAccounts {
        let mut kas = Account::leaf("1101", "Kas", AccountType::Asset).under("1100");
        kas.balance = dec!(150000);
        let mut bank = Account::leaf("1102", "Bank", AccountType::Asset).under("1100");
        bank.balance = dec!(50000.50);
        let mut piutang = Account::leaf("1201", "Piutang Usaha", AccountType::Asset).under("1000");
        piutang.balance = dec!(25000);
        ChartOfAccounts::new([
            Account::header("1000", "Aset", AccountType::Asset),
            Account::header("1100", "Aset Lancar", AccountType::Asset).under("1000"),
            kas,
            bank,
            piutang,
            Account::leaf("1199", "Kas Kecil Lama", AccountType::Asset)
                .under("1100")
                .deactivated(),
            Account::leaf("4101", "Pendapatan Penjualan", AccountType::Revenue),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_and_postability() {
        let chart = sample_chart();
        assert_eq!(chart.resolve("1101").unwrap().name, "Kas");
        assert!(chart.is_postable("1101"));
        assert!(!chart.is_postable("1100"));
        assert!(!chart.is_postable("1199"));
        assert!(!chart.is_postable("9999"));
    }

    #[test]
    fn test_ensure_postable_reports_reason() {
        let chart = sample_chart();
        for (code, issue) in [
            ("1100", AccountIssue::Header),
            ("1199", AccountIssue::Inactive),
            ("9999", AccountIssue::NotFound),
        ] {
            match chart.ensure_postable(code) {
                Err(LedgerError::InvalidAccount { code: c, issue: i }) => {
                    assert_eq!(c, code);
                    assert_eq!(i, issue);
                }
                other => panic!("expected InvalidAccount for {code}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rollup_sums_leaf_descendants() {
        let chart = sample_chart();
        assert_eq!(chart.rollup_balance("1100").unwrap(), dec!(200000.50));
        assert_eq!(chart.rollup_balance("1000").unwrap(), dec!(225000.50));
        assert_eq!(chart.rollup_balance("1101").unwrap(), dec!(150000));
    }

    #[test]
    fn test_accounts_of_type_includes_headers() {
        let chart = sample_chart();
        assert_eq!(chart.accounts_of_type(AccountType::Asset).count(), 6);
        assert_eq!(chart.leaves_of_type(AccountType::Asset).count(), 4);
        let revenue: Vec<_> = chart
            .accounts_of_type(AccountType::Revenue)
            .map(|a| a.code.as_str())
            .collect();
        assert_eq!(revenue, ["4101"]);
    }

    #[test]
    fn test_children_in_code_order() {
        let chart = sample_chart();
        let codes: Vec<_> = chart.children("1100").map(|a| a.code.as_str()).collect();
        assert_eq!(codes, ["1101", "1102", "1199"]);
        assert_eq!(chart.children("1101").count(), 0);
    }

    #[test]
    fn test_rejects_missing_parent() {
        let err = ChartOfAccounts::new([Account::leaf("1101", "Kas", AccountType::Asset).under("1100")])
            .unwrap_err();
        assert!(err.to_string().contains("missing parent 1100"));
    }

    #[test]
    fn test_rejects_leaf_parent() {
        let err = ChartOfAccounts::new([
            Account::leaf("1100", "Kas", AccountType::Asset),
            Account::leaf("1101", "Kas Kecil", AccountType::Asset).under("1100"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("is not a header"));
    }

    #[test]
    fn test_rejects_type_mismatch() {
        let err = ChartOfAccounts::new([
            Account::header("1000", "Aset", AccountType::Asset),
            Account::leaf("2101", "Utang Usaha", AccountType::Liability).under("1000"),
        ])
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_rejects_cycle() {
        let err = ChartOfAccounts::new([
            Account::header("1000", "A", AccountType::Asset).under("1100"),
            Account::header("1100", "B", AccountType::Asset).under("1000"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_rejects_excess_depth() {
        let mut accounts = vec![Account::header("L1", "L1", AccountType::Expense)];
        for level in 2..=6 {
            accounts.push(
                Account::header(format!("L{level}"), "x", AccountType::Expense)
                    .under(format!("L{}", level - 1)),
            );
        }
        let err = ChartOfAccounts::new(accounts).unwrap_err();
        assert!(err.to_string().contains("levels deep"));
    }

    #[test]
    fn test_rejects_header_with_balance() {
        let mut header = Account::header("1000", "Aset", AccountType::Asset);
        header.balance = dec!(1);
        assert!(ChartOfAccounts::new([header]).is_err());
    }
}
