//! Balance projection.
//!
//! The canonical definition of an account balance is a pure function of the
//! posted journal: for every line whose entry is POSTED or REVERSED,
//! debit-normal accounts accumulate `debit - credit` and credit-normal
//! accounts `credit - debit`. The incremental balances kept by the posting
//! engine are an optimisation of this function and must always agree with
//! it. Divergence is reported, and repaired only by re-deriving from the
//! journal with an audit record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use saldo_shared::types::BalanceCorrectionId;
use serde::{Deserialize, Serialize};

use super::account::ChartOfAccounts;
use super::entry::JournalLine;
use super::error::{AccountIssue, LedgerError};
use super::types::{AccountType, NormalBalance};
use super::validation::bounded_add;

/// Recomputes every leaf balance from scratch.
///
/// `lines` must contain only lines of balance-affecting entries. Leaves with
/// no lines are present with a zero balance.
///
/// # Errors
///
/// `InvalidAccount` if a line references an unknown or header account,
/// which means the stored journal itself is corrupt. `AmountOverflow` if a
/// derived balance leaves the storable range.
pub fn derive_balances<'a>(
    chart: &ChartOfAccounts,
    lines: impl IntoIterator<Item = &'a JournalLine>,
) -> Result<BTreeMap<String, Decimal>, LedgerError> {
    let mut balances: BTreeMap<String, Decimal> = chart
        .leaves()
        .map(|a| (a.code.clone(), Decimal::ZERO))
        .collect();

    for line in lines {
        let account = chart.resolve(&line.account_code)?;
        if account.is_header {
            return Err(LedgerError::invalid_account(
                &line.account_code,
                AccountIssue::Header,
            ));
        }
        let delta = account
            .normal_balance()
            .balance_change(line.debit_amount, line.credit_amount);
        let slot = balances.entry(line.account_code.clone()).or_default();
        *slot = bounded_add(*slot, delta, || {
            format!("deriving the balance of {}", line.account_code)
        })?;
    }

    Ok(balances)
}

/// One account whose stored balance differs from the derived one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    /// Account code.
    pub account_code: String,
    /// Balance held by the incremental projection.
    pub recorded: Decimal,
    /// Balance derived from the journal.
    pub derived: Decimal,
}

impl BalanceMismatch {
    /// `derived - recorded`: what a repair would add.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.derived - self.recorded
    }
}

/// Outcome of comparing stored balances with derived ones.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Number of leaf accounts compared.
    pub checked_accounts: usize,
    /// Accounts that disagree, in code order.
    pub mismatches: Vec<BalanceMismatch>,
}

impl ReconciliationReport {
    /// True when every stored balance equals its derived balance.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compares each leaf's stored balance with `derived` (zero tolerance).
#[must_use]
pub fn reconcile(chart: &ChartOfAccounts, derived: &BTreeMap<String, Decimal>) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();
    for account in chart.leaves() {
        report.checked_accounts += 1;
        let expected = derived.get(&account.code).copied().unwrap_or_default();
        if account.balance != expected {
            report.mismatches.push(BalanceMismatch {
                account_code: account.code.clone(),
                recorded: account.balance,
                derived: expected,
            });
        }
    }
    report
}

/// Audit record of one repaired balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCorrection {
    /// Record id.
    pub id: BalanceCorrectionId,
    /// Repaired account.
    pub account_code: String,
    /// Stored balance before the repair.
    pub recorded_balance: Decimal,
    /// Derived balance written by the repair.
    pub derived_balance: Decimal,
    /// `derived - recorded`.
    pub difference: Decimal,
    /// Operator-supplied cause.
    pub reason: String,
    /// When the repair was committed.
    pub corrected_at: DateTime<Utc>,
}

impl BalanceCorrection {
    /// Builds the audit record for a mismatch.
    #[must_use]
    pub fn for_mismatch(mismatch: &BalanceMismatch, reason: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: BalanceCorrectionId::new(),
            account_code: mismatch.account_code.clone(),
            recorded_balance: mismatch.recorded,
            derived_balance: mismatch.derived,
            difference: mismatch.difference(),
            reason: reason.to_string(),
            corrected_at: now,
        }
    }
}

/// Per-type totals of leaf balances.
///
/// Open-period form of the accounting equation:
/// `assets == liabilities + equity + revenue - expenses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountingEquation {
    /// Σ asset balances.
    pub assets: Decimal,
    /// Σ liability balances.
    pub liabilities: Decimal,
    /// Σ equity balances.
    pub equity: Decimal,
    /// Σ revenue balances.
    pub revenue: Decimal,
    /// Σ expense balances.
    pub expenses: Decimal,
}

impl AccountingEquation {
    /// Totals the chart's leaf balances by type.
    #[must_use]
    pub fn from_chart(chart: &ChartOfAccounts) -> Self {
        chart.leaves().fold(Self::default(), |mut eq, account| {
            let slot = match account.account_type {
                AccountType::Asset => &mut eq.assets,
                AccountType::Liability => &mut eq.liabilities,
                AccountType::Equity => &mut eq.equity,
                AccountType::Revenue => &mut eq.revenue,
                AccountType::Expense => &mut eq.expenses,
            };
            *slot += account.balance;
            eq
        })
    }

    /// `assets - (liabilities + equity + revenue - expenses)`.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.assets - (self.liabilities + self.equity + self.revenue - self.expenses)
    }

    /// Exact equality.
    #[must_use]
    pub fn holds(&self) -> bool {
        self.difference().is_zero()
    }
}

/// A trial balance row: one leaf with a non-zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    /// Account code.
    pub account_code: String,
    /// Account name.
    pub name: String,
    /// Account type.
    pub account_type: AccountType,
    /// Debit column.
    pub debit: Decimal,
    /// Credit column.
    pub credit: Decimal,
}

/// Leaf balances laid out in debit and credit columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrialBalance {
    /// Rows in code order.
    pub rows: Vec<TrialBalanceRow>,
    /// Σ debit column.
    pub total_debit: Decimal,
    /// Σ credit column.
    pub total_credit: Decimal,
}

impl TrialBalance {
    /// Lays out the chart. A balance below zero lands in the column
    /// opposite its normal side.
    #[must_use]
    pub fn from_chart(chart: &ChartOfAccounts) -> Self {
        let mut tb = Self::default();
        for account in chart.leaves().filter(|a| !a.balance.is_zero()) {
            let on_normal_side = account.balance > Decimal::ZERO;
            let amount = account.balance.abs();
            let debit_side = match account.normal_balance() {
                NormalBalance::Debit => on_normal_side,
                NormalBalance::Credit => !on_normal_side,
            };
            let (debit, credit) = if debit_side {
                (amount, Decimal::ZERO)
            } else {
                (Decimal::ZERO, amount)
            };
            tb.total_debit += debit;
            tb.total_credit += credit;
            tb.rows.push(TrialBalanceRow {
                account_code: account.code.clone(),
                name: account.name.clone(),
                account_type: account.account_type,
                debit,
                credit,
            });
        }
        tb
    }

    /// Whether the columns agree.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::Account;
    use rust_decimal_macros::dec;

    fn chart_with(balances: &[(&str, AccountType, Decimal)]) -> ChartOfAccounts {
        ChartOfAccounts::new(balances.iter().map(|(code, t, b)| {
            let mut a = Account::leaf(*code, *code, *t);
            a.balance = *b;
            a
        }))
        .unwrap()
    }

    fn line(code: &str, debit: Decimal, credit: Decimal) -> JournalLine {
        JournalLine {
            line_number: 1,
            account_code: code.to_string(),
            debit_amount: debit,
            credit_amount: credit,
            description: None,
        }
    }

    #[test]
    fn test_derive_applies_normal_balance_rules() {
        let chart = chart_with(&[
            ("1101", AccountType::Asset, dec!(0)),
            ("4101", AccountType::Revenue, dec!(0)),
            ("5201", AccountType::Expense, dec!(0)),
        ]);
        let lines = [
            line("1101", dec!(100000), dec!(0)),
            line("4101", dec!(0), dec!(100000)),
            line("5201", dec!(20000), dec!(0)),
            line("1101", dec!(0), dec!(20000)),
        ];
        let derived = derive_balances(&chart, &lines).unwrap();
        assert_eq!(derived["1101"], dec!(80000));
        assert_eq!(derived["4101"], dec!(100000));
        assert_eq!(derived["5201"], dec!(20000));
    }

    #[test]
    fn test_derive_rejects_unknown_account() {
        let chart = chart_with(&[("1101", AccountType::Asset, dec!(0))]);
        let lines = [line("9999", dec!(1), dec!(0))];
        assert!(matches!(
            derive_balances(&chart, &lines),
            Err(LedgerError::InvalidAccount {
                issue: AccountIssue::NotFound,
                ..
            })
        ));
    }

    #[test]
    fn test_derive_reports_overflow_instead_of_panicking() {
        let chart = chart_with(&[("1101", AccountType::Asset, dec!(0))]);
        let huge = dec!(40000000000000000000000000000);
        let lines = [line("1101", huge, dec!(0)), line("1101", huge, dec!(0))];
        assert!(matches!(
            derive_balances(&chart, &lines),
            Err(LedgerError::AmountOverflow(_))
        ));
    }

    #[test]
    fn test_reconcile_flags_drift() {
        let chart = chart_with(&[
            ("1101", AccountType::Asset, dec!(100000)),
            ("4101", AccountType::Revenue, dec!(90000)),
        ]);
        let derived = BTreeMap::from([
            ("1101".to_string(), dec!(100000)),
            ("4101".to_string(), dec!(100000)),
        ]);
        let report = reconcile(&chart, &derived);
        assert_eq!(report.checked_accounts, 2);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].account_code, "4101");
        assert_eq!(report.mismatches[0].difference(), dec!(10000));
    }

    #[test]
    fn test_equation_open_period_form() {
        let chart = chart_with(&[
            ("1101", AccountType::Asset, dec!(130000)),
            ("2101", AccountType::Liability, dec!(20000)),
            ("3101", AccountType::Equity, dec!(50000)),
            ("4101", AccountType::Revenue, dec!(100000)),
            ("5201", AccountType::Expense, dec!(40000)),
        ]);
        let eq = AccountingEquation::from_chart(&chart);
        assert!(eq.holds());

        let broken = chart_with(&[("1101", AccountType::Asset, dec!(1))]);
        assert_eq!(AccountingEquation::from_chart(&broken).difference(), dec!(1));
    }

    #[test]
    fn test_trial_balance_columns() {
        let chart = chart_with(&[
            ("1101", AccountType::Asset, dec!(80000)),
            ("1102", AccountType::Asset, dec!(-5000)),
            ("4101", AccountType::Revenue, dec!(100000)),
            ("5201", AccountType::Expense, dec!(15000)),
            ("5202", AccountType::Expense, dec!(0)),
        ]);
        let tb = TrialBalance::from_chart(&chart);
        assert_eq!(tb.rows.len(), 4);
        assert_eq!(tb.rows[1].credit, dec!(5000));
        assert_eq!(tb.total_debit, dec!(95000));
        assert_eq!(tb.total_credit, dec!(105000));
        assert!(!tb.is_balanced());
    }
}
