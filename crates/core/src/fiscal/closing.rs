//! Closing plan: the lines that zero every temporary account.
//!
//! Each revenue and expense leaf with a non-zero balance gets one line on
//! the side opposite its balance; the net (`revenue - expense`) goes to
//! retained earnings, credited for a profit and debited for a loss.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::{AccountingPeriod, PeriodStatus};
use crate::ledger::{
    AccountIssue, AccountType, ChartOfAccounts, LedgerError, LineRequest, PostedEntry,
    bounded_add,
};

/// Computed closing lines and totals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClosingPlan {
    /// Lines in account-code order, retained earnings last.
    pub lines: Vec<LineRequest>,
    /// Σ revenue leaf balances.
    pub total_revenue: Decimal,
    /// Σ expense leaf balances.
    pub total_expense: Decimal,
}

impl ClosingPlan {
    /// `total_revenue - total_expense`.
    #[must_use]
    pub fn net_income(&self) -> Decimal {
        self.total_revenue - self.total_expense
    }

    /// True when every temporary balance is already zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Builds the closing plan from current leaf balances.
///
/// # Errors
///
/// `InvalidAccount` if the retained earnings account is missing, not
/// postable, or not an equity account. `AmountOverflow` if a total leaves
/// the storable range.
pub fn plan_closing(
    chart: &ChartOfAccounts,
    retained_earnings_code: &str,
) -> Result<ClosingPlan, LedgerError> {
    let retained = chart.ensure_postable(retained_earnings_code)?;
    if retained.account_type != AccountType::Equity {
        return Err(LedgerError::invalid_account(
            retained_earnings_code,
            AccountIssue::WrongType,
        ));
    }

    let mut plan = ClosingPlan::default();
    for account in chart
        .leaves()
        .filter(|a| a.account_type.is_temporary() && !a.balance.is_zero())
    {
        let total = match account.account_type {
            AccountType::Revenue => &mut plan.total_revenue,
            _ => &mut plan.total_expense,
        };
        *total = bounded_add(*total, account.balance, || {
            "totalling temporary balances".into()
        })?;
        // A positive balance sits on the normal side; zero it from the other.
        let closing_side = if account.balance > Decimal::ZERO {
            account.normal_balance().increasing_side().opposite()
        } else {
            account.normal_balance().increasing_side()
        };
        plan.lines.push(LineRequest {
            account_code: account.code.clone(),
            amount: account.balance.abs(),
            direction: closing_side,
            description: Some(format!("Close {} {}", account.code, account.name)),
        });
    }

    let net = plan.net_income();
    if !net.is_zero() && !plan.lines.is_empty() {
        let line = if net > Decimal::ZERO {
            LineRequest::credit(retained_earnings_code, net)
        } else {
            LineRequest::debit(retained_earnings_code, net.abs())
        };
        plan.lines
            .push(line.with_description("Net income to retained earnings"));
    }

    Ok(plan)
}

/// A computed but uncommitted close (the CLOSING state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingPreview {
    /// First day of the range.
    pub start_date: NaiveDate,
    /// Last day of the range.
    pub end_date: NaiveDate,
    /// Always [`PeriodStatus::Closing`].
    pub status: PeriodStatus,
    /// What a close would post.
    pub plan: ClosingPlan,
    /// Whether `close_period` would currently succeed.
    pub can_close: bool,
    /// Why it would not, if it would not.
    pub blocked_by: Option<String>,
}

/// Outcome of a committed close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingResult {
    /// The period, now CLOSED.
    pub period: AccountingPeriod,
    /// The CLOSING journal entry.
    pub closing_entry: PostedEntry,
}

impl ClosingResult {
    /// Net income closed to retained earnings.
    #[must_use]
    pub fn net_income(&self) -> Decimal {
        self.period.net_income
    }
}

/// Outcome of reopening a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenResult {
    /// The period, OPEN again.
    pub period: AccountingPeriod,
    /// The reversal of the closing journal.
    pub reversal: PostedEntry,
}

/// Most recent close and where the next one should start.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastClosingInfo {
    /// The closed period with the latest end date.
    pub period: Option<AccountingPeriod>,
    /// The day after its end date.
    pub next_start_date: Option<NaiveDate>,
}

impl LastClosingInfo {
    /// Picks the latest closed period.
    #[must_use]
    pub fn from_periods(periods: &[AccountingPeriod]) -> Self {
        let period = periods
            .iter()
            .filter(|p| p.is_closed)
            .max_by_key(|p| p.end_date)
            .cloned();
        let next_start_date = period.as_ref().and_then(|p| p.end_date.succ_opt());
        Self {
            period,
            next_start_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Account, Direction};
    use rust_decimal_macros::dec;

    fn chart(balances: &[(&str, AccountType, Decimal)]) -> ChartOfAccounts {
        let mut accounts = vec![Account::leaf("3201", "Laba Ditahan", AccountType::Equity)];
        for (code, t, b) in balances {
            let mut a = Account::leaf(*code, *code, *t);
            a.balance = *b;
            accounts.push(a);
        }
        ChartOfAccounts::new(accounts).unwrap()
    }

    fn side(plan: &ClosingPlan, code: &str) -> (Direction, Decimal) {
        let line = plan.lines.iter().find(|l| l.account_code == code).unwrap();
        (line.direction, line.amount)
    }

    #[test]
    fn test_profit_credits_retained_earnings() {
        let plan = plan_closing(
            &chart(&[
                ("4101", AccountType::Revenue, dec!(100000)),
                ("5201", AccountType::Expense, dec!(30000)),
            ]),
            "3201",
        )
        .unwrap();
        assert_eq!(side(&plan, "4101"), (Direction::Debit, dec!(100000)));
        assert_eq!(side(&plan, "5201"), (Direction::Credit, dec!(30000)));
        assert_eq!(side(&plan, "3201"), (Direction::Credit, dec!(70000)));
        assert_eq!(plan.net_income(), dec!(70000));
        assert_eq!(plan.lines.last().unwrap().account_code, "3201");
    }

    #[test]
    fn test_loss_debits_retained_earnings() {
        let plan = plan_closing(
            &chart(&[
                ("4101", AccountType::Revenue, dec!(10000)),
                ("5201", AccountType::Expense, dec!(25000)),
            ]),
            "3201",
        )
        .unwrap();
        assert_eq!(side(&plan, "3201"), (Direction::Debit, dec!(15000)));
        assert_eq!(plan.net_income(), dec!(-15000));
    }

    #[test]
    fn test_break_even_has_no_retained_earnings_line() {
        let plan = plan_closing(
            &chart(&[
                ("4101", AccountType::Revenue, dec!(5000)),
                ("5201", AccountType::Expense, dec!(5000)),
            ]),
            "3201",
        )
        .unwrap();
        assert_eq!(plan.lines.len(), 2);
        assert!(plan.lines.iter().all(|l| l.account_code != "3201"));
    }

    #[test]
    fn test_negative_temporary_balance_closes_on_normal_side() {
        let plan = plan_closing(
            &chart(&[("4101", AccountType::Revenue, dec!(-2000))]),
            "3201",
        )
        .unwrap();
        assert_eq!(side(&plan, "4101"), (Direction::Credit, dec!(2000)));
        assert_eq!(side(&plan, "3201"), (Direction::Debit, dec!(2000)));
    }

    #[test]
    fn test_zero_temporaries_give_empty_plan() {
        let plan = plan_closing(
            &chart(&[
                ("1101", AccountType::Asset, dec!(50000)),
                ("4101", AccountType::Revenue, dec!(0)),
            ]),
            "3201",
        )
        .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_retained_earnings_must_be_equity() {
        let err = plan_closing(
            &chart(&[("4101", AccountType::Revenue, dec!(1))]),
            "4101",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidAccount {
                issue: AccountIssue::WrongType,
                ..
            }
        ));
    }

    #[test]
    fn test_last_closing_info() {
        let now = chrono::Utc::now();
        let d = |m| NaiveDate::from_ymd_opt(2026, m, 1).unwrap();
        let mut jan = AccountingPeriod::open(d(1), d(2).pred_opt().unwrap(), "Jan", now).unwrap();
        let mut feb = AccountingPeriod::open(d(2), d(3).pred_opt().unwrap(), "Feb", now).unwrap();
        let mar = AccountingPeriod::open(d(3), d(4).pred_opt().unwrap(), "Mar", now).unwrap();
        jan.mark_closed(saldo_shared::types::JournalEntryId::new(), dec!(1), dec!(0), now);
        feb.mark_closed(saldo_shared::types::JournalEntryId::new(), dec!(1), dec!(0), now);

        let info = LastClosingInfo::from_periods(&[jan, feb.clone(), mar]);
        assert_eq!(info.period, Some(feb));
        assert_eq!(info.next_start_date, Some(d(3)));

        assert_eq!(LastClosingInfo::from_periods(&[]), LastClosingInfo::default());
    }
}
