//! Line-level and entry-level validation.
//!
//! Shared by the entry builder and the posting engine, which re-validates
//! every entry it commits. Checks run in this order:
//!
//! 1. At least one line
//! 2. Each line: non-negative, exactly one side non-zero, minor-unit
//!    precision, at most [`MAX_AMOUNT`]
//! 3. At least one debit line and one credit line
//! 4. Each total at most [`MAX_AMOUNT`]
//! 5. Total debit equals total credit, exactly

use rust_decimal::Decimal;
use saldo_shared::types::Currency;
use serde::{Deserialize, Serialize};

use super::entry::JournalLine;
use super::error::{LedgerError, LineIssue};

/// Largest amount, total or balance the ledger stores: `NUMERIC(20, 2)`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x630F_FFFF, 0x6BC7_5E2D, 5, false, 2);

/// `a + b`, rejected when the result leaves `±MAX_AMOUNT`.
///
/// # Errors
///
/// `AmountOverflow` naming `context`.
pub fn bounded_add(
    a: Decimal,
    b: Decimal,
    context: impl FnOnce() -> String,
) -> Result<Decimal, LedgerError> {
    a.checked_add(b)
        .filter(|sum| sum.abs() <= MAX_AMOUNT)
        .ok_or_else(|| LedgerError::AmountOverflow(context()))
}

/// Debit and credit totals of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryTotals {
    /// Sum of debit amounts.
    pub debit: Decimal,
    /// Sum of credit amounts.
    pub credit: Decimal,
}

impl EntryTotals {
    /// Sums the lines.
    ///
    /// # Errors
    ///
    /// `AmountOverflow` when either side totals above [`MAX_AMOUNT`].
    pub fn of(lines: &[JournalLine]) -> Result<Self, LedgerError> {
        lines.iter().try_fold(Self::default(), |acc, line| {
            Ok(Self {
                debit: bounded_add(acc.debit, line.debit_amount, || "totalling debits".into())?,
                credit: bounded_add(acc.credit, line.credit_amount, || "totalling credits".into())?,
            })
        })
    }

    /// `debit - credit`.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.debit - self.credit
    }

    /// Exact equality of both sides.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.debit == self.credit
    }
}

/// Validates a single line.
pub fn validate_line(line: &JournalLine, currency: Currency) -> Result<(), LedgerError> {
    let issue = if line.debit_amount < Decimal::ZERO || line.credit_amount < Decimal::ZERO {
        Some(LineIssue::NegativeAmount)
    } else if line.debit_amount.is_zero() && line.credit_amount.is_zero() {
        Some(LineIssue::ZeroAmount)
    } else if !line.debit_amount.is_zero() && !line.credit_amount.is_zero() {
        Some(LineIssue::MixedSides)
    } else if line.debit_amount.max(line.credit_amount) > MAX_AMOUNT {
        Some(LineIssue::ExceedsMaximum)
    } else if !currency.fits_minor_units(line.debit_amount.max(line.credit_amount)) {
        Some(LineIssue::ExcessPrecision)
    } else {
        None
    };

    match issue {
        Some(issue) => Err(LedgerError::InvalidLine {
            line_number: line.line_number,
            issue,
        }),
        None => Ok(()),
    }
}

/// Validates a full set of lines and returns their totals.
pub fn validate_lines(lines: &[JournalLine], currency: Currency) -> Result<EntryTotals, LedgerError> {
    if lines.is_empty() {
        return Err(LedgerError::EmptyEntry);
    }

    for line in lines {
        validate_line(line, currency)?;
    }

    let has_debit = lines.iter().any(|l| !l.debit_amount.is_zero());
    let has_credit = lines.iter().any(|l| !l.credit_amount.is_zero());
    if !has_debit || !has_credit {
        return Err(LedgerError::SingleSidedEntry);
    }

    let totals = EntryTotals::of(lines)?;
    if !totals.is_balanced() {
        return Err(LedgerError::UnbalancedEntry {
            debit: totals.debit,
            credit: totals.credit,
            difference: totals.difference(),
        });
    }

    Ok(totals)
}
