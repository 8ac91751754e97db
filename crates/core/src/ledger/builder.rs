//! Journal entry builder.
//!
//! Turns a business event (event type plus account/amount/direction tuples)
//! into an unsaved [`DraftEntry`] that already balances. Lines keep the
//! order they were added in; lines on the same account are never merged.
//! Nothing here touches storage.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use saldo_shared::types::{Currency, JournalEntryId};

use super::entry::{DraftEntry, JournalLine, LineRequest};
use super::error::LedgerError;
use super::types::ReferenceType;
use super::validation::validate_lines;

/// Fluent builder for a [`DraftEntry`].
///
/// ```
/// use chrono::NaiveDate;
/// use rust_decimal::Decimal;
/// use saldo_core::ledger::{EntryBuilder, ReferenceType};
///
/// let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
/// let draft = EntryBuilder::new(ReferenceType::Sale, date)
///     .reference("INV-0001")
///     .source_id("sale-42")
///     .debit("1101", Decimal::new(100_000, 0))
///     .credit("4101", Decimal::new(100_000, 0))
///     .build()
///     .unwrap();
/// assert_eq!(draft.lines.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    id: Option<JournalEntryId>,
    reference_type: ReferenceType,
    entry_date: NaiveDate,
    description: Option<String>,
    reference: Option<String>,
    source_id: Option<String>,
    currency: Currency,
    lines: Vec<LineRequest>,
}

impl EntryBuilder {
    /// Starts an entry for `reference_type` dated `entry_date`.
    #[must_use]
    pub fn new(reference_type: ReferenceType, entry_date: NaiveDate) -> Self {
        Self {
            id: None,
            reference_type,
            entry_date,
            description: None,
            reference: None,
            source_id: None,
            currency: Currency::default(),
            lines: Vec::new(),
        }
    }

    /// Uses a caller-chosen entry id instead of a fresh one.
    #[must_use]
    pub fn id(mut self, id: JournalEntryId) -> Self {
        self.id = Some(id);
        self
    }

    /// Header description. Defaults to the event type label.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Business document code.
    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Business event id, the idempotency key together with the event type.
    #[must_use]
    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Currency whose minor unit bounds amount precision.
    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Appends a debit line.
    #[must_use]
    pub fn debit(self, account_code: impl Into<String>, amount: Decimal) -> Self {
        self.line(LineRequest::debit(account_code, amount))
    }

    /// Appends a credit line.
    #[must_use]
    pub fn credit(self, account_code: impl Into<String>, amount: Decimal) -> Self {
        self.line(LineRequest::credit(account_code, amount))
    }

    /// Appends a line.
    #[must_use]
    pub fn line(mut self, line: LineRequest) -> Self {
        self.lines.push(line);
        self
    }

    /// Appends several lines in order.
    #[must_use]
    pub fn lines(mut self, lines: impl IntoIterator<Item = LineRequest>) -> Self {
        self.lines.extend(lines);
        self
    }

    /// Numbers the lines and checks they balance exactly.
    ///
    /// # Errors
    ///
    /// `EmptyEntry`, `InvalidLine`, `SingleSidedEntry` or `UnbalancedEntry`
    /// (with the exact difference). Differences are never rounded away.
    pub fn build(self) -> Result<DraftEntry, LedgerError> {
        let lines: Vec<JournalLine> = (1..)
            .zip(self.lines)
            .map(|(n, request)| JournalLine::from_request(n, request))
            .collect();

        let totals = validate_lines(&lines, self.currency)?;

        Ok(DraftEntry {
            id: self.id.unwrap_or_default(),
            entry_date: self.entry_date,
            description: self
                .description
                .unwrap_or_else(|| self.reference_type.to_string()),
            reference: self.reference,
            reference_type: self.reference_type,
            source_id: self.source_id,
            lines,
            totals,
        })
    }
}

/// Builds a draft from an event type and its lines.
pub fn build_entry(
    reference_type: ReferenceType,
    entry_date: NaiveDate,
    lines: impl IntoIterator<Item = LineRequest>,
) -> Result<DraftEntry, LedgerError> {
    EntryBuilder::new(reference_type, entry_date).lines(lines).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::Direction;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn test_lines_keep_insertion_order_and_are_not_merged() {
        let draft = EntryBuilder::new(ReferenceType::Purchase, date())
            .debit("1301", dec!(60000))
            .debit("1301", dec!(40000))
            .debit("1240", dec!(11000))
            .credit("2101", dec!(111000))
            .build()
            .unwrap();

        let numbered: Vec<_> = draft
            .lines
            .iter()
            .map(|l| (l.line_number, l.account_code.as_str()))
            .collect();
        assert_eq!(numbered, [(1, "1301"), (2, "1301"), (3, "1240"), (4, "2101")]);
        assert_eq!(draft.totals.debit, dec!(111000));
        assert_eq!(draft.lines[3].direction(), Some(Direction::Credit));
    }

    #[test]
    fn test_unbalanced_is_rejected_with_difference() {
        let err = EntryBuilder::new(ReferenceType::Sale, date())
            .debit("1101", dec!(100000))
            .credit("4101", dec!(99000))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::UnbalancedEntry { difference, .. } if difference == dec!(1000)
        ));
    }

    #[test]
    fn test_defaults() {
        let draft = build_entry(
            ReferenceType::Adjustment,
            date(),
            [
                LineRequest::debit("5201", dec!(5000)),
                LineRequest::credit("1101", dec!(5000)).with_description("petty cash"),
            ],
        )
        .unwrap();
        assert_eq!(draft.description, "ADJUSTMENT");
        assert!(draft.source_id.is_none());
        assert_eq!(draft.lines[1].description.as_deref(), Some("petty cash"));
    }

    #[test]
    fn test_explicit_id_is_kept() {
        let id = JournalEntryId::new();
        let draft = EntryBuilder::new(ReferenceType::Sale, date())
            .id(id)
            .debit("1101", dec!(1))
            .credit("4101", dec!(1))
            .build()
            .unwrap();
        assert_eq!(draft.id, id);
    }

    #[test]
    fn test_currency_precision_applies() {
        let result = EntryBuilder::new(ReferenceType::Sale, date())
            .currency(Currency::Jpy)
            .debit("1101", dec!(10.5))
            .credit("4101", dec!(10.5))
            .build();
        assert!(matches!(result, Err(LedgerError::InvalidLine { .. })));
    }
}
