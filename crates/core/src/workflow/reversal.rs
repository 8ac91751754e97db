//! Reversing entries.
//!
//! A reversal is a new REVERSAL entry whose lines mirror the original with
//! debit and credit swapped. The original keeps its lines and only moves
//! to REVERSED; both stay in history and cancel each other out.

use chrono::{DateTime, NaiveDate, Utc};
use saldo_shared::types::JournalEntryId;

use crate::ledger::{EntryStatus, JournalEntry, JournalLine, ReferenceType};

/// Prefix of reversal header descriptions.
pub const REVERSAL_PREFIX: &str = "REVERSAL: ";

/// Prefix of reversal line descriptions.
pub const LINE_PREFIX: &str = "Reversal: ";

/// Builds the POSTED reversal of `original`, dated `entry_date`.
///
/// The header reads `REVERSAL: <reason>` (or the original description when
/// no reason is given), the reference is `REV-<original reference>` and the
/// source id is the original entry id, which makes a second reversal of the
/// same entry collide on the idempotency key.
#[must_use]
pub fn reversal_entry(
    original: &JournalEntry,
    entry_date: NaiveDate,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> JournalEntry {
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(&original.description);
    let reference = original
        .reference
        .clone()
        .unwrap_or_else(|| original.id.to_string());

    let lines: Vec<JournalLine> = original.lines.iter().map(reversed_line).collect();

    JournalEntry {
        id: JournalEntryId::new(),
        entry_date,
        description: format!("{REVERSAL_PREFIX}{reason}"),
        reference: Some(format!("REV-{reference}")),
        reference_type: ReferenceType::Reversal,
        source_id: Some(original.id.to_string()),
        status: EntryStatus::Posted,
        total_debit: original.total_credit,
        total_credit: original.total_debit,
        reverses_entry_id: Some(original.id),
        reversed_by_entry_id: None,
        posted_at: Some(now),
        created_at: now,
        lines,
    }
}

/// Swaps the sides of one line and tags its description.
fn reversed_line(line: &JournalLine) -> JournalLine {
    let mut swapped = line.swapped();
    swapped.description = Some(format!(
        "{LINE_PREFIX}{}",
        line.description.as_deref().unwrap_or_default()
    ));
    swapped
}
