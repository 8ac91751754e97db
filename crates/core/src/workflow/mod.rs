//! Entry lifecycle: status transitions and reversals.
//!
//! - `lifecycle` - which status transitions are legal
//! - `reversal` - building the mirror entry for a posted one
//! - `service` - the `Ledger::reverse` operation

pub mod lifecycle;
pub mod reversal;
pub mod service;

#[cfg(test)]
mod lifecycle_props;
#[cfg(test)]
mod reversal_props;

pub use lifecycle::EntryLifecycle;
pub use reversal::reversal_entry;
