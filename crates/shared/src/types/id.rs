//! Typed IDs for ledger records.
//!
//! A `JournalEntryId` can never be handed to something expecting an
//! `AccountingPeriodId`, even though both are UUIDs underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a UUID-backed identifier newtype.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new time-ordered ID (UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(JournalEntryId, "Unique identifier for a journal entry header.");
typed_id!(
    AccountingPeriodId,
    "Unique identifier for a closed or closable accounting period."
);
typed_id!(
    BalanceCorrectionId,
    "Unique identifier for an audited balance repair record."
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_new_ids_are_time_ordered() {
        let first = JournalEntryId::new();
        let second = JournalEntryId::new();
        assert!(first < second);
        assert_eq!(first.into_inner().get_version_num(), 7);
    }

    #[test]
    fn test_uuid_conversions() {
        let uuid = Uuid::new_v4();
        let id = AccountingPeriodId::from(uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(AccountingPeriodId::from_uuid(uuid), id);
    }

    #[test]
    fn test_display_and_parse() {
        let id = BalanceCorrectionId::new();
        let parsed = BalanceCorrectionId::from_str(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(JournalEntryId::from_str("not-a-uuid").is_err());
    }
}
