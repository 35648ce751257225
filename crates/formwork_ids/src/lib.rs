//! Identifier wrappers shared by the Formwork crates.
//!
//! Every persisted entity (composite, form, record) is keyed by a
//! UUID v4 rendered in its canonical hyphenated form. Field ids are NOT
//! covered here: they are only unique among siblings and live in
//! `formwork_schema` as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing a UUID-backed identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Parse an identifier, normalizing it to the hyphenated lowercase form.
            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                let uuid = Uuid::parse_str(value.trim())
                    .map_err(|e| IdParseError::new(format!("Invalid {} '{}': {}", $label, value, e)))?;
                Ok(Self(uuid.hyphenated().to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_uuid_id!(
    /// Identity of a persisted composite data structure.
    CompositeId,
    "composite ID"
);
define_uuid_id!(
    /// Identity of a form declaration.
    FormId,
    "form ID"
);
define_uuid_id!(
    /// Identity of a record going through the review workflow.
    RecordId,
    "record ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_distinct() {
        assert_ne!(CompositeId::new(), CompositeId::new());
    }

    #[test]
    fn test_parse_normalizes_case() {
        let id = FormId::parse("7A1E5C2B-0D4F-4B8E-9C1A-2F3E4D5C6B7A").unwrap();
        assert_eq!(id.as_str(), "7a1e5c2b-0d4f-4b8e-9c1a-2f3e4d5c6b7a");
    }

    #[test]
    fn test_parse_rejects_sentinel() {
        let err = CompositeId::parse("special:myself").unwrap_err();
        assert!(err.to_string().contains("composite ID"));
    }

    #[test]
    fn test_serde_is_transparent_string() {
        let id = RecordId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<RecordId>("\"not-a-uuid\"").is_err());
    }
}
