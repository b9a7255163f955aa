//! Shared identifier wrappers for the Fabric portal.
//!
//! Every persisted entity is keyed by a UUID. The wrappers keep the string
//! form (that is what the store and the job parameters carry) but only ever
//! hold values that parsed as a UUID.

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
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Parse and normalise (lowercase, hyphenated) a UUID string.
            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                let uuid = Uuid::parse_str(value.trim())
                    .map_err(|e| IdParseError::new(format!("Invalid {}: {}", $label, e)))?;
                Ok(Self(uuid.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, for compact listings.
            pub fn short(&self) -> &str {
                &self.0[..8]
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
    /// Identifies one pipeline run. Generated by the caller before submission
    /// and passed to the external job as its correlation parameter.
    RunId,
    "run ID"
);
define_uuid_id!(
    /// Identifies one entry in a run's audit trail.
    EventId,
    "event ID"
);
define_uuid_id!(
    /// Identifies one restore audit record.
    RestoreId,
    "restore ID"
);
define_uuid_id!(
    /// Identifies one registered run artifact.
    ArtifactId,
    "artifact ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_case() {
        let id = RunId::parse("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
        assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
        assert_eq!(id.short(), "6f9619ff");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = RunId::parse("orders.csv").unwrap_err();
        assert!(err.to_string().contains("Invalid run ID"));
    }

    #[test]
    fn test_new_ids_are_distinct() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn test_serde_is_transparent_string() {
        let id = RestoreId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: RestoreId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<RestoreId>("\"nope\"").is_err());
    }
}
