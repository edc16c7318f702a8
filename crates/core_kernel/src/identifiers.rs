//! Strongly-typed identifiers for claim processing
//!
//! Claim identifiers arrive from upstream intake systems as opaque strings
//! and are used verbatim as directory names by the claim-run store. The
//! newtypes below keep the different identifier kinds apart and reject
//! values that could escape a directory (separators, `..`, control chars).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error raised when an identifier fails validation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} exceeds {max} characters")]
    TooLong { kind: &'static str, max: usize },

    #[error("{kind} contains forbidden character {found:?}")]
    ForbiddenCharacter { kind: &'static str, found: char },

    #[error("{kind} must not be a relative path component")]
    RelativeComponent { kind: &'static str },
}

const MAX_IDENTIFIER_LEN: usize = 128;

fn validate(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
    if value.trim().is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong { kind, max: MAX_IDENTIFIER_LEN });
    }
    if value == "." || value == ".." {
        return Err(IdentifierError::RelativeComponent { kind });
    }
    if let Some(found) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
    {
        return Err(IdentifierError::ForbiddenCharacter { kind, found });
    }
    Ok(())
}

macro_rules! define_id {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier
            pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                validate($kind, &value)?;
                Ok(Self(value))
            }

            /// Returns the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the identifier kind used in error messages
            pub fn kind() -> &'static str {
                $kind
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(ClaimId, "claim id");
define_id!(ClaimRunId, "claim run id");

impl ClaimRunId {
    /// Generates a time-ordered run identifier (`run-<uuid v7>`)
    ///
    /// Ids sort by creation time at millisecond resolution.
    pub fn generate() -> Self {
        Self(format!("run-{}", Uuid::now_v7()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_id_accepts_upstream_numbers() {
        let id = ClaimId::new("64168").unwrap();
        assert_eq!(id.as_str(), "64168");
        assert_eq!(id.to_string(), "64168");
    }

    #[test]
    fn test_claim_id_rejects_path_escape() {
        assert!(matches!(
            ClaimId::new("../etc"),
            Err(IdentifierError::ForbiddenCharacter { found: '/', .. })
        ));
        assert!(matches!(
            ClaimId::new(".."),
            Err(IdentifierError::RelativeComponent { .. })
        ));
        assert!(matches!(ClaimId::new("  "), Err(IdentifierError::Empty { .. })));
    }

    #[test]
    fn test_generated_run_ids_are_unique() {
        let first = ClaimRunId::generate();
        let second = ClaimRunId::generate();
        assert!(first.as_str().starts_with("run-"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let ok: ClaimId = serde_json::from_str("\"CLM-1\"").unwrap();
        assert_eq!(ok.as_str(), "CLM-1");
        let err = serde_json::from_str::<ClaimId>("\"a/b\"");
        assert!(err.is_err());
    }
}
