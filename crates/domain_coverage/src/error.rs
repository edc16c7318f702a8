//! Coverage domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Errors raised while building or configuring the coverage matchers
///
/// Matching itself never fails: every stage degrades to REVIEW_NEEDED or
/// NOT_COVERED instead. These errors surface only at construction time or
/// when loading rule tables.
#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("Invalid pattern in {table}: {pattern} ({message})")]
    InvalidPattern {
        table: String,
        pattern: String,
        message: String,
    },

    #[error("Failed to parse rules: {0}")]
    RulesParse(String),

    #[error("Rules file not found: {0}")]
    RulesFileNotFound(String),

    #[error("Unknown item type: {0}")]
    UnknownItemType(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl CoverageError {
    pub fn invalid_pattern(table: &str, pattern: &str, err: regex::Error) -> Self {
        CoverageError::InvalidPattern {
            table: table.to_string(),
            pattern: pattern.to_string(),
            message: err.to_string(),
        }
    }
}
