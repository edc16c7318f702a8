//! Confidence domain errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfidenceError {
    #[error("Invalid confidence configuration: {0}")]
    InvalidConfig(String),
}

impl ConfidenceError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ConfidenceError::InvalidConfig(message.into())
    }
}
