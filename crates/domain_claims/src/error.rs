//! Decision domain errors

use thiserror::Error;

use core_kernel::{MoneyError, PortError};

/// Errors that can occur while deriving or persisting a claim decision
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Unknown decision engine '{name}' (registered: {available})")]
    UnknownEngine { name: String, available: String },

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Override targets unknown clause: {0}")]
    UnknownClause(String),

    #[error("Could not allocate dossier version for {claim_id}/{run_id} after {attempts} attempts")]
    VersionConflict {
        claim_id: String,
        run_id: String,
        attempts: u32,
    },

    #[error("Routing can only be recorded on an existing dossier")]
    NoDossier,

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Repository(#[from] PortError),
}

impl DecisionError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        DecisionError::InvalidConfig(message.into())
    }
}
