//! Core Kernel - Foundational types for the adjudication engine
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money types with precise decimal arithmetic and the amount tolerance
//! - Validated claim and claim-run identifiers
//! - Port infrastructure for external collaborators

pub mod money;
pub mod identifiers;
pub mod ports;

pub use money::{Money, Currency, MoneyError, AMOUNT_TOLERANCE, MAX_AMOUNT, amounts_match};
pub use identifiers::{ClaimId, ClaimRunId, IdentifierError};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
    CircuitBreakerConfig,
};
