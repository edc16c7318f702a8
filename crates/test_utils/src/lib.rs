//! Test Utilities Crate
//!
//! Shared test infrastructure for the adjudication crates.
//!
//! # Modules
//!
//! - `fixtures`: Ready-made claims, scopes and upstream stage outputs
//! - `builders`: Builders for line items and screening results
//! - `assertions`: Assertion helpers for coverage, confidence and dossiers
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
