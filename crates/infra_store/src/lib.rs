//! Infrastructure Store Layer
//!
//! Persists the artefacts of each claim run as UTF-8 JSON files under a
//! root directory. All writes go through a temp file and an atomic move;
//! dossier versions are append-only, so concurrent runs of the same claim
//! need no file locking.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_store::ClaimRunStore;
//! use domain_claims::DossierRepository;
//!
//! let store = ClaimRunStore::open("/var/lib/adjudicator/claims")?;
//! let latest = store.latest_dossier(&claim_id, &run_id).await?;
//! ```

pub mod error;
pub mod fs;
pub mod store;

pub use error::StoreError;
pub use store::{ClaimRunStore, CONFIDENCE_FILE, COVERAGE_FILE, ROUTING_FILE};
