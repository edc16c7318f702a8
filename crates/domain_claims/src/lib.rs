//! Claim Decision Domain
//!
//! Turns coverage results, screening checks and the generative assessment
//! into a verdict on the claim, recorded as a versioned decision dossier.
//!
//! # Decision Flow
//!
//! ```text
//! facts + screening + coverage + assessment
//!        │
//!        ▼
//!   DecisionEngine (bound by name from the EngineRegistry)
//!        │  clause evaluations, assumptions, overrides, financial summary
//!        ▼
//!   DecisionStage ──► DossierRepository: decision_dossier_v{N}.json
//! ```
//!
//! Verdicts are APPROVE, DENY or REFER. Dossiers are append-only: each
//! evaluation, and each routing override, writes the next version.

pub mod dossier;
pub mod engine;
pub mod error;
pub mod facts;
pub mod ports;
pub mod registry;
pub mod screening;
pub mod stage;

pub use dossier::{
    dossier_file_name, parse_dossier_version, Assumption, ClaimVerdict, ClauseEvaluation,
    ClauseOverride, ClauseVerdict, DecisionDossier, EngineIdentity, EvaluabilityTier,
    FinancialSummary, FiredTrigger, RoutingBlock, RoutingTier, TriggerSeverity,
};
pub use engine::{
    DecisionEngine, DecisionInput, EngineDecision, ReferenceDecisionEngine, ReferenceEngineConfig,
};
pub use error::DecisionError;
pub use facts::{ClaimFacts, ExtractedFact};
pub use ports::DossierRepository;
pub use registry::{EngineFactory, EngineRegistry};
pub use screening::{
    AssessmentCheck, AssessmentResult, CheckResult, PayoutCalculation, Recommendation,
    ScreeningCheck, ScreeningResult,
};
pub use stage::DecisionStage;
