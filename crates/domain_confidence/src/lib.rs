//! Confidence Scoring and Routing
//!
//! Measures how much the evidence behind a claim decision can be trusted and
//! decides whether an approval may go out without human review.
//!
//! ```text
//!   facts, screening, coverage, assessment, dossier
//!        │
//!        ▼
//!   SignalCollector ──► Vec<Signal>
//!        │
//!        ▼
//!   ConfidenceScorer ──► ConfidenceSummary (five components, composite, band)
//!        │
//!        ▼
//!   evaluate_triggers + Router ──► RoutingDecision (GREEN / YELLOW / RED)
//! ```

pub mod collector;
pub mod error;
pub mod router;
pub mod scorer;
pub mod signal;
pub mod triggers;

pub use collector::{CollectorInput, SignalCollector, SignalCollectorConfig};
pub use error::ConfidenceError;
pub use router::{Router, RouterConfig, RoutingDecision};
pub use scorer::{
    ComponentScore, ComponentWeights, ConfidenceBand, ConfidenceScorer, ConfidenceSummary,
    ScorerConfig,
};
pub use signal::{names, ComponentName, Signal, SourceStage};
pub use triggers::{evaluate_triggers, TriggerConfig, TriggerInput};
