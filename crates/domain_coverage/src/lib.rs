//! Coverage Domain - classification of repair invoice line items
//!
//! Line items run through a cascade of matchers, cheapest first:
//!
//! ```text
//!   RuleEngine ──► KeywordMatcher ──► GenerativeMatcher
//!                                            │
//!           PostProcessor ◄──────────────────┘
//!   (labor linkage, anchor demotion, nominal price flag)
//!                 │
//!           ValidationGuard ──► CoverageAnalysisResult
//! ```
//!
//! The [`CoverageOrchestrator`] sequences the stages for one claim. Each
//! stage appends to the item's decision trace rather than rewriting it.

pub mod adapters;
pub mod error;
pub mod generative;
pub mod keyword_matcher;
pub mod line_item;
pub mod model_port;
pub mod orchestrator;
pub mod post_process;
pub mod prompt;
pub mod rule_engine;
pub mod scope;
pub mod trace;
pub mod validation;
pub mod vocabulary;

pub use error::CoverageError;
pub use generative::{GenerativeMatcher, GenerativeMatcherConfig};
pub use keyword_matcher::{KeywordBatch, KeywordMatcher, KeywordMatcherConfig};
pub use line_item::{
    CoverageAnalysisResult, CoverageStatus, CoverageSummary, ExclusionReason, ItemType,
    LineItem, LineItemCoverage, MatchMethod, MethodCounts,
};
pub use model_port::{GenerativeModelPort, GenerativeRequest};
pub use orchestrator::{CoverageOrchestrator, OrchestratorConfig};
pub use post_process::{PostProcessor, PostProcessorConfig};
pub use rule_engine::{RuleEngine, RuleEngineConfig};
pub use scope::{ClaimContext, CoverageScope, PrimaryRepair};
pub use trace::{DecisionTrace, TraceAction, TraceEntry, TraceStage};
pub use validation::{ValidationGuard, ValidationGuardConfig};
pub use vocabulary::KeywordMapping;
