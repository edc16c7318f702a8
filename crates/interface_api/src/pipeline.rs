//! Claim-run pipeline
//!
//! Sequences every stage for one claim run and persists each artefact:
//!
//! ```text
//!   coverage ──► decision ──► confidence ──► routing
//!      │            │              │             │
//!      ▼            ▼              ▼             ▼
//!  coverage_    dossier_vN    confidence_    routing_decision
//!  analysis                   summary        (+ dossier_vN+1 on override)
//! ```
//!
//! Coverage cannot fail. Decision, confidence and routing failures are
//! logged and recorded in `stage_errors`; the run continues without that
//! stage's output and its elapsed time is still recorded.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument};

use core_kernel::{ClaimId, ClaimRunId, PortError};
use domain_claims::{
    AssessmentResult, Assumption, ClaimFacts, ClauseOverride, DecisionDossier, DecisionError,
    DecisionInput, DecisionStage, EngineRegistry, ScreeningResult,
};
use domain_confidence::{
    evaluate_triggers, CollectorInput, ConfidenceError, ConfidenceScorer, ConfidenceSummary, Router,
    RoutingDecision, SignalCollector, TriggerConfig, TriggerInput,
};
use domain_coverage::{
    ClaimContext, CoverageAnalysisResult, CoverageError, CoverageOrchestrator, CoverageScope,
    GenerativeModelPort, LineItem, RuleEngine,
};
use infra_store::{ClaimRunStore, StoreError};

use crate::config::AppConfig;

/// Errors that prevent the pipeline from being built
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Coverage setup failed: {0}")]
    Coverage(#[from] CoverageError),

    #[error("Decision setup failed: {0}")]
    Decision(#[from] DecisionError),

    #[error("Confidence setup failed: {0}")]
    Confidence(#[from] ConfidenceError),

    #[error("Store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("Model adapter setup failed: {0}")]
    Model(#[from] PortError),
}

/// Everything known about a claim when a run starts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimRunInput {
    pub line_items: Vec<LineItem>,
    pub scope: CoverageScope,
    pub context: ClaimContext,
    pub facts: ClaimFacts,
    pub screening: Option<ScreeningResult>,
    pub assessment: Option<AssessmentResult>,
    pub assumptions: Vec<Assumption>,
    pub overrides: Vec<ClauseOverride>,
}

/// Milliseconds spent per stage; a failed stage still reports its time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub coverage_ms: u64,
    pub decision_ms: Option<u64>,
    pub confidence_ms: Option<u64>,
    pub routing_ms: Option<u64>,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Coverage,
    Decision,
    Confidence,
    Routing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRunOutcome {
    pub claim_id: ClaimId,
    pub run_id: ClaimRunId,
    pub coverage: CoverageAnalysisResult,
    /// Latest dossier version written by this run
    pub dossier: Option<DecisionDossier>,
    pub confidence: Option<ConfidenceSummary>,
    pub routing: Option<RoutingDecision>,
    pub timings: StageTimings,
    pub stage_errors: Vec<StageFailure>,
}

#[derive(Debug, Clone)]
pub struct ClaimRunPipeline {
    orchestrator: Arc<CoverageOrchestrator>,
    decision: DecisionStage,
    collector: SignalCollector,
    scorer: ConfidenceScorer,
    triggers: TriggerConfig,
    router: Router,
    store: Arc<ClaimRunStore>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl ClaimRunPipeline {
    pub fn new(
        orchestrator: CoverageOrchestrator,
        decision: DecisionStage,
        scorer: ConfidenceScorer,
        router: Router,
        store: Arc<ClaimRunStore>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            decision,
            collector: SignalCollector::default(),
            scorer,
            triggers: TriggerConfig::default(),
            router,
            store,
        }
    }

    pub fn with_collector(mut self, collector: SignalCollector) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerConfig) -> Self {
        self.triggers = triggers;
        self
    }

    /// Builds every stage from configuration; the decision engine is bound by name
    pub fn from_config(
        config: &AppConfig,
        registry: &EngineRegistry,
        model: Option<Arc<dyn GenerativeModelPort>>,
        store: Arc<ClaimRunStore>,
    ) -> Result<Self, PipelineError> {
        let mut orchestrator = CoverageOrchestrator::new(config.coverage.orchestrator.clone(), model)?;
        if let Some(path) = &config.coverage.rules_file {
            orchestrator = orchestrator.with_rule_engine(RuleEngine::load_rules_from_file(path)?);
            info!(path = %path.display(), "Coverage rules loaded from file");
        }

        let engine = registry.build(&config.decision.engine, &config.decision.settings)?;
        let decision = DecisionStage::new(engine, store.clone()).with_max_attempts(config.decision.max_attempts);

        let confidence = &config.confidence;
        let scorer = ConfidenceScorer::new(confidence.scorer.clone())?;
        let router = Router::new(confidence.router.clone())?;

        Ok(Self::new(orchestrator, decision, scorer, router, store)
            .with_collector(SignalCollector::new(confidence.collector.clone()))
            .with_triggers(confidence.triggers.clone()))
    }

    pub fn store(&self) -> &Arc<ClaimRunStore> {
        &self.store
    }

    #[instrument(skip(self, input), fields(claim_id = %claim_id, run_id = %run_id, items = input.line_items.len()))]
    pub async fn run(&self, claim_id: &ClaimId, run_id: &ClaimRunId, input: ClaimRunInput) -> ClaimRunOutcome {
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let mut stage_errors = Vec::new();
        let mut fail = |stage: PipelineStage, message: String| {
            error!(claim_id = %claim_id, run_id = %run_id, stage = ?stage, "Stage failed: {}", message);
            stage_errors.push(StageFailure { stage, message });
        };

        // Coverage
        let stage_start = Instant::now();
        let coverage = self
            .orchestrator
            .analyze(claim_id, input.line_items, &input.scope, &input.context)
            .await;
        if let Err(e) = self.store.save_coverage(run_id, &coverage).await {
            fail(PipelineStage::Coverage, e.to_string());
        }
        timings.coverage_ms = elapsed_ms(stage_start);

        // Decision
        let stage_start = Instant::now();
        let decided = self
            .decision
            .evaluate(
                run_id,
                DecisionInput {
                    claim_id,
                    facts: &input.facts,
                    screening: input.screening.as_ref(),
                    coverage: Some(&coverage),
                    assessment: input.assessment.as_ref(),
                    assumptions: &input.assumptions,
                    overrides: &input.overrides,
                },
            )
            .await;
        timings.decision_ms = Some(elapsed_ms(stage_start));
        let mut dossier = match decided {
            Ok(dossier) => Some(dossier),
            Err(e) => {
                fail(PipelineStage::Decision, e.to_string());
                None
            }
        };

        // Confidence
        let stage_start = Instant::now();
        let signals = self.collector.collect(&CollectorInput {
            facts: Some(&input.facts),
            screening: input.screening.as_ref(),
            coverage: Some(&coverage),
            assessment: input.assessment.as_ref(),
            dossier: dossier.as_ref(),
        });
        let summary = self
            .scorer
            .compute(claim_id, &signals, dossier.as_ref().map(|d| d.claim_verdict));
        let confidence = match self.store.save_confidence(run_id, &summary).await {
            Ok(_) => Some(summary),
            Err(e) => {
                fail(PipelineStage::Confidence, e.to_string());
                None
            }
        };
        timings.confidence_ms = Some(elapsed_ms(stage_start));

        // Routing needs both a verdict and a score
        let mut routing = None;
        let mut routed_dossier = None;
        if let (Some(current), Some(summary)) = (dossier.as_ref(), confidence.as_ref()) {
            let stage_start = Instant::now();
            let fired = evaluate_triggers(
                &TriggerInput {
                    summary,
                    coverage: Some(&coverage),
                    dossier: Some(current),
                },
                &self.triggers,
            );
            let decision = self
                .router
                .route(claim_id, current.claim_verdict, summary.composite_score, fired);

            if decision.verdict_overridden {
                match self.decision.record_routing(current, decision.to_block()).await {
                    Ok(routed) => routed_dossier = Some(routed),
                    Err(e) => fail(PipelineStage::Routing, e.to_string()),
                }
            }
            match self.store.save_routing(run_id, &decision).await {
                Ok(_) => routing = Some(decision),
                Err(e) => fail(PipelineStage::Routing, e.to_string()),
            }
            timings.routing_ms = Some(elapsed_ms(stage_start));
        }
        if routed_dossier.is_some() {
            dossier = routed_dossier;
        }

        timings.total_ms = elapsed_ms(started);
        info!(
            claim_id = %claim_id,
            run_id = %run_id,
            verdict = dossier.as_ref().map(|d| d.claim_verdict.as_str()).unwrap_or("none"),
            version = dossier.as_ref().map(|d| d.version).unwrap_or(0),
            score = confidence.as_ref().map(|c| c.composite_score).unwrap_or(0.0),
            tier = %routing.as_ref().map(|r| r.tier.to_string()).unwrap_or_default(),
            errors = stage_errors.len(),
            total_ms = timings.total_ms,
            "Claim run finished"
        );

        ClaimRunOutcome {
            claim_id: claim_id.clone(),
            run_id: run_id.clone(),
            coverage,
            dossier,
            confidence,
            routing,
            timings,
            stage_errors,
        }
    }
}
