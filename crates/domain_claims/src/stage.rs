//! Decision stage
//!
//! Runs the bound engine for one claim run and appends the result as the
//! next dossier version:
//!
//! ```text
//!   count existing versions ──► version = count + 1 ──► append
//!            ▲                                             │
//!            └──────────── conflict (another writer) ◄─────┘
//! ```
//!
//! A routing decision that changes the verdict is appended the same way, so
//! every earlier version stays as it was written.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use core_kernel::{ClaimRunId, PortError};

use crate::dossier::{DecisionDossier, RoutingBlock};
use crate::engine::{DecisionEngine, DecisionInput, EngineDecision};
use crate::error::DecisionError;
use crate::ports::DossierRepository;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct DecisionStage {
    engine: Arc<dyn DecisionEngine>,
    repository: Arc<dyn DossierRepository>,
    max_attempts: u32,
}

impl fmt::Debug for DecisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionStage")
            .field("engine", &self.engine.identity())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl DecisionStage {
    pub fn new(engine: Arc<dyn DecisionEngine>, repository: Arc<dyn DossierRepository>) -> Self {
        Self {
            engine,
            repository,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Attempts at allocating a free version before giving up
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn engine(&self) -> &Arc<dyn DecisionEngine> {
        &self.engine
    }

    /// Evaluates the claim and appends a new dossier version
    pub async fn evaluate(
        &self,
        run_id: &ClaimRunId,
        input: DecisionInput<'_>,
    ) -> Result<DecisionDossier, DecisionError> {
        let decision = self.engine.decide(&input)?;
        let failed_clauses = decision.failed_clauses();
        let EngineDecision {
            verdict,
            reason,
            clause_evaluations,
            financial_summary,
            assumptions_applied,
            overrides_applied,
        } = decision;

        let dossier = DecisionDossier {
            claim_id: input.claim_id.clone(),
            run_id: run_id.clone(),
            version: 0,
            claim_verdict: verdict,
            verdict_reason: reason,
            clause_evaluations,
            financial_summary,
            failed_clauses,
            assumptions_applied,
            overrides_applied,
            engine: self.engine.identity(),
            evaluation_timestamp: Utc::now(),
            routing: None,
        };

        let dossier = self.append_next_version(dossier).await?;
        tracing::info!(
            claim_id = %dossier.claim_id,
            run_id = %dossier.run_id,
            stage = "decision",
            version = dossier.version,
            verdict = %dossier.claim_verdict,
            failed_clauses = dossier.failed_clauses.len(),
            payout = %dossier.financial_summary.final_payout,
            "Decision dossier written"
        );
        Ok(dossier)
    }

    /// Appends `base` with the routing block attached as the next version
    ///
    /// The routed verdict replaces the claim verdict; the original stays in
    /// `routing.original_verdict` and in the earlier version.
    pub async fn record_routing(
        &self,
        base: &DecisionDossier,
        routing: RoutingBlock,
    ) -> Result<DecisionDossier, DecisionError> {
        let mut dossier = base.clone();
        if routing.verdict_overridden {
            dossier.verdict_reason = format!(
                "{} (routed {} -> {}: {})",
                base.verdict_reason, routing.original_verdict, routing.routed_verdict, routing.rationale
            );
        }
        dossier.claim_verdict = routing.routed_verdict;
        dossier.evaluation_timestamp = Utc::now();
        dossier.routing = Some(routing);

        let dossier = self.append_next_version(dossier).await?;
        tracing::info!(
            claim_id = %dossier.claim_id,
            run_id = %dossier.run_id,
            version = dossier.version,
            verdict = %dossier.claim_verdict,
            "Routing recorded as new dossier version"
        );
        Ok(dossier)
    }

    async fn append_next_version(&self, mut dossier: DecisionDossier) -> Result<DecisionDossier, DecisionError> {
        for attempt in 1..=self.max_attempts {
            let existing = self
                .repository
                .count_versions(&dossier.claim_id, &dossier.run_id)
                .await?;
            dossier.version = existing + 1;

            match self.repository.append_dossier(&dossier).await {
                Ok(()) => return Ok(dossier),
                Err(PortError::Conflict { message }) => {
                    tracing::warn!(
                        claim_id = %dossier.claim_id,
                        run_id = %dossier.run_id,
                        version = dossier.version,
                        attempt,
                        "Dossier version taken, retrying: {}",
                        message
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DecisionError::VersionConflict {
            claim_id: dossier.claim_id.to_string(),
            run_id: dossier.run_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}
