//! Confidence router
//!
//! Maps the composite score and fired triggers to a routing tier:
//!
//! ```text
//!   score >= green ──► GREEN ──(any WARNING)──► YELLOW
//!   score >= yellow ─► YELLOW
//!   otherwise ───────► RED
//!   any CRITICAL ────► RED
//! ```
//!
//! Only an APPROVE on a RED claim is rewritten, to REFER. DENY and REFER
//! pass through unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::ClaimId;
use domain_claims::{ClaimVerdict, FiredTrigger, RoutingBlock, RoutingTier, TriggerSeverity};

use crate::error::ConfidenceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub green_threshold: f64,
    pub yellow_threshold: f64,
    /// CRITICAL triggers force RED whatever the score
    pub critical_forces_red: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            green_threshold: 0.80,
            yellow_threshold: 0.55,
            critical_forces_red: true,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfidenceError> {
        let bounded = |t: f64| (0.0..=1.0).contains(&t);
        if !bounded(self.green_threshold) || !bounded(self.yellow_threshold) {
            return Err(ConfidenceError::invalid_config("router thresholds must lie in [0, 1]"));
        }
        if self.yellow_threshold > self.green_threshold {
            return Err(ConfidenceError::invalid_config(format!(
                "yellow threshold {} above green threshold {}",
                self.yellow_threshold, self.green_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub claim_id: ClaimId,
    pub tier: RoutingTier,
    pub composite_score: f64,
    pub original_verdict: ClaimVerdict,
    pub routed_verdict: ClaimVerdict,
    pub verdict_overridden: bool,
    pub triggers: Vec<FiredTrigger>,
    pub rationale: String,
    pub routed_at: DateTime<Utc>,
}

impl RoutingDecision {
    /// Block recorded in the dossier version written for this decision
    pub fn to_block(&self) -> RoutingBlock {
        RoutingBlock {
            tier: self.tier,
            composite_score: self.composite_score,
            original_verdict: self.original_verdict,
            routed_verdict: self.routed_verdict,
            verdict_overridden: self.verdict_overridden,
            triggers: self.triggers.clone(),
            rationale: self.rationale.clone(),
            routed_at: self.routed_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    config: RouterConfig,
}

impl Router {
    pub fn new(config: RouterConfig) -> Result<Self, ConfidenceError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn route(
        &self,
        claim_id: &ClaimId,
        verdict: ClaimVerdict,
        score: f64,
        triggers: Vec<FiredTrigger>,
    ) -> RoutingDecision {
        let mut reasons = Vec::new();
        let mut tier = if score >= self.config.green_threshold {
            RoutingTier::Green
        } else if score >= self.config.yellow_threshold {
            RoutingTier::Yellow
        } else {
            reasons.push(format!(
                "composite score {:.3} below yellow threshold {:.2}",
                score, self.config.yellow_threshold
            ));
            RoutingTier::Red
        };

        let critical: Vec<&str> = triggers
            .iter()
            .filter(|t| t.severity == TriggerSeverity::Critical)
            .map(|t| t.name.as_str())
            .collect();
        let warnings: Vec<&str> = triggers
            .iter()
            .filter(|t| t.severity == TriggerSeverity::Warning)
            .map(|t| t.name.as_str())
            .collect();

        if self.config.critical_forces_red && !critical.is_empty() {
            tier = RoutingTier::Red;
            reasons.push(format!("critical triggers: {}", critical.join(", ")));
        }
        if tier == RoutingTier::Green && !warnings.is_empty() {
            tier = RoutingTier::Yellow;
            reasons.push(format!("warning triggers: {}", warnings.join(", ")));
        }

        let verdict_overridden = tier == RoutingTier::Red && verdict == ClaimVerdict::Approve;
        let routed_verdict = if verdict_overridden {
            ClaimVerdict::Refer
        } else {
            verdict
        };

        let rationale = if reasons.is_empty() {
            format!("composite score {:.3} routed {}", score, tier)
        } else {
            reasons.join("; ")
        };

        if verdict_overridden {
            tracing::warn!(
                claim_id = %claim_id,
                stage = "routing",
                score,
                tier = %tier,
                "APPROVE overridden to REFER: {}",
                rationale
            );
        } else {
            tracing::info!(
                claim_id = %claim_id,
                stage = "routing",
                score,
                tier = %tier,
                triggers = triggers.len(),
                "Claim routed"
            );
        }

        RoutingDecision {
            claim_id: claim_id.clone(),
            tier,
            composite_score: score,
            original_verdict: verdict,
            routed_verdict,
            verdict_overridden,
            triggers,
            rationale,
            routed_at: Utc::now(),
        }
    }
}
