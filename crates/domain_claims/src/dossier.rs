//! Decision dossier
//!
//! The dossier is the versioned record of a claim verdict. Every evaluation
//! produces a new version; an earlier version is never rewritten.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use core_kernel::{ClaimId, ClaimRunId, Currency, Money};

/// Claim-level verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimVerdict {
    Approve,
    Deny,
    Refer,
}

impl ClaimVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimVerdict::Approve => "APPROVE",
            ClaimVerdict::Deny => "DENY",
            ClaimVerdict::Refer => "REFER",
        }
    }
}

impl fmt::Display for ClaimVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict on one policy clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClauseVerdict {
    Pass,
    Fail,
}

/// How a clause verdict was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluabilityTier {
    /// Screening check with a definite result
    Deterministic,
    /// Taken from the generative assessment
    Inferred,
    /// Inconclusive check resolved by an explicit assumption
    Assumed,
    /// Replaced by an explicit override
    Overridden,
    /// Inconclusive and unresolved; carries no verdict
    NotEvaluable,
}

/// Evaluation of one clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseEvaluation {
    pub clause_reference: String,
    /// `None` exactly when the tier is NOT_EVALUABLE
    pub verdict: Option<ClauseVerdict>,
    pub tier: EvaluabilityTier,
    /// Designated hard check for the verdict rules
    pub is_hard: bool,
    #[serde(default)]
    pub affected_line_items: Vec<usize>,
    #[serde(default)]
    pub evidence: Value,
}

impl ClauseEvaluation {
    pub fn is_failed(&self) -> bool {
        self.verdict == Some(ClauseVerdict::Fail)
    }

    pub fn is_evaluable(&self) -> bool {
        self.verdict.is_some()
    }
}

/// Resolves an inconclusive clause to a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub clause_reference: String,
    pub assumed_verdict: ClauseVerdict,
    pub rationale: String,
}

/// Replaces a clause verdict regardless of how it was reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseOverride {
    pub clause_reference: String,
    pub verdict: ClauseVerdict,
    pub reason: String,
    pub overridden_by: String,
}

/// Money totals carried in the dossier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub currency: Currency,
    pub claimed: Money,
    pub covered: Money,
    pub not_covered: Money,
    pub review_pending: Money,
    pub deductible: Money,
    pub final_payout: Money,
}

impl FinancialSummary {
    pub fn zero(currency: Currency) -> Self {
        Self {
            currency,
            claimed: Money::zero(currency),
            covered: Money::zero(currency),
            not_covered: Money::zero(currency),
            review_pending: Money::zero(currency),
            deductible: Money::zero(currency),
            final_payout: Money::zero(currency),
        }
    }

    pub fn has_payout(&self) -> bool {
        self.final_payout.amount() > Decimal::ZERO
    }
}

/// Name and version of the engine that produced a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineIdentity {
    pub name: String,
    pub version: String,
}

/// Routing tier derived from the composite confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingTier {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for RoutingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingTier::Green => "GREEN",
            RoutingTier::Yellow => "YELLOW",
            RoutingTier::Red => "RED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSeverity {
    Warning,
    Critical,
}

/// A routing trigger that fired for this claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredTrigger {
    pub name: String,
    pub severity: TriggerSeverity,
    pub detail: String,
}

/// Routing outcome attached to a dossier version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingBlock {
    pub tier: RoutingTier,
    pub composite_score: f64,
    pub original_verdict: ClaimVerdict,
    pub routed_verdict: ClaimVerdict,
    pub verdict_overridden: bool,
    pub triggers: Vec<FiredTrigger>,
    pub rationale: String,
    pub routed_at: DateTime<Utc>,
}

/// Versioned decision record for one claim run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDossier {
    pub claim_id: ClaimId,
    pub run_id: ClaimRunId,
    /// Starts at 1, strictly increasing within a claim run
    pub version: u32,
    pub claim_verdict: ClaimVerdict,
    pub verdict_reason: String,
    pub clause_evaluations: Vec<ClauseEvaluation>,
    pub financial_summary: FinancialSummary,
    pub failed_clauses: Vec<String>,
    #[serde(default)]
    pub assumptions_applied: Vec<Assumption>,
    #[serde(default)]
    pub overrides_applied: Vec<ClauseOverride>,
    pub engine: EngineIdentity,
    pub evaluation_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub routing: Option<RoutingBlock>,
}

impl DecisionDossier {
    /// File name under which this version is persisted
    pub fn file_name(&self) -> String {
        dossier_file_name(self.version)
    }

    pub fn clause(&self, reference: &str) -> Option<&ClauseEvaluation> {
        self.clause_evaluations
            .iter()
            .find(|c| c.clause_reference == reference)
    }

    /// Share of evaluable clauses that passed; `None` when none are evaluable
    pub fn clause_pass_rate(&self) -> Option<f64> {
        let evaluable: Vec<&ClauseEvaluation> = self
            .clause_evaluations
            .iter()
            .filter(|c| c.is_evaluable())
            .collect();
        if evaluable.is_empty() {
            return None;
        }
        let passed = evaluable
            .iter()
            .filter(|c| c.verdict == Some(ClauseVerdict::Pass))
            .count();
        Some(passed as f64 / evaluable.len() as f64)
    }
}

pub fn dossier_file_name(version: u32) -> String {
    format!("decision_dossier_v{}.json", version)
}

/// Parses the version out of a dossier file name
pub fn parse_dossier_version(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("decision_dossier_v")?
        .strip_suffix(".json")?
        .parse()
        .ok()
        .filter(|v| *v > 0)
}
