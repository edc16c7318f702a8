//! Decision engines
//!
//! A [`DecisionEngine`] turns the evidence gathered for a claim into clause
//! evaluations, a financial summary and a verdict. Deployments bind one
//! engine by name at startup through the [`crate::registry::EngineRegistry`].
//!
//! The [`ReferenceDecisionEngine`] applies the standard policy:
//!
//! | condition                                         | verdict |
//! |---------------------------------------------------|---------|
//! | any hard check FAIL                               | DENY    |
//! | any hard check inconclusive or missing            | REFER   |
//! | no assessment, or assessment asks for referral    | REFER   |
//! | assessment recommends DENY                        | DENY    |
//! | assessment recommends APPROVE, payout is zero     | DENY    |
//! | assessment recommends APPROVE, payout positive    | APPROVE |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use core_kernel::{ClaimId, Currency, Money};
use domain_coverage::{CoverageAnalysisResult, CoverageStatus};

use crate::dossier::{
    Assumption, ClaimVerdict, ClauseEvaluation, ClauseOverride, ClauseVerdict, EngineIdentity,
    EvaluabilityTier, FinancialSummary,
};
use crate::error::DecisionError;
use crate::facts::ClaimFacts;
use crate::screening::{AssessmentResult, CheckResult, Recommendation, ScreeningResult};

/// Clause reference of the coverage-derived clause
pub const LINE_ITEM_COVERAGE_CLAUSE: &str = "line_item_coverage";

/// Everything an engine may look at
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub claim_id: &'a ClaimId,
    pub facts: &'a ClaimFacts,
    pub screening: Option<&'a ScreeningResult>,
    pub coverage: Option<&'a CoverageAnalysisResult>,
    pub assessment: Option<&'a AssessmentResult>,
    pub assumptions: &'a [Assumption],
    pub overrides: &'a [ClauseOverride],
}

/// An engine's decision, before it is versioned into a dossier
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDecision {
    pub verdict: ClaimVerdict,
    pub reason: String,
    pub clause_evaluations: Vec<ClauseEvaluation>,
    pub financial_summary: FinancialSummary,
    pub assumptions_applied: Vec<Assumption>,
    pub overrides_applied: Vec<ClauseOverride>,
}

impl EngineDecision {
    pub fn failed_clauses(&self) -> Vec<String> {
        self.clause_evaluations
            .iter()
            .filter(|c| c.is_failed())
            .map(|c| c.clause_reference.clone())
            .collect()
    }
}

pub trait DecisionEngine: Send + Sync + fmt::Debug {
    fn identity(&self) -> EngineIdentity;

    fn decide(&self, input: &DecisionInput<'_>) -> Result<EngineDecision, DecisionError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceEngineConfig {
    /// Check ids that decide the claim on their own
    pub hard_checks: Vec<String>,
    pub currency: Currency,
}

impl Default for ReferenceEngineConfig {
    fn default() -> Self {
        Self {
            hard_checks: vec![
                "policy_validity".to_string(),
                "vehicle_identity".to_string(),
                "mileage_limit".to_string(),
            ],
            currency: Currency::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceDecisionEngine {
    config: ReferenceEngineConfig,
}

impl ReferenceDecisionEngine {
    pub const NAME: &'static str = "reference";

    pub fn new(config: ReferenceEngineConfig) -> Self {
        Self { config }
    }

    /// Builds the engine from registry settings
    pub fn from_settings(settings: &Value) -> Result<Self, DecisionError> {
        let config = if settings.is_null() {
            ReferenceEngineConfig::default()
        } else {
            serde_json::from_value(settings.clone())
                .map_err(|e| DecisionError::invalid_config(format!("reference engine: {}", e)))?
        };
        Ok(Self::new(config))
    }

    fn is_hard(&self, reference: &str, flagged: bool) -> bool {
        flagged || self.config.hard_checks.iter().any(|h| h == reference)
    }

    fn collect_clauses(&self, input: &DecisionInput<'_>) -> Vec<ClauseEvaluation> {
        let mut clauses: Vec<ClauseEvaluation> = Vec::new();

        if let Some(screening) = input.screening {
            for check in &screening.checks {
                clauses.push(ClauseEvaluation {
                    clause_reference: check.check_id.clone(),
                    verdict: clause_verdict(check.result),
                    tier: tier_for(check.result, EvaluabilityTier::Deterministic),
                    is_hard: self.is_hard(&check.check_id, check.is_hard),
                    affected_line_items: check.affected_items.clone(),
                    evidence: json!({
                        "source": "screening",
                        "result": check.result,
                        "reason": check.reason,
                        "detail": check.evidence,
                    }),
                });
            }
        }

        if let Some(assessment) = input.assessment {
            for check in &assessment.checks {
                if clauses.iter().any(|c| c.clause_reference == check.check_id) {
                    continue;
                }
                clauses.push(ClauseEvaluation {
                    clause_reference: check.check_id.clone(),
                    verdict: clause_verdict(check.result),
                    tier: tier_for(check.result, EvaluabilityTier::Inferred),
                    is_hard: self.is_hard(&check.check_id, false),
                    affected_line_items: Vec::new(),
                    evidence: json!({
                        "source": "assessment",
                        "result": check.result,
                        "details": check.details,
                    }),
                });
            }
        }

        if let Some(coverage) = input.coverage {
            let summary = &coverage.summary;
            let excluded: Vec<usize> = coverage
                .line_items
                .iter()
                .enumerate()
                .filter(|(_, i)| i.status() == CoverageStatus::NotCovered)
                .map(|(index, _)| index)
                .collect();
            let verdict = if summary.total_covered.is_positive() {
                ClauseVerdict::Pass
            } else {
                ClauseVerdict::Fail
            };
            clauses.push(ClauseEvaluation {
                clause_reference: LINE_ITEM_COVERAGE_CLAUSE.to_string(),
                verdict: Some(verdict),
                tier: EvaluabilityTier::Deterministic,
                is_hard: self.is_hard(LINE_ITEM_COVERAGE_CLAUSE, false),
                affected_line_items: excluded,
                evidence: json!({
                    "source": "coverage",
                    "claimed": summary.total_claimed.amount(),
                    "covered": summary.total_covered.amount(),
                    "coverage_percent": summary.coverage_percent,
                }),
            });
        }

        clauses
    }

    fn apply_assumptions(
        &self,
        clauses: &mut [ClauseEvaluation],
        assumptions: &[Assumption],
    ) -> Vec<Assumption> {
        let mut applied = Vec::new();
        for assumption in assumptions {
            let Some(clause) = clauses
                .iter_mut()
                .find(|c| c.clause_reference == assumption.clause_reference)
            else {
                tracing::warn!(clause = %assumption.clause_reference, "Assumption for unknown clause ignored");
                continue;
            };
            if clause.is_evaluable() {
                tracing::debug!(clause = %assumption.clause_reference, "Clause already decided, assumption not needed");
                continue;
            }
            clause.verdict = Some(assumption.assumed_verdict);
            clause.tier = EvaluabilityTier::Assumed;
            set_evidence(&mut clause.evidence, "assumption", json!(assumption.rationale));
            applied.push(assumption.clone());
        }
        applied
    }

    fn apply_overrides(
        &self,
        clauses: &mut [ClauseEvaluation],
        overrides: &[ClauseOverride],
    ) -> Result<Vec<ClauseOverride>, DecisionError> {
        for over in overrides {
            let clause = clauses
                .iter_mut()
                .find(|c| c.clause_reference == over.clause_reference)
                .ok_or_else(|| DecisionError::UnknownClause(over.clause_reference.clone()))?;
            let previous = json!({
                "verdict": clause.verdict,
                "tier": clause.tier,
                "reason": over.reason,
                "overridden_by": over.overridden_by,
            });
            clause.verdict = Some(over.verdict);
            clause.tier = EvaluabilityTier::Overridden;
            set_evidence(&mut clause.evidence, "override", previous);
        }
        Ok(overrides.to_vec())
    }

    fn financial_summary(&self, input: &DecisionInput<'_>) -> FinancialSummary {
        let currency = self.config.currency;
        let money = |amount: Decimal| Money::new(amount, currency);
        let mut summary = FinancialSummary::zero(currency);

        if let Some(coverage) = input.coverage {
            let totals = &coverage.summary;
            summary.claimed = money(totals.total_claimed.amount());
            summary.covered = money(totals.total_covered.amount());
            summary.not_covered = money(totals.total_not_covered.amount());
            summary.review_pending = money(totals.total_review_needed.amount());
        }

        let precalculated = input.screening.and_then(|s| s.payout.as_ref());
        let deductible = precalculated.map(|p| p.deductible).unwrap_or(Decimal::ZERO);
        summary.deductible = money(deductible);

        let payout = input
            .assessment
            .and_then(|a| a.payout)
            .or_else(|| precalculated.map(|p| p.final_payout))
            .unwrap_or_else(|| summary.covered.amount().saturating_sub(deductible));
        summary.final_payout = money(payout.max(Decimal::ZERO));
        summary
    }

    fn derive_verdict(
        &self,
        clauses: &[ClauseEvaluation],
        assessment: Option<&AssessmentResult>,
        summary: &FinancialSummary,
    ) -> (ClaimVerdict, String) {
        let hard: Vec<&ClauseEvaluation> = clauses.iter().filter(|c| c.is_hard).collect();

        let failed: Vec<&str> = hard
            .iter()
            .filter(|c| c.is_failed())
            .map(|c| c.clause_reference.as_str())
            .collect();
        if !failed.is_empty() {
            return (ClaimVerdict::Deny, format!("Hard check failed: {}", failed.join(", ")));
        }

        let mut unresolved: Vec<&str> = hard
            .iter()
            .filter(|c| !c.is_evaluable())
            .map(|c| c.clause_reference.as_str())
            .collect();
        unresolved.extend(
            self.config
                .hard_checks
                .iter()
                .filter(|h| !clauses.iter().any(|c| &c.clause_reference == *h))
                .map(String::as_str),
        );
        if !unresolved.is_empty() {
            return (
                ClaimVerdict::Refer,
                format!("Hard check inconclusive: {}", unresolved.join(", ")),
            );
        }

        let Some(assessment) = assessment else {
            return (ClaimVerdict::Refer, "No assessment available".to_string());
        };
        match assessment.recommendation {
            Recommendation::Refer => (
                ClaimVerdict::Refer,
                format!("Assessment requests human referral: {}", assessment.rationale),
            ),
            Recommendation::Deny => (
                ClaimVerdict::Deny,
                format!("Assessment recommends denial: {}", assessment.rationale),
            ),
            Recommendation::Approve if !summary.has_payout() => (
                ClaimVerdict::Deny,
                "Assessment approves but the payout is zero".to_string(),
            ),
            Recommendation::Approve => (
                ClaimVerdict::Approve,
                format!(
                    "All hard checks passed, payout {}",
                    summary.final_payout
                ),
            ),
        }
    }
}

impl DecisionEngine for ReferenceDecisionEngine {
    fn identity(&self) -> EngineIdentity {
        EngineIdentity {
            name: Self::NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn decide(&self, input: &DecisionInput<'_>) -> Result<EngineDecision, DecisionError> {
        let mut clauses = self.collect_clauses(input);
        let assumptions_applied = self.apply_assumptions(&mut clauses, input.assumptions);
        let overrides_applied = self.apply_overrides(&mut clauses, input.overrides)?;
        let financial_summary = self.financial_summary(input);
        let (verdict, reason) = self.derive_verdict(&clauses, input.assessment, &financial_summary);

        tracing::debug!(
            claim_id = %input.claim_id,
            verdict = %verdict,
            clauses = clauses.len(),
            facts = input.facts.len(),
            "Reference engine decided"
        );

        Ok(EngineDecision {
            verdict,
            reason,
            clause_evaluations: clauses,
            financial_summary,
            assumptions_applied,
            overrides_applied,
        })
    }
}

fn clause_verdict(result: CheckResult) -> Option<ClauseVerdict> {
    match result {
        CheckResult::Pass => Some(ClauseVerdict::Pass),
        CheckResult::Fail => Some(ClauseVerdict::Fail),
        CheckResult::Inconclusive => None,
    }
}

fn tier_for(result: CheckResult, decided: EvaluabilityTier) -> EvaluabilityTier {
    if result == CheckResult::Inconclusive {
        EvaluabilityTier::NotEvaluable
    } else {
        decided
    }
}

fn set_evidence(evidence: &mut Value, key: &str, value: Value) {
    if !evidence.is_object() {
        *evidence = json!({ "detail": evidence.take() });
    }
    if let Some(map) = evidence.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screening::{PayoutCalculation, ScreeningCheck};
    use rust_decimal_macros::dec;

    fn claim() -> ClaimId {
        ClaimId::new("64168").unwrap()
    }

    fn passing_screening() -> ScreeningResult {
        ScreeningResult::new(vec![
            ScreeningCheck::new("policy_validity", CheckResult::Pass),
            ScreeningCheck::new("vehicle_identity", CheckResult::Pass),
            ScreeningCheck::new("mileage_limit", CheckResult::Pass),
            ScreeningCheck::new("service_history", CheckResult::Fail),
        ])
        .with_payout(PayoutCalculation::compute(dec!(1500), dec!(150), None))
    }

    fn decide(
        screening: &ScreeningResult,
        assessment: Option<&AssessmentResult>,
        assumptions: &[Assumption],
        overrides: &[ClauseOverride],
    ) -> Result<EngineDecision, DecisionError> {
        let claim_id = claim();
        let facts = ClaimFacts::default();
        ReferenceDecisionEngine::default().decide(&DecisionInput {
            claim_id: &claim_id,
            facts: &facts,
            screening: Some(screening),
            coverage: None,
            assessment,
            assumptions,
            overrides,
        })
    }

    #[test]
    fn test_approve_when_hard_checks_pass() {
        let assessment = AssessmentResult::new(Recommendation::Approve);
        let decision = decide(&passing_screening(), Some(&assessment), &[], &[]).unwrap();

        assert_eq!(decision.verdict, ClaimVerdict::Approve);
        assert_eq!(decision.financial_summary.final_payout.amount(), dec!(1350));
        // Soft failures are listed but do not decide the claim
        assert_eq!(decision.failed_clauses(), vec!["service_history".to_string()]);
    }

    #[test]
    fn test_hard_failure_denies() {
        let mut screening = passing_screening();
        screening.checks[2].result = CheckResult::Fail;
        let assessment = AssessmentResult::new(Recommendation::Approve);

        let decision = decide(&screening, Some(&assessment), &[], &[]).unwrap();
        assert_eq!(decision.verdict, ClaimVerdict::Deny);
        assert!(decision.reason.contains("mileage_limit"));
    }

    #[test]
    fn test_inconclusive_hard_check_refers_until_assumed() {
        let mut screening = passing_screening();
        screening.checks[1].result = CheckResult::Inconclusive;
        let assessment = AssessmentResult::new(Recommendation::Approve);

        let referred = decide(&screening, Some(&assessment), &[], &[]).unwrap();
        assert_eq!(referred.verdict, ClaimVerdict::Refer);
        assert!(referred.reason.contains("vehicle_identity"));

        let assumption = Assumption {
            clause_reference: "vehicle_identity".to_string(),
            assumed_verdict: ClauseVerdict::Pass,
            rationale: "VIN partially legible, matches policy".to_string(),
        };
        let assumed = decide(&screening, Some(&assessment), &[assumption], &[]).unwrap();
        assert_eq!(assumed.verdict, ClaimVerdict::Approve);
        assert_eq!(assumed.assumptions_applied.len(), 1);
        let clause = &assumed.clause_evaluations[1];
        assert_eq!(clause.tier, EvaluabilityTier::Assumed);
        assert!(clause.evidence.get("assumption").is_some());
    }

    #[test]
    fn test_missing_hard_check_refers() {
        let screening = ScreeningResult::new(vec![ScreeningCheck::new("policy_validity", CheckResult::Pass)]);
        let assessment = AssessmentResult::new(Recommendation::Approve).with_payout(dec!(100));

        let decision = decide(&screening, Some(&assessment), &[], &[]).unwrap();
        assert_eq!(decision.verdict, ClaimVerdict::Refer);
    }

    #[test]
    fn test_zero_payout_denies_approving_assessment() {
        let assessment = AssessmentResult::new(Recommendation::Approve).with_payout(dec!(0));
        let decision = decide(&passing_screening(), Some(&assessment), &[], &[]).unwrap();
        assert_eq!(decision.verdict, ClaimVerdict::Deny);
    }

    #[test]
    fn test_referral_and_missing_assessment() {
        let refer = AssessmentResult::new(Recommendation::Refer);
        assert_eq!(
            decide(&passing_screening(), Some(&refer), &[], &[]).unwrap().verdict,
            ClaimVerdict::Refer
        );
        assert_eq!(
            decide(&passing_screening(), None, &[], &[]).unwrap().verdict,
            ClaimVerdict::Refer
        );
    }

    #[test]
    fn test_override_replaces_hard_failure() {
        let mut screening = passing_screening();
        screening.checks[0].result = CheckResult::Fail;
        let assessment = AssessmentResult::new(Recommendation::Approve);
        let over = ClauseOverride {
            clause_reference: "policy_validity".to_string(),
            verdict: ClauseVerdict::Pass,
            reason: "Renewal payment confirmed by phone".to_string(),
            overridden_by: "adjuster-7".to_string(),
        };

        let decision = decide(&screening, Some(&assessment), &[], &[over]).unwrap();
        assert_eq!(decision.verdict, ClaimVerdict::Approve);
        let clause = &decision.clause_evaluations[0];
        assert_eq!(clause.tier, EvaluabilityTier::Overridden);
        assert_eq!(clause.evidence["override"]["verdict"], json!("FAIL"));
    }

    #[test]
    fn test_override_of_unknown_clause_is_an_error() {
        let over = ClauseOverride {
            clause_reference: "does_not_exist".to_string(),
            verdict: ClauseVerdict::Pass,
            reason: String::new(),
            overridden_by: "adjuster-7".to_string(),
        };
        let result = decide(&passing_screening(), None, &[], &[over]);
        assert!(matches!(result, Err(DecisionError::UnknownClause(_))));
    }

    #[test]
    fn test_assessment_checks_are_inferred() {
        let assessment = AssessmentResult::new(Recommendation::Approve)
            .with_check("policy_validity", CheckResult::Fail)
            .with_check("damage_plausibility", CheckResult::Pass);
        let decision = decide(&passing_screening(), Some(&assessment), &[], &[]).unwrap();

        // Screening wins for the same reference
        assert_eq!(decision.clause_evaluations[0].tier, EvaluabilityTier::Deterministic);
        let inferred = decision
            .clause_evaluations
            .iter()
            .find(|c| c.clause_reference == "damage_plausibility")
            .unwrap();
        assert_eq!(inferred.tier, EvaluabilityTier::Inferred);
        assert_eq!(decision.verdict, ClaimVerdict::Approve);
    }

    #[test]
    fn test_settings_deserialization() {
        let engine = ReferenceDecisionEngine::from_settings(&json!({ "hard_checks": ["x"] })).unwrap();
        assert_eq!(engine.config.hard_checks, vec!["x".to_string()]);
        assert!(ReferenceDecisionEngine::from_settings(&json!({ "hard_checks": 3 })).is_err());
        assert!(ReferenceDecisionEngine::from_settings(&Value::Null).is_ok());
    }
}
