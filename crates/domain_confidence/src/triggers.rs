//! Routing triggers
//!
//! Conditions that push a claim toward human review regardless of the
//! composite score. WARNING triggers cap the tier at YELLOW, CRITICAL ones
//! force RED.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use domain_claims::{DecisionDossier, FiredTrigger, TriggerSeverity};
use domain_coverage::{CoverageAnalysisResult, MatchMethod};

use crate::scorer::ConfidenceSummary;

pub const MISSING_STAGES: &str = "missing_stages";
pub const REVIEW_NEEDED_ITEMS: &str = "review_needed_items";
pub const GENERATIVE_HEAVY_COVERAGE: &str = "generative_heavy_coverage";
pub const LOW_COMPONENT_SCORE: &str = "low_component_score";
pub const PAYOUT_COVERAGE_MISMATCH: &str = "payout_coverage_mismatch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Missing stages at which `missing_stages` becomes CRITICAL
    pub critical_missing_stages: usize,
    /// Share of generatively matched items above which coverage is "generative heavy"
    pub generative_share: f64,
    /// Active component score below which `low_component_score` fires
    pub low_component_score: f64,
    /// Slack allowed between payout and covered total
    pub payout_tolerance: Decimal,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            critical_missing_stages: 2,
            generative_share: 0.5,
            low_component_score: 0.40,
            payout_tolerance: dec!(0.01),
        }
    }
}

/// Evidence the triggers look at
#[derive(Debug, Clone, Copy)]
pub struct TriggerInput<'a> {
    pub summary: &'a ConfidenceSummary,
    pub coverage: Option<&'a CoverageAnalysisResult>,
    pub dossier: Option<&'a DecisionDossier>,
}

pub fn evaluate_triggers(input: &TriggerInput<'_>, config: &TriggerConfig) -> Vec<FiredTrigger> {
    let mut fired = Vec::new();
    let summary = input.summary;

    if !summary.stages_missing.is_empty() {
        let missing: Vec<&str> = summary.stages_missing.iter().map(|s| s.as_str()).collect();
        let severity = if missing.len() >= config.critical_missing_stages {
            TriggerSeverity::Critical
        } else {
            TriggerSeverity::Warning
        };
        fired.push(FiredTrigger {
            name: MISSING_STAGES.to_string(),
            severity,
            detail: format!("No evidence from: {}", missing.join(", ")),
        });
    }

    if let Some(coverage) = input.coverage {
        let review = coverage.summary.items_review_needed;
        if review > 0 {
            fired.push(FiredTrigger {
                name: REVIEW_NEEDED_ITEMS.to_string(),
                severity: TriggerSeverity::Warning,
                detail: format!("{} line item(s) need review", review),
            });
        }

        let total = coverage.line_items.len();
        if total > 0 {
            let generative = coverage
                .line_items
                .iter()
                .filter(|i| i.match_method == MatchMethod::Llm)
                .count();
            let share = generative as f64 / total as f64;
            if share > config.generative_share {
                fired.push(FiredTrigger {
                    name: GENERATIVE_HEAVY_COVERAGE.to_string(),
                    severity: TriggerSeverity::Warning,
                    detail: format!("{} of {} items matched generatively", generative, total),
                });
            }
        }
    }

    let low: Vec<String> = summary
        .component_scores
        .iter()
        .filter(|c| c.is_active() && c.score < config.low_component_score)
        .map(|c| format!("{}={:.2}", c.component, c.score))
        .collect();
    if !low.is_empty() {
        fired.push(FiredTrigger {
            name: LOW_COMPONENT_SCORE.to_string(),
            severity: TriggerSeverity::Critical,
            detail: low.join(", "),
        });
    }

    if let (Some(coverage), Some(dossier)) = (input.coverage, input.dossier) {
        let payout = dossier.financial_summary.final_payout.amount();
        let covered = coverage.summary.total_covered.amount();
        let exceeds = covered
            .checked_add(config.payout_tolerance)
            .is_some_and(|limit| payout > limit);
        if exceeds {
            fired.push(FiredTrigger {
                name: PAYOUT_COVERAGE_MISMATCH.to_string(),
                severity: TriggerSeverity::Critical,
                detail: format!("Payout {} exceeds covered total {}", payout, covered),
            });
        }
    }

    for trigger in &fired {
        tracing::debug!(
            claim_id = %summary.claim_id,
            trigger = %trigger.name,
            severity = ?trigger.severity,
            "Routing trigger fired"
        );
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::ConfidenceScorer;
    use crate::signal::{Signal, SourceStage};
    use core_kernel::ClaimId;

    fn summary(signals: &[Signal]) -> ConfidenceSummary {
        ConfidenceScorer::default().compute(&ClaimId::new("1").unwrap(), signals, None)
    }

    fn one_per_stage(value: f64) -> Vec<Signal> {
        vec![
            Signal::ratio("extraction_confidence", value, SourceStage::Extraction),
            Signal::ratio("screening_decided_ratio", value, SourceStage::Screening),
            Signal::ratio("coverage_mean_confidence", value, SourceStage::Coverage),
            Signal::ratio("assessment_confidence", value, SourceStage::Assessment),
            Signal::ratio("recommendation_agreement", value, SourceStage::Decision),
        ]
    }

    fn names(fired: &[FiredTrigger]) -> Vec<&str> {
        fired.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_complete_healthy_run_fires_nothing() {
        let summary = summary(&one_per_stage(0.9));
        let fired = evaluate_triggers(
            &TriggerInput {
                summary: &summary,
                coverage: None,
                dossier: None,
            },
            &TriggerConfig::default(),
        );
        assert!(fired.is_empty());
    }

    #[test]
    fn test_missing_stage_severity() {
        let mut signals = one_per_stage(0.9);
        signals.pop();
        let one_missing = summary(&signals);
        let fired = evaluate_triggers(
            &TriggerInput {
                summary: &one_missing,
                coverage: None,
                dossier: None,
            },
            &TriggerConfig::default(),
        );
        assert_eq!(names(&fired), vec![MISSING_STAGES]);
        assert_eq!(fired[0].severity, TriggerSeverity::Warning);

        signals.pop();
        let two_missing = summary(&signals);
        let fired = evaluate_triggers(
            &TriggerInput {
                summary: &two_missing,
                coverage: None,
                dossier: None,
            },
            &TriggerConfig::default(),
        );
        assert_eq!(fired[0].severity, TriggerSeverity::Critical);
    }

    #[test]
    fn test_low_component_is_critical() {
        let mut signals = one_per_stage(0.9);
        signals[0] = Signal::ratio("extraction_confidence", 0.2, SourceStage::Extraction);
        let summary = summary(&signals);
        let fired = evaluate_triggers(
            &TriggerInput {
                summary: &summary,
                coverage: None,
                dossier: None,
            },
            &TriggerConfig::default(),
        );
        assert_eq!(names(&fired), vec![LOW_COMPONENT_SCORE]);
        assert_eq!(fired[0].severity, TriggerSeverity::Critical);
        assert!(fired[0].detail.contains("document_quality"));
    }
}
