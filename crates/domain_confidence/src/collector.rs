//! Signal collection
//!
//! Derives normalized signals from whatever upstream stages produced output.
//! A stage that did not run contributes no signals; the scorer then drops
//! the components it would have fed.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use domain_claims::{
    AssessmentResult, ClaimFacts, ClaimVerdict, DecisionDossier, Recommendation, ScreeningResult,
};
use domain_coverage::{CoverageAnalysisResult, CoverageStatus, MatchMethod};

use crate::signal::{names, Signal, SourceStage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalCollectorConfig {
    /// Facts every claim is expected to carry
    pub required_facts: Vec<String>,
    /// Payouts above this amount are discounted by `threshold / payout`
    pub materiality_threshold: Decimal,
    /// Claims with more line items are discounted by `threshold / count`
    pub complexity_threshold: usize,
    /// Lower bound for the materiality and complexity discounts
    pub discount_floor: f64,
    /// Coverage reliability multiplier when nothing on the claim is covered
    pub zero_coverage_factor: f64,
}

impl Default for SignalCollectorConfig {
    fn default() -> Self {
        Self {
            required_facts: ["policy_number", "vin", "mileage", "repair_date", "invoice_total"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            materiality_threshold: dec!(5000),
            complexity_threshold: 12,
            discount_floor: 0.5,
            zero_coverage_factor: 0.5,
        }
    }
}

/// Stage outputs available for one claim run
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectorInput<'a> {
    pub facts: Option<&'a ClaimFacts>,
    pub screening: Option<&'a ScreeningResult>,
    pub coverage: Option<&'a CoverageAnalysisResult>,
    pub assessment: Option<&'a AssessmentResult>,
    pub dossier: Option<&'a DecisionDossier>,
}

#[derive(Debug, Clone, Default)]
pub struct SignalCollector {
    config: SignalCollectorConfig,
}

impl SignalCollector {
    pub fn new(config: SignalCollectorConfig) -> Self {
        Self { config }
    }

    pub fn collect(&self, input: &CollectorInput<'_>) -> Vec<Signal> {
        let mut signals = Vec::new();
        if let Some(facts) = input.facts {
            self.extraction_signals(facts, &mut signals);
        }
        if let Some(screening) = input.screening {
            screening_signals(screening, &mut signals);
        }
        if let Some(coverage) = input.coverage {
            self.coverage_signals(coverage, &mut signals);
        }
        if let Some(assessment) = input.assessment {
            assessment_signals(assessment, input.screening, &mut signals);
        }
        if let Some(dossier) = input.dossier {
            self.decision_signals(dossier, input.assessment, &mut signals);
        }

        tracing::debug!(signals = signals.len(), "Signals collected");
        signals
    }

    fn extraction_signals(&self, facts: &ClaimFacts, signals: &mut Vec<Signal>) {
        if let Some(mean) = facts.mean_confidence() {
            signals.push(Signal::ratio(names::EXTRACTION_CONFIDENCE, mean, SourceStage::Extraction));
        }
        if !facts.is_empty() {
            let present = facts.iter().filter(|f| f.is_present()).count();
            signals.push(Signal::new(
                names::FACT_COVERAGE,
                present as f64,
                present as f64 / facts.len() as f64,
                SourceStage::Extraction,
            ));
        }
        signals.push(Signal::ratio(
            names::REQUIRED_FACT_COMPLETENESS,
            facts.completeness(&self.config.required_facts),
            SourceStage::Extraction,
        ));
    }

    fn coverage_signals(&self, coverage: &CoverageAnalysisResult, signals: &mut Vec<Signal>) {
        let items = &coverage.line_items;
        let summary = &coverage.summary;

        signals.push(Signal::new(
            names::INVOICE_TOTAL_CONSISTENCY,
            coverage.warnings.len() as f64,
            if coverage.warnings.is_empty() { 1.0 } else { 0.0 },
            SourceStage::Coverage,
        ));

        if !items.is_empty() {
            let count = items.len() as f64;
            let mean = items.iter().map(|i| i.match_confidence).sum::<f64>() / count;
            signals.push(Signal::ratio(names::COVERAGE_MEAN_CONFIDENCE, mean, SourceStage::Coverage));

            let deterministic = items
                .iter()
                .filter(|i| i.match_method != MatchMethod::Llm && i.status() != CoverageStatus::ReviewNeeded)
                .count();
            signals.push(Signal::new(
                names::DETERMINISTIC_MATCH_SHARE,
                deterministic as f64,
                deterministic as f64 / count,
                SourceStage::Coverage,
            ));

            let threshold = self.config.complexity_threshold.max(1) as f64;
            let complexity = if count <= threshold {
                1.0
            } else {
                (threshold / count).max(self.config.discount_floor)
            };
            signals.push(Signal::new(names::LINE_ITEM_COMPLEXITY, count, complexity, SourceStage::Coverage));
        }

        let nothing_covered = summary.total_claimed.is_positive() && summary.total_covered.is_zero();
        signals.push(Signal::new(
            names::ZERO_COVERAGE_PENALTY,
            to_f64(summary.total_covered.amount()),
            if nothing_covered { self.config.zero_coverage_factor } else { 1.0 },
            SourceStage::Coverage,
        ));
    }

    fn decision_signals(
        &self,
        dossier: &DecisionDossier,
        assessment: Option<&AssessmentResult>,
        signals: &mut Vec<Signal>,
    ) {
        if let Some(rate) = dossier.clause_pass_rate() {
            signals.push(Signal::ratio(names::CLAUSE_PASS_RATE, rate, SourceStage::Decision));
        }

        if let Some(assessment) = assessment {
            let agrees = matches!(
                (assessment.recommendation, dossier.claim_verdict),
                (Recommendation::Approve, ClaimVerdict::Approve)
                    | (Recommendation::Deny, ClaimVerdict::Deny)
                    | (Recommendation::Refer, ClaimVerdict::Refer)
            );
            signals.push(Signal::ratio(
                names::RECOMMENDATION_AGREEMENT,
                if agrees { 1.0 } else { 0.0 },
                SourceStage::Decision,
            ));
        }

        let payout = dossier.financial_summary.final_payout.amount();
        let threshold = self.config.materiality_threshold;
        let materiality = if payout <= threshold || payout.is_zero() {
            1.0
        } else {
            to_f64(threshold / payout).max(self.config.discount_floor)
        };
        signals.push(Signal::new(
            names::PAYOUT_MATERIALITY,
            to_f64(payout),
            materiality,
            SourceStage::Decision,
        ));
    }
}

fn screening_signals(screening: &ScreeningResult, signals: &mut Vec<Signal>) {
    if screening.checks.is_empty() {
        return;
    }
    let total = screening.checks.len() as f64;
    let decided = total - screening.inconclusive_count() as f64;
    signals.push(Signal::new(
        names::SCREENING_DECIDED_RATIO,
        decided,
        decided / total,
        SourceStage::Screening,
    ));
    if let Some(rate) = screening.pass_rate() {
        signals.push(Signal::ratio(names::SCREENING_PASS_RATE, rate, SourceStage::Screening));
    }
}

fn assessment_signals(
    assessment: &AssessmentResult,
    screening: Option<&ScreeningResult>,
    signals: &mut Vec<Signal>,
) {
    if let Some(confidence) = assessment.confidence {
        signals.push(Signal::ratio(names::ASSESSMENT_CONFIDENCE, confidence, SourceStage::Assessment));
    }

    let precalculated = screening.and_then(|s| s.payout.as_ref()).map(|p| p.final_payout);
    if let (Some(assessed), Some(calculated)) = (assessment.payout, precalculated) {
        let larger = assessed.abs().max(calculated.abs());
        let agreement = if larger.is_zero() {
            1.0
        } else {
            1.0 - to_f64((assessed - calculated).abs() / larger)
        };
        signals.push(Signal::new(
            names::PAYOUT_AGREEMENT,
            to_f64(assessed - calculated),
            agreement,
            SourceStage::Assessment,
        ));
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
