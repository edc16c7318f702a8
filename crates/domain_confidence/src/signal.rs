//! Confidence signals
//!
//! A signal is one normalized observation about a claim run, tagged with
//! the stage that produced the evidence. Names are stable strings so the
//! scorer configuration can refer to them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage a signal is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStage {
    Extraction,
    Screening,
    Coverage,
    Assessment,
    Decision,
}

impl SourceStage {
    pub const ALL: [SourceStage; 5] = [
        SourceStage::Extraction,
        SourceStage::Screening,
        SourceStage::Coverage,
        SourceStage::Assessment,
        SourceStage::Decision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStage::Extraction => "extraction",
            SourceStage::Screening => "screening",
            SourceStage::Coverage => "coverage",
            SourceStage::Assessment => "assessment",
            SourceStage::Decision => "decision",
        }
    }
}

impl fmt::Display for SourceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five scored components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentName {
    DocumentQuality,
    DataCompleteness,
    Consistency,
    CoverageReliability,
    DecisionClarity,
}

impl ComponentName {
    pub const ALL: [ComponentName; 5] = [
        ComponentName::DocumentQuality,
        ComponentName::DataCompleteness,
        ComponentName::Consistency,
        ComponentName::CoverageReliability,
        ComponentName::DecisionClarity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentName::DocumentQuality => "document_quality",
            ComponentName::DataCompleteness => "data_completeness",
            ComponentName::Consistency => "consistency",
            ComponentName::CoverageReliability => "coverage_reliability",
            ComponentName::DecisionClarity => "decision_clarity",
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in signal names
pub mod names {
    pub const EXTRACTION_CONFIDENCE: &str = "extraction_confidence";
    pub const FACT_COVERAGE: &str = "fact_coverage";
    pub const REQUIRED_FACT_COMPLETENESS: &str = "required_fact_completeness";
    pub const SCREENING_DECIDED_RATIO: &str = "screening_decided_ratio";
    pub const INVOICE_TOTAL_CONSISTENCY: &str = "invoice_total_consistency";
    pub const PAYOUT_AGREEMENT: &str = "payout_agreement";
    pub const RECOMMENDATION_AGREEMENT: &str = "recommendation_agreement";
    pub const COVERAGE_MEAN_CONFIDENCE: &str = "coverage_mean_confidence";
    pub const DETERMINISTIC_MATCH_SHARE: &str = "deterministic_match_share";
    pub const ZERO_COVERAGE_PENALTY: &str = "zero_coverage_penalty";
    pub const PAYOUT_MATERIALITY: &str = "payout_materiality";
    pub const LINE_ITEM_COMPLEXITY: &str = "line_item_complexity";
    pub const SCREENING_PASS_RATE: &str = "screening_pass_rate";
    pub const CLAUSE_PASS_RATE: &str = "clause_pass_rate";
    pub const ASSESSMENT_CONFIDENCE: &str = "assessment_confidence";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_name: String,
    /// Value as observed, in its own unit
    pub raw_value: f64,
    /// Value mapped to [0, 1], higher meaning more reliable
    pub normalized_value: f64,
    pub source_stage: SourceStage,
}

impl Signal {
    /// Creates a signal; the normalized value is clamped to [0, 1] and NaN becomes 0
    pub fn new(name: impl Into<String>, raw_value: f64, normalized_value: f64, source_stage: SourceStage) -> Self {
        Self {
            signal_name: name.into(),
            raw_value,
            normalized_value: unit(normalized_value),
            source_stage,
        }
    }

    /// Signal whose raw value is already in [0, 1]
    pub fn ratio(name: impl Into<String>, value: f64, source_stage: SourceStage) -> Self {
        Self::new(name, value, value, source_stage)
    }

    /// Inverted copy (value becomes 1 - value)
    pub fn flipped(&self) -> Self {
        Self {
            normalized_value: 1.0 - self.normalized_value,
            ..self.clone()
        }
    }
}

pub(crate) fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_clamps() {
        assert_eq!(Signal::new("x", 3.0, 1.7, SourceStage::Coverage).normalized_value, 1.0);
        assert_eq!(Signal::new("x", -1.0, -0.2, SourceStage::Coverage).normalized_value, 0.0);
        assert_eq!(Signal::new("x", f64::NAN, f64::NAN, SourceStage::Coverage).normalized_value, 0.0);
    }

    #[test]
    fn test_flip() {
        let signal = Signal::ratio(names::SCREENING_PASS_RATE, 0.3, SourceStage::Screening);
        let flipped = signal.flipped();
        assert!((flipped.normalized_value - 0.7).abs() < 1e-9);
        assert_eq!(flipped.raw_value, 0.3);
    }

    #[test]
    fn test_names_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ComponentName::CoverageReliability).unwrap(),
            "\"coverage_reliability\""
        );
        assert_eq!(ComponentName::DecisionClarity.to_string(), "decision_clarity");
    }
}
