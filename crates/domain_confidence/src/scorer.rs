//! Composite confidence scorer
//!
//! Five components are scored as the mean of their member signals. Signals
//! in the multiplier set are not averaged: they scale their component score
//! directly, so a single bad indicator can pull the component down on its
//! own. Components without any signal get weight zero and the remaining
//! weights are renormalized to sum to one.
//!
//! For a DENY verdict the polarity-flip signals are inverted and the DENY
//! weight profile is used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use core_kernel::ClaimId;
use domain_claims::ClaimVerdict;

use crate::error::ConfidenceError;
use crate::signal::{names, unit, ComponentName, Signal, SourceStage};

/// Weight per component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub document_quality: f64,
    pub data_completeness: f64,
    pub consistency: f64,
    pub coverage_reliability: f64,
    pub decision_clarity: f64,
}

impl ComponentWeights {
    pub const fn new(
        document_quality: f64,
        data_completeness: f64,
        consistency: f64,
        coverage_reliability: f64,
        decision_clarity: f64,
    ) -> Self {
        Self {
            document_quality,
            data_completeness,
            consistency,
            coverage_reliability,
            decision_clarity,
        }
    }

    pub fn get(&self, component: ComponentName) -> f64 {
        match component {
            ComponentName::DocumentQuality => self.document_quality,
            ComponentName::DataCompleteness => self.data_completeness,
            ComponentName::Consistency => self.consistency,
            ComponentName::CoverageReliability => self.coverage_reliability,
            ComponentName::DecisionClarity => self.decision_clarity,
        }
    }

    pub fn total(&self) -> f64 {
        ComponentName::ALL.iter().map(|c| self.get(*c)).sum()
    }

    fn validate(&self, profile: &str) -> Result<(), ConfidenceError> {
        for component in ComponentName::ALL {
            let weight = self.get(component);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfidenceError::invalid_config(format!(
                    "{} weight for {} must be a non-negative number, got {}",
                    profile, component, weight
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfidenceError::invalid_config(format!(
                "{} weights must sum to a positive value",
                profile
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub weights: ComponentWeights,
    /// Profile used when the verdict is DENY
    pub deny_weights: ComponentWeights,
    /// Component each signal feeds
    pub signal_components: BTreeMap<String, ComponentName>,
    /// Signals inverted under a DENY verdict
    pub polarity_flip: BTreeSet<String>,
    /// Signals that scale their component score instead of being averaged
    pub multipliers: BTreeSet<String>,
    pub high_threshold: f64,
    pub moderate_threshold: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        use ComponentName::*;
        let signal_components = [
            (names::EXTRACTION_CONFIDENCE, DocumentQuality),
            (names::FACT_COVERAGE, DocumentQuality),
            (names::REQUIRED_FACT_COMPLETENESS, DataCompleteness),
            (names::SCREENING_DECIDED_RATIO, DataCompleteness),
            (names::INVOICE_TOTAL_CONSISTENCY, Consistency),
            (names::PAYOUT_AGREEMENT, Consistency),
            (names::RECOMMENDATION_AGREEMENT, Consistency),
            (names::COVERAGE_MEAN_CONFIDENCE, CoverageReliability),
            (names::DETERMINISTIC_MATCH_SHARE, CoverageReliability),
            (names::ZERO_COVERAGE_PENALTY, CoverageReliability),
            (names::PAYOUT_MATERIALITY, CoverageReliability),
            (names::LINE_ITEM_COMPLEXITY, CoverageReliability),
            (names::SCREENING_PASS_RATE, DecisionClarity),
            (names::CLAUSE_PASS_RATE, DecisionClarity),
            (names::ASSESSMENT_CONFIDENCE, DecisionClarity),
        ]
        .into_iter()
        .map(|(name, component)| (name.to_string(), component))
        .collect();

        Self {
            weights: ComponentWeights::new(0.15, 0.15, 0.25, 0.25, 0.20),
            deny_weights: ComponentWeights::new(0.10, 0.10, 0.20, 0.30, 0.30),
            signal_components,
            polarity_flip: [names::SCREENING_PASS_RATE, names::CLAUSE_PASS_RATE]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            multipliers: [
                names::ZERO_COVERAGE_PENALTY,
                names::PAYOUT_MATERIALITY,
                names::LINE_ITEM_COMPLEXITY,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            high_threshold: 0.80,
            moderate_threshold: 0.55,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceBand {
    Low,
    Moderate,
    High,
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceBand::Low => "LOW",
            ConfidenceBand::Moderate => "MODERATE",
            ConfidenceBand::High => "HIGH",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub component: ComponentName,
    /// Effective weight after renormalization
    pub weight: f64,
    pub score: f64,
    pub signals_used: Vec<String>,
}

impl ComponentScore {
    pub fn is_active(&self) -> bool {
        !self.signals_used.is_empty()
    }
}

/// Scored reliability of one claim run; replaced on every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub claim_id: ClaimId,
    pub verdict: Option<ClaimVerdict>,
    pub composite_score: f64,
    pub band: ConfidenceBand,
    pub component_scores: Vec<ComponentScore>,
    pub stages_available: Vec<SourceStage>,
    pub stages_missing: Vec<SourceStage>,
    pub flags: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl ConfidenceSummary {
    pub fn component(&self, component: ComponentName) -> Option<&ComponentScore> {
        self.component_scores.iter().find(|c| c.component == component)
    }
}

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ScorerConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScorerConfig) -> Result<Self, ConfidenceError> {
        config.weights.validate("default")?;
        config.deny_weights.validate("deny")?;
        let bounded = |t: f64| (0.0..=1.0).contains(&t);
        if !(bounded(config.moderate_threshold)
            && bounded(config.high_threshold)
            && config.moderate_threshold <= config.high_threshold)
        {
            return Err(ConfidenceError::invalid_config(format!(
                "band thresholds must satisfy 0 <= moderate ({}) <= high ({}) <= 1",
                config.moderate_threshold, config.high_threshold
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Applies the verdict-dependent polarity flip
    pub fn adjust_signals(&self, signals: &[Signal], verdict: Option<ClaimVerdict>) -> Vec<Signal> {
        let deny = verdict == Some(ClaimVerdict::Deny);
        signals
            .iter()
            .map(|s| {
                if deny && self.config.polarity_flip.contains(&s.signal_name) {
                    s.flipped()
                } else {
                    s.clone()
                }
            })
            .collect()
    }

    pub fn band(&self, score: f64) -> ConfidenceBand {
        if score >= self.config.high_threshold {
            ConfidenceBand::High
        } else if score >= self.config.moderate_threshold {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn compute(
        &self,
        claim_id: &ClaimId,
        signals: &[Signal],
        verdict: Option<ClaimVerdict>,
    ) -> ConfidenceSummary {
        let mut flags = Vec::new();
        let deny = verdict == Some(ClaimVerdict::Deny);
        if deny {
            flags.push("deny_weight_profile".to_string());
        }
        let signals = self.adjust_signals(signals, verdict);

        let mut averaged: BTreeMap<ComponentName, Vec<&Signal>> = BTreeMap::new();
        let mut multiplied: BTreeMap<ComponentName, Vec<&Signal>> = BTreeMap::new();
        for signal in &signals {
            let Some(component) = self.config.signal_components.get(&signal.signal_name) else {
                tracing::debug!(signal = %signal.signal_name, "Signal not mapped to a component");
                flags.push(format!("unmapped_signal:{}", signal.signal_name));
                continue;
            };
            if self.config.multipliers.contains(&signal.signal_name) {
                multiplied.entry(*component).or_default().push(signal);
            } else {
                averaged.entry(*component).or_default().push(signal);
            }
        }

        let profile = if deny { self.config.deny_weights } else { self.config.weights };
        let mut components: Vec<ComponentScore> = ComponentName::ALL
            .iter()
            .map(|&component| {
                let members = averaged.get(&component).map(Vec::as_slice).unwrap_or_default();
                let factors = multiplied.get(&component).map(Vec::as_slice).unwrap_or_default();

                let base = if members.is_empty() {
                    1.0
                } else {
                    members.iter().map(|s| s.normalized_value).sum::<f64>() / members.len() as f64
                };
                let mut score = base;
                for factor in factors {
                    score *= factor.normalized_value;
                    if factor.normalized_value < 1.0 {
                        flags.push(format!("multiplier:{}={:.2}", factor.signal_name, factor.normalized_value));
                    }
                }

                let signals_used: Vec<String> = members
                    .iter()
                    .chain(factors.iter())
                    .map(|s| s.signal_name.clone())
                    .collect();
                ComponentScore {
                    component,
                    weight: profile.get(component),
                    score: if signals_used.is_empty() { 0.0 } else { unit(score) },
                    signals_used,
                }
            })
            .collect();

        let active_weight: f64 = components
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.weight)
            .sum();
        for component in components.iter_mut() {
            if !component.is_active() {
                flags.push(format!("component_missing:{}", component.component));
                component.weight = 0.0;
            } else if active_weight > 0.0 {
                component.weight /= active_weight;
            } else {
                component.weight = 0.0;
            }
        }
        if components.iter().any(|c| !c.is_active()) && active_weight > 0.0 {
            flags.push("weights_redistributed".to_string());
        }

        let composite_score = unit(components.iter().map(|c| c.weight * c.score).sum());
        let band = self.band(composite_score);

        let available: BTreeSet<SourceStage> = signals.iter().map(|s| s.source_stage).collect();
        let stages_available: Vec<SourceStage> = available.iter().copied().collect();
        let stages_missing: Vec<SourceStage> = SourceStage::ALL
            .iter()
            .copied()
            .filter(|s| !available.contains(s))
            .collect();

        tracing::info!(
            claim_id = %claim_id,
            stage = "confidence",
            score = composite_score,
            band = %band,
            signals = signals.len(),
            stages_missing = stages_missing.len(),
            "Confidence computed"
        );

        ConfidenceSummary {
            claim_id: claim_id.clone(),
            verdict,
            composite_score,
            band,
            component_scores: components,
            stages_available,
            stages_missing,
            flags,
            computed_at: Utc::now(),
        }
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self {
            config: ScorerConfig::default(),
        }
    }
}
