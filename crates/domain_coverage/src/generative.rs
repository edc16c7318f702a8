//! Generative Matcher
//!
//! Last-resort classifier for items neither the rules nor the vocabulary
//! resolved. The model's verdict is filtered through two floors: a higher
//! one for "covered" answers and a lower one for "not covered" answers.
//! Anything below its floor goes to human review.
//!
//! The matcher never returns an error. Call failures, timeouts and
//! unparseable responses all produce REVIEW_NEEDED at confidence 0.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use core_kernel::PortError;

use crate::error::CoverageError;
use crate::line_item::{
    clamp_confidence, CoverageStatus, ExclusionReason, LineItem, LineItemCoverage, MatchMethod,
};
use crate::model_port::{GenerativeModelPort, GenerativeRequest};
use crate::prompt::{classification_request, parse_item_verdict};
use crate::scope::{ClaimContext, CoverageScope};
use crate::trace::{TraceAction, TraceEntry, TraceStage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerativeMatcherConfig {
    /// Minimum confidence to accept a "covered" verdict
    pub approve_threshold: f64,
    /// Minimum confidence to accept a "not covered" verdict
    pub deny_threshold: f64,
    pub vague_confidence_cap: f64,
    /// Descriptions this short (in characters, trimmed) count as vague
    pub vague_max_length: usize,
    pub vague_stoplist: Vec<String>,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerativeMatcherConfig {
    fn default() -> Self {
        Self {
            approve_threshold: 0.60,
            deny_threshold: 0.40,
            vague_confidence_cap: 0.50,
            vague_max_length: 4,
            vague_stoplist: [
                "part", "parts", "teil", "teile", "pièce", "piece", "pièces", "misc", "item",
                "items", "artikel", "article", "material", "matériel", "other", "sonstiges",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeout_ms: 30_000,
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

pub struct GenerativeMatcher {
    model: Arc<dyn GenerativeModelPort>,
    config: GenerativeMatcherConfig,
}

impl std::fmt::Debug for GenerativeMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeMatcher")
            .field("model", &self.model.model_name())
            .field("config", &self.config)
            .finish()
    }
}

impl GenerativeMatcher {
    pub fn new(
        model: Arc<dyn GenerativeModelPort>,
        mut config: GenerativeMatcherConfig,
    ) -> Result<Self, CoverageError> {
        for (name, value) in [
            ("approve_threshold", config.approve_threshold),
            ("deny_threshold", config.deny_threshold),
            ("vague_confidence_cap", config.vague_confidence_cap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoverageError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if config.timeout_ms == 0 {
            return Err(CoverageError::InvalidConfig("timeout_ms must be positive".into()));
        }
        config.vague_stoplist = config
            .vague_stoplist
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();
        Ok(Self { model, config })
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn config(&self) -> &GenerativeMatcherConfig {
        &self.config
    }

    /// Sends `request` with the configured hard timeout
    pub async fn complete(&self, request: &GenerativeRequest) -> Result<String, PortError> {
        let limit = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(limit, self.model.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(PortError::timeout(
                format!("{:?} via {}", request.purpose, self.model.model_name()),
                limit,
            )),
        }
    }

    /// Classifies one item; always returns a result
    pub async fn match_item(
        &self,
        item: &LineItem,
        scope: &CoverageScope,
        context: &ClaimContext,
    ) -> LineItemCoverage {
        let request = classification_request(
            item,
            scope,
            context,
            self.config.temperature,
            self.config.max_tokens,
        );

        let verdict = match self.complete(&request).await {
            Ok(text) => parse_item_verdict(&text),
            Err(e) => Err(CoverageError::Port(e)),
        };

        match verdict {
            Ok(verdict) => self.apply_verdict(item, verdict),
            Err(e) => {
                tracing::warn!(
                    description = %item.description,
                    error = %e,
                    "Generative matcher failed, item routed to review"
                );
                LineItemCoverage::classify(
                    item.clone(),
                    CoverageStatus::ReviewNeeded,
                    MatchMethod::Llm,
                    0.0,
                    format!("Generative matcher failed: {}", e),
                )
                .with_trace(
                    TraceEntry::new(
                        TraceStage::GenerativeMatcher,
                        TraceAction::Failed,
                        CoverageStatus::ReviewNeeded,
                        0.0,
                    )
                    .with_detail(json!({ "error": e.to_string(), "model": self.model_name() })),
                )
            }
        }
    }

    fn apply_verdict(&self, item: &LineItem, verdict: crate::prompt::ItemVerdict) -> LineItemCoverage {
        let raw_confidence = clamp_confidence(verdict.confidence);
        let mut confidence = raw_confidence;
        let mut capped = None;

        if self.is_vague(&item.description) && confidence > self.config.vague_confidence_cap {
            confidence = self.config.vague_confidence_cap;
            capped = Some(
                TraceEntry::new(
                    TraceStage::GenerativeMatcher,
                    TraceAction::Capped,
                    CoverageStatus::ReviewNeeded,
                    confidence,
                )
                .with_detail(json!({
                    "raw_confidence": raw_confidence,
                    "cap": self.config.vague_confidence_cap,
                    "reason": "vague_description",
                })),
            );
        }

        let (status, exclusion) = if verdict.is_covered {
            if confidence >= self.config.approve_threshold {
                (CoverageStatus::Covered, None)
            } else {
                (CoverageStatus::ReviewNeeded, None)
            }
        } else if confidence >= self.config.deny_threshold {
            (CoverageStatus::NotCovered, Some(ExclusionReason::ModelNotCovered))
        } else {
            (CoverageStatus::ReviewNeeded, None)
        };

        tracing::debug!(
            description = %item.description,
            is_covered = verdict.is_covered,
            confidence,
            status = %status,
            "Generative verdict applied"
        );

        let matched = TraceEntry::new(TraceStage::GenerativeMatcher, TraceAction::Matched, status, confidence)
            .with_detail(json!({
                "model": self.model_name(),
                "model_says_covered": verdict.is_covered,
                "raw_confidence": raw_confidence,
            }));

        let mut coverage = LineItemCoverage::classify(
            item.clone(),
            status,
            MatchMethod::Llm,
            confidence,
            verdict.reasoning,
        )
        .with_category(verdict.category)
        .with_component(verdict.matched_component);
        if let Some(entry) = capped {
            coverage.record(entry);
        }
        coverage.record(matched);
        coverage.exclusion_reason = exclusion;
        coverage
    }

    /// True for very short or stoplisted descriptions
    pub fn is_vague(&self, description: &str) -> bool {
        let trimmed = description.trim();
        if trimmed.chars().count() <= self.config.vague_max_length {
            return true;
        }
        let lowered = trimmed.to_lowercase();
        self.config.vague_stoplist.iter().any(|s| *s == lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::ItemType;
    use crate::model_port::mock::MockGenerativeModel;
    use rust_decimal_macros::dec;

    fn matcher(model: MockGenerativeModel) -> GenerativeMatcher {
        GenerativeMatcher::new(Arc::new(model), GenerativeMatcherConfig::default()).unwrap()
    }

    fn verdict(is_covered: bool, confidence: f64) -> String {
        format!(
            "```json\n{{\"is_covered\": {}, \"category\": \"engine\", \"matched_component\": \"valve\", \"confidence\": {}, \"reasoning\": \"r\"}}\n```",
            is_covered, confidence
        )
    }

    async fn classify(response: String, description: &str) -> LineItemCoverage {
        let model = MockGenerativeModel::new().with_responses([response]);
        let item = LineItem::new(description, ItemType::Parts, dec!(120));
        matcher(model)
            .match_item(&item, &CoverageScope::default(), &ClaimContext::default())
            .await
    }

    #[tokio::test]
    async fn test_asymmetric_thresholds() {
        let covered = classify(verdict(true, 0.65), "Einlassventil").await;
        assert_eq!(covered.status(), CoverageStatus::Covered);

        let weak_covered = classify(verdict(true, 0.55), "Einlassventil").await;
        assert_eq!(weak_covered.status(), CoverageStatus::ReviewNeeded);

        let denied = classify(verdict(false, 0.45), "Einlassventil").await;
        assert_eq!(denied.status(), CoverageStatus::NotCovered);
        assert_eq!(denied.exclusion_reason, Some(ExclusionReason::ModelNotCovered));

        let weak_denied = classify(verdict(false, 0.35), "Einlassventil").await;
        assert_eq!(weak_denied.status(), CoverageStatus::ReviewNeeded);
    }

    #[tokio::test]
    async fn test_vague_description_capped() {
        let result = classify(verdict(true, 0.95), "Teil").await;
        assert!(result.match_confidence <= 0.50);
        assert_eq!(result.status(), CoverageStatus::ReviewNeeded);
        assert_eq!(result.trace().entries()[0].action, TraceAction::Capped);

        let stoplisted = classify(verdict(true, 0.95), "  Material ").await;
        assert!(stoplisted.match_confidence <= 0.50);
    }

    #[tokio::test]
    async fn test_call_failure_yields_review() {
        let model = MockGenerativeModel::new();
        model.push_failure("upstream 503").await;
        let item = LineItem::new("Einlassventil", ItemType::Parts, dec!(120));
        let result = matcher(model)
            .match_item(&item, &CoverageScope::default(), &ClaimContext::default())
            .await;

        assert_eq!(result.status(), CoverageStatus::ReviewNeeded);
        assert_eq!(result.match_confidence, 0.0);
        assert!(result.match_reasoning.contains("upstream 503"));
        assert_eq!(result.trace().last().unwrap().action, TraceAction::Failed);
        assert!(result.is_balanced());
    }

    #[tokio::test]
    async fn test_malformed_response_yields_review() {
        let result = classify("no idea".to_string(), "Einlassventil").await;
        assert_eq!(result.status(), CoverageStatus::ReviewNeeded);
        assert_eq!(result.match_confidence, 0.0);
    }

    #[tokio::test]
    async fn test_timeout_yields_review() {
        let model = MockGenerativeModel::new()
            .with_default(verdict(true, 0.9))
            .with_delay(Duration::from_millis(500));
        let config = GenerativeMatcherConfig {
            timeout_ms: 20,
            ..Default::default()
        };
        let matcher = GenerativeMatcher::new(Arc::new(model), config).unwrap();
        let item = LineItem::new("Einlassventil", ItemType::Parts, dec!(120));
        let result = matcher
            .match_item(&item, &CoverageScope::default(), &ClaimContext::default())
            .await;

        assert_eq!(result.status(), CoverageStatus::ReviewNeeded);
        assert!(result.match_reasoning.contains("Timeout"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = GenerativeMatcherConfig {
            approve_threshold: 1.4,
            ..Default::default()
        };
        let model: Arc<dyn GenerativeModelPort> = Arc::new(MockGenerativeModel::new());
        assert!(GenerativeMatcher::new(model, config).is_err());
    }
}
