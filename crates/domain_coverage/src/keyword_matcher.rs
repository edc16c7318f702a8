//! Keyword Matcher
//!
//! Second stage of the cascade. Scans descriptions for known repair
//! vocabulary and resolves the matched category against the policy's
//! covered categories.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoverageError;
use crate::line_item::{
    CoverageStatus, ExclusionReason, LineItem, LineItemCoverage, MatchMethod,
};
use crate::scope::{normalize_category, CoverageScope};
use crate::trace::{TraceAction, TraceEntry, TraceStage};
use crate::vocabulary::{default_labor_eligible_categories, default_vocabulary, KeywordMapping};

const CONTEXT_BOOST: f64 = 0.05;
const CONTEXT_BOOST_CAP: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordMatcherConfig {
    pub vocabulary: Vec<KeywordMapping>,
    pub labor_eligible_categories: Vec<String>,
    /// Multiplier applied to labor confidence outside the eligible set
    pub labor_penalty: f64,
    /// Minimum confidence for a batch match to be accepted
    pub batch_threshold: f64,
}

impl Default for KeywordMatcherConfig {
    fn default() -> Self {
        Self {
            vocabulary: default_vocabulary(),
            labor_eligible_categories: default_labor_eligible_categories(),
            labor_penalty: 0.9,
            batch_threshold: 0.80,
        }
    }
}

/// Items split by the batch threshold
#[derive(Debug, Default)]
pub struct KeywordBatch {
    /// Accepted matches with their original item index
    pub matched: Vec<(usize, LineItemCoverage)>,
    /// Items for the next stage, with the below-threshold match if any
    pub unmatched: Vec<(usize, LineItem, Option<LineItemCoverage>)>,
}

#[derive(Debug)]
pub struct KeywordMatcher {
    vocabulary: Vec<KeywordMapping>,
    labor_eligible: Vec<String>,
    labor_penalty: f64,
    batch_threshold: f64,
}

impl KeywordMatcher {
    pub fn new(config: KeywordMatcherConfig) -> Result<Self, CoverageError> {
        if !(0.0..=1.0).contains(&config.batch_threshold) {
            return Err(CoverageError::InvalidConfig(format!(
                "batch_threshold must be within [0, 1], got {}",
                config.batch_threshold
            )));
        }
        if let Some(bad) = config
            .vocabulary
            .iter()
            .find(|m| !(0.0..=1.0).contains(&m.base_confidence))
        {
            return Err(CoverageError::InvalidConfig(format!(
                "base_confidence for category '{}' out of range",
                bad.category
            )));
        }

        let vocabulary = config
            .vocabulary
            .into_iter()
            .map(|mut m| {
                m.keywords = m.keywords.iter().map(|k| k.to_lowercase()).collect();
                m.context_hints = m.context_hints.iter().map(|h| h.to_lowercase()).collect();
                m
            })
            .collect();

        Ok(Self {
            vocabulary,
            labor_eligible: config
                .labor_eligible_categories
                .iter()
                .map(|c| normalize_category(c))
                .collect(),
            labor_penalty: config.labor_penalty,
            batch_threshold: config.batch_threshold,
        })
    }

    pub fn batch_threshold(&self) -> f64 {
        self.batch_threshold
    }

    /// Classifies `item` by its best vocabulary hit, or returns `None`
    pub fn match_item(&self, item: &LineItem, scope: &CoverageScope) -> Option<LineItemCoverage> {
        let description = item.description.to_lowercase();
        let (mapping, keyword, mut confidence, boosted) = self.best_mapping(&description)?;

        let covered = scope.is_category_covered(&mapping.category);
        if item.is_labor() && !(covered && self.is_labor_eligible(&mapping.category)) {
            confidence *= self.labor_penalty;
        }

        let status = if covered {
            CoverageStatus::Covered
        } else {
            CoverageStatus::NotCovered
        };
        let reasoning = if covered {
            format!("Keyword '{}' maps to covered category '{}'", keyword, mapping.category)
        } else {
            format!("Keyword '{}' maps to category '{}' which is not covered", keyword, mapping.category)
        };

        let entry = TraceEntry::new(TraceStage::KeywordMatcher, TraceAction::Matched, status, confidence)
            .with_detail(json!({
                "keyword": keyword,
                "category": mapping.category,
                "context_boost": boosted,
            }));

        let mut coverage = LineItemCoverage::classify(item.clone(), status, MatchMethod::Keyword, confidence, reasoning)
            .with_category(Some(mapping.category.clone()))
            .with_component(mapping.component.clone())
            .with_trace(entry);
        if !covered {
            coverage.exclusion_reason = Some(ExclusionReason::CategoryNotCovered);
        }
        Some(coverage)
    }

    /// Partitions items at the batch threshold
    pub fn match_batch(&self, items: Vec<(usize, LineItem)>, scope: &CoverageScope) -> KeywordBatch {
        let mut batch = KeywordBatch::default();
        for (index, item) in items {
            match self.match_item(&item, scope) {
                Some(coverage) if coverage.match_confidence >= self.batch_threshold => {
                    tracing::debug!(
                        item_index = index,
                        category = ?coverage.coverage_category,
                        confidence = coverage.match_confidence,
                        "Keyword match accepted"
                    );
                    batch.matched.push((index, coverage));
                }
                Some(mut coverage) => {
                    coverage.record(
                        TraceEntry::new(
                            TraceStage::KeywordMatcher,
                            TraceAction::Deferred,
                            coverage.status(),
                            coverage.match_confidence,
                        )
                        .with_detail(json!({ "threshold": self.batch_threshold })),
                    );
                    batch.unmatched.push((index, item, Some(coverage)));
                }
                None => batch.unmatched.push((index, item, None)),
            }
        }
        batch
    }

    /// Highest-confidence mapping hit; ties keep the first registered
    fn best_mapping(&self, description: &str) -> Option<(&KeywordMapping, String, f64, bool)> {
        let mut best: Option<(&KeywordMapping, String, f64, bool)> = None;
        for mapping in &self.vocabulary {
            let Some(keyword) = mapping
                .keywords
                .iter()
                .find(|k| !k.is_empty() && description.contains(k.as_str()))
            else {
                continue;
            };

            let has_hint = mapping
                .context_hints
                .iter()
                .any(|h| !h.is_empty() && description.contains(h.as_str()));
            let confidence = if has_hint {
                boost(mapping.base_confidence)
            } else {
                mapping.base_confidence
            };

            if best.as_ref().map_or(true, |(_, _, c, _)| confidence > *c) {
                best = Some((mapping, keyword.clone(), confidence, has_hint));
            }
        }
        best
    }

    fn is_labor_eligible(&self, category: &str) -> bool {
        let category = normalize_category(category);
        self.labor_eligible.iter().any(|c| *c == category)
    }
}

fn boost(base: f64) -> f64 {
    if base >= CONTEXT_BOOST_CAP {
        base
    } else {
        (base + CONTEXT_BOOST).min(CONTEXT_BOOST_CAP)
    }
}
