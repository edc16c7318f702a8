//! Coverage Orchestrator
//!
//! Sequences the matcher cascade, post-processing and the validation guard
//! for one claim. Matching within a claim is sequential; the orchestrator
//! holds only read-only tables, so independent claims can be analysed
//! concurrently against a shared instance.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use core_kernel::{amounts_match, ClaimId, Currency, AMOUNT_TOLERANCE};

use crate::error::CoverageError;
use crate::generative::{GenerativeMatcher, GenerativeMatcherConfig};
use crate::keyword_matcher::{KeywordMatcher, KeywordMatcherConfig};
use crate::line_item::{
    CoverageAnalysisResult, CoverageStatus, CoverageSummary, LineItem, LineItemCoverage, MatchMethod,
};
use crate::model_port::GenerativeModelPort;
use crate::post_process::{PostProcessor, PostProcessorConfig};
use crate::rule_engine::{RuleEngine, RuleEngineConfig};
use crate::scope::{ClaimContext, CoverageScope, CoveredPart};
use crate::trace::{TraceAction, TraceEntry, TraceStage};
use crate::validation::{ValidationGuard, ValidationGuardConfig};

/// Configuration for every coverage stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub currency: Currency,
    pub rules: RuleEngineConfig,
    pub keywords: KeywordMatcherConfig,
    pub generative: GenerativeMatcherConfig,
    pub post_process: PostProcessorConfig,
    pub validation: ValidationGuardConfig,
}

#[derive(Debug)]
pub struct CoverageOrchestrator {
    currency: Currency,
    rule_engine: RuleEngine,
    keyword_matcher: KeywordMatcher,
    generative: Option<GenerativeMatcher>,
    post_processor: PostProcessor,
    guard: ValidationGuard,
}

impl CoverageOrchestrator {
    /// Builds every stage; `model` enables the generative stages
    pub fn new(
        config: OrchestratorConfig,
        model: Option<Arc<dyn GenerativeModelPort>>,
    ) -> Result<Self, CoverageError> {
        let generative = model
            .map(|m| GenerativeMatcher::new(m, config.generative))
            .transpose()?;

        Ok(Self {
            currency: config.currency,
            rule_engine: RuleEngine::new(config.rules)?,
            keyword_matcher: KeywordMatcher::new(config.keywords)?,
            generative,
            post_processor: PostProcessor::new(config.post_process),
            guard: ValidationGuard::new(config.validation),
        })
    }

    /// Replaces the rule engine, e.g. with one loaded from a rules file
    pub fn with_rule_engine(mut self, rule_engine: RuleEngine) -> Self {
        self.rule_engine = rule_engine;
        self
    }

    pub fn has_generative_matcher(&self) -> bool {
        self.generative.is_some()
    }

    /// Classifies every line item of a claim
    pub async fn analyze(
        &self,
        claim_id: &ClaimId,
        items: Vec<LineItem>,
        scope: &CoverageScope,
        context: &ClaimContext,
    ) -> CoverageAnalysisResult {
        let total_items = items.len();
        let mut slots: Vec<Option<LineItemCoverage>> = vec![None; total_items];

        // Stage 1: deterministic rules
        let mut unresolved = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match self.rule_engine.match_item(item) {
                Some(result) => slots[index] = Some(result),
                None => unresolved.push((index, item.clone())),
            }
        }
        let rule_matched = total_items - unresolved.len();

        // Stage 2: vocabulary
        let batch = self.keyword_matcher.match_batch(unresolved, scope);
        let keyword_matched = batch.matched.len();
        for (index, result) in batch.matched {
            slots[index] = Some(result);
        }

        // Stage 3: generative model, with the parts covered so far as context
        let context = self.with_covered_parts(context, &slots);
        let mut generative_matched = 0;
        for (index, item, deferred) in batch.unmatched {
            let result = match &self.generative {
                Some(matcher) => {
                    generative_matched += 1;
                    let result = matcher.match_item(&item, scope, &context).await;
                    match &deferred {
                        Some(prior) => result.with_prior_trace(prior.trace()),
                        None => result,
                    }
                }
                None => deferred.unwrap_or_else(|| unresolved_item(item)),
            };
            tracing::debug!(
                item_index = index,
                status = %result.status(),
                method = ?result.match_method,
                "Item classified"
            );
            slots[index] = Some(result);
        }

        let mut line_items: Vec<LineItemCoverage> = slots
            .into_iter()
            .zip(items)
            .map(|(slot, item)| slot.unwrap_or_else(|| unresolved_item(item)))
            .collect();

        // Stage 4: post-processing
        self.post_processor
            .run(&mut line_items, &context, self.generative.as_ref())
            .await;

        // Stage 5: exclusion list guard
        let (mut line_items, overridden) = self.guard.validate_all(line_items, scope, &context);
        if !overridden.is_empty() {
            // Overridden parts may have been the only anchor for covered labor
            self.post_processor
                .demote_unanchored_labor(&mut line_items, &context);
        }

        let (summary, overflow) = match CoverageSummary::try_from_items(&line_items, self.currency) {
            Ok(summary) => (summary, None),
            Err(e) => {
                let warning = format!("Line item totals out of range ({}); summary totals saturated", e);
                tracing::warn!(claim_id = %claim_id, "{}", warning);
                (CoverageSummary::from_items(&line_items, self.currency), Some(warning))
            }
        };
        let mut warnings = self.collect_warnings(&line_items, &summary, &context);
        warnings.extend(overflow);

        tracing::info!(
            claim_id = %claim_id,
            stage = "coverage",
            items = total_items,
            rule_matched,
            keyword_matched,
            generative_matched,
            overridden = overridden.len(),
            covered = %summary.total_covered,
            coverage_percent = %summary.coverage_percent,
            "Coverage analysis complete"
        );

        CoverageAnalysisResult {
            claim_id: claim_id.clone(),
            line_items,
            summary,
            warnings,
            analyzed_at: Utc::now(),
        }
    }

    fn with_covered_parts(
        &self,
        context: &ClaimContext,
        slots: &[Option<LineItemCoverage>],
    ) -> ClaimContext {
        let mut context = context.clone();
        for result in slots.iter().flatten() {
            if !(result.item.is_parts() && result.is_covered()) {
                continue;
            }
            let known = context
                .already_covered_parts
                .iter()
                .any(|p| p.description == result.item.description);
            if !known {
                context.already_covered_parts.push(CoveredPart {
                    description: result.item.description.clone(),
                    category: result.coverage_category.clone(),
                    component: result.matched_component.clone(),
                });
            }
        }
        context
    }

    fn collect_warnings(
        &self,
        items: &[LineItemCoverage],
        summary: &CoverageSummary,
        context: &ClaimContext,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        for (index, item) in items.iter().enumerate() {
            if !item.is_balanced() {
                let warning = format!(
                    "Item {} amounts do not balance: covered {} + not covered {} != total {}",
                    index,
                    item.covered_amount(),
                    item.not_covered_amount(),
                    item.item.total_price
                );
                tracing::warn!(item_index = index, "{}", warning);
                warnings.push(warning);
            }
        }

        if let Some(invoice_total) = context.invoice_total {
            let claimed = summary.total_claimed.amount();
            if !amounts_match(claimed, invoice_total) {
                let warning = format!(
                    "Line items sum to {} but invoice total is {} (difference {}, tolerance {})",
                    claimed,
                    invoice_total,
                    claimed.saturating_sub(invoice_total).abs(),
                    AMOUNT_TOLERANCE
                );
                tracing::warn!("{}", warning);
                warnings.push(warning);
            }
        }

        warnings
    }
}

/// Result for an item no stage could classify
fn unresolved_item(item: LineItem) -> LineItemCoverage {
    LineItemCoverage::classify(
        item,
        CoverageStatus::ReviewNeeded,
        MatchMethod::Keyword,
        0.0,
        "No matcher could classify this item",
    )
    .with_trace(
        TraceEntry::new(
            TraceStage::KeywordMatcher,
            TraceAction::Failed,
            CoverageStatus::ReviewNeeded,
            0.0,
        )
        .with_detail(json!({ "reason": "no_keyword_match_and_no_generative_matcher" })),
    )
}
