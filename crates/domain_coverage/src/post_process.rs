//! Post-processing passes over the classified item list
//!
//! Runs after all three matchers, in this order:
//!
//! 1. Labor linkage: labor that references a covered part by item code is
//!    promoted; remaining model-classified labor is sent to the model in one
//!    batch and promoted where the model ties it to a covered part.
//! 2. Anchor demotion: covered labor with no covered part and no covered
//!    primary repair is demoted.
//! 3. Nominal price flag: covered labor priced as a per-operation token
//!    amount is sent to review.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::generative::GenerativeMatcher;
use crate::line_item::{
    normalize_code, CoverageStatus, ExclusionReason, LineItemCoverage, MatchMethod,
};
use crate::prompt::{labor_linkage_request, parse_labor_links};
use crate::scope::ClaimContext;
use crate::trace::{TraceAction, TraceEntry, TraceStage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessorConfig {
    pub nominal_price_threshold: Decimal,
    pub nominal_confidence: f64,
    /// Shorter normalized codes are too ambiguous to link on
    pub min_code_length: usize,
    /// Upper bound on confidence inherited through code linkage
    pub code_link_confidence_cap: f64,
    /// Confidence given to labor the model links to a covered part
    pub model_link_confidence: f64,
}

impl Default for PostProcessorConfig {
    fn default() -> Self {
        Self {
            nominal_price_threshold: dec!(2.0),
            nominal_confidence: 0.30,
            min_code_length: 3,
            code_link_confidence_cap: 0.90,
            model_link_confidence: 0.75,
        }
    }
}

/// What the passes changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostProcessReport {
    pub linked_by_code: Vec<usize>,
    pub linked_by_model: Vec<usize>,
    pub demoted_no_anchor: Vec<usize>,
    pub nominal_price_flagged: Vec<usize>,
    /// Error text when the batched linkage call failed
    pub linkage_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessor {
    config: PostProcessorConfig,
}

impl PostProcessor {
    pub fn new(config: PostProcessorConfig) -> Self {
        Self { config }
    }

    /// Runs all three passes in order
    ///
    /// `linker` enables the batched model linkage; without it only the
    /// item-code linkage runs.
    pub async fn run(
        &self,
        items: &mut [LineItemCoverage],
        context: &ClaimContext,
        linker: Option<&GenerativeMatcher>,
    ) -> PostProcessReport {
        let mut report = PostProcessReport {
            linked_by_code: self.link_labor_by_code(items),
            ..Default::default()
        };

        if let Some(linker) = linker {
            match self.link_labor_by_model(items, context, linker).await {
                Ok(linked) => report.linked_by_model = linked,
                Err(error) => report.linkage_error = Some(error),
            }
        }

        report.demoted_no_anchor = self.demote_unanchored_labor(items, context);
        report.nominal_price_flagged = self.flag_nominal_prices(items);

        tracing::info!(
            stage = "post_process",
            linked_by_code = report.linked_by_code.len(),
            linked_by_model = report.linked_by_model.len(),
            demoted = report.demoted_no_anchor.len(),
            flagged = report.nominal_price_flagged.len(),
            "Post-processing complete"
        );
        report
    }

    /// Promotes labor whose description carries a covered part's item code as
    /// one of its words
    pub fn link_labor_by_code(&self, items: &mut [LineItemCoverage]) -> Vec<usize> {
        let anchors: Vec<(usize, String, Option<String>, Option<String>, f64)> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.item.is_parts() && i.is_covered())
            .filter_map(|(index, part)| {
                let code = part.item.normalized_code()?;
                (code.chars().count() >= self.config.min_code_length).then(|| {
                    (
                        index,
                        code,
                        part.coverage_category.clone(),
                        part.matched_component.clone(),
                        part.match_confidence,
                    )
                })
            })
            .collect();

        if anchors.is_empty() {
            return Vec::new();
        }

        let mut linked = Vec::new();
        for (index, labor) in items.iter_mut().enumerate() {
            if !is_unresolved_labor(labor) {
                continue;
            }
            let tokens: Vec<String> = labor
                .item
                .description
                .split_whitespace()
                .map(normalize_code)
                .filter(|t| !t.is_empty())
                .collect();
            let Some((part_index, code, category, component, part_confidence)) = anchors
                .iter()
                .find(|(_, code, ..)| tokens.iter().any(|t| t == code))
            else {
                continue;
            };

            let confidence = part_confidence.min(self.config.code_link_confidence_cap);
            labor.reclassify(
                CoverageStatus::Covered,
                confidence,
                format!("Labor references covered part code {}", code),
            );
            labor.coverage_category = category.clone();
            labor.matched_component = component.clone();
            labor.record(
                TraceEntry::new(TraceStage::LaborLinkage, TraceAction::Promoted, CoverageStatus::Covered, confidence)
                    .with_detail(json!({
                        "method": "item_code",
                        "linked_part_index": part_index,
                        "code": code,
                    })),
            );
            tracing::debug!(item_index = index, linked_part_index = part_index, "Labor linked by item code");
            linked.push(index);
        }
        linked
    }

    /// Sends all remaining model-classified labor to the model in one request
    ///
    /// On failure NOT_COVERED candidates stay not covered as unlinked labor,
    /// REVIEW_NEEDED candidates keep their status, and the error is returned
    /// for the report.
    pub async fn link_labor_by_model(
        &self,
        items: &mut [LineItemCoverage],
        context: &ClaimContext,
        linker: &GenerativeMatcher,
    ) -> Result<Vec<usize>, String> {
        let candidates: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| is_unresolved_labor(i) && i.match_method == MatchMethod::Llm)
            .map(|(index, _)| index)
            .collect();

        let has_anchor = items.iter().any(|i| i.item.is_parts() && i.is_covered())
            || context.primary_repair_covered();
        if candidates.is_empty() || !has_anchor {
            return Ok(Vec::new());
        }

        let request = {
            let candidate_refs: Vec<(usize, &LineItemCoverage)> =
                candidates.iter().map(|&i| (i, &items[i])).collect();
            let parts: Vec<(usize, &LineItemCoverage)> = items
                .iter()
                .enumerate()
                .filter(|(_, i)| i.item.is_parts())
                .collect();
            labor_linkage_request(
                &candidate_refs,
                &parts,
                context,
                linker.config().temperature,
                linker.config().max_tokens,
            )
        };

        let links = match linker.complete(&request).await {
            Ok(text) => parse_labor_links(&text).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let links = match links {
            Ok(links) => links,
            Err(error) => {
                tracing::warn!(
                    candidates = candidates.len(),
                    error = %error,
                    "Labor linkage failed, candidates left unpromoted"
                );
                for &index in &candidates {
                    let labor = &mut items[index];
                    let confidence = labor.match_confidence;
                    let status = labor.status();
                    // Review stays review; only already-denied labor is marked unlinked.
                    if status == CoverageStatus::NotCovered {
                        labor.reclassify(
                            CoverageStatus::NotCovered,
                            confidence,
                            format!("Labor linkage unavailable: {}", error),
                        );
                        labor.exclusion_reason = Some(ExclusionReason::LaborNotLinked);
                    }
                    labor.record(
                        TraceEntry::new(TraceStage::LaborLinkage, TraceAction::Failed, status, confidence)
                            .with_detail(json!({ "error": error })),
                    );
                }
                return Err(error);
            }
        };

        let mut linked = Vec::new();
        for link in links.into_iter().filter(|l| l.necessary) {
            if !candidates.contains(&link.index) {
                continue;
            }
            let anchor = match link.linked_part_index {
                Some(part_index) => match items.get(part_index) {
                    Some(part) if part.item.is_parts() && part.is_covered() => Some((
                        part.coverage_category.clone(),
                        part.matched_component.clone(),
                        part.match_confidence,
                    )),
                    _ => None,
                },
                None if context.primary_repair_covered() => context.primary_repair.as_ref().map(|p| {
                    (p.category.clone(), p.component.clone(), self.config.model_link_confidence)
                }),
                None => None,
            };
            let Some((category, component, anchor_confidence)) = anchor else {
                continue;
            };

            let confidence = self.config.model_link_confidence.min(anchor_confidence);
            let labor = &mut items[link.index];
            labor.reclassify(CoverageStatus::Covered, confidence, link.rationale.clone());
            labor.coverage_category = category;
            labor.matched_component = component;
            labor.record(
                TraceEntry::new(TraceStage::LaborLinkage, TraceAction::Promoted, CoverageStatus::Covered, confidence)
                    .with_detail(json!({
                        "method": "model",
                        "linked_part_index": link.linked_part_index,
                        "rationale": link.rationale,
                    })),
            );
            linked.push(link.index);
        }
        Ok(linked)
    }

    /// Demotes covered labor when nothing on the claim anchors it
    pub fn demote_unanchored_labor(
        &self,
        items: &mut [LineItemCoverage],
        context: &ClaimContext,
    ) -> Vec<usize> {
        let has_covered_part = items.iter().any(|i| i.item.is_parts() && i.is_covered());
        if has_covered_part || context.primary_repair_covered() {
            return Vec::new();
        }

        let mut demoted = Vec::new();
        for (index, labor) in items.iter_mut().enumerate() {
            if !(labor.item.is_labor() && labor.is_covered()) {
                continue;
            }
            let confidence = labor.match_confidence;
            labor.reclassify(
                CoverageStatus::NotCovered,
                confidence,
                "No covered part or covered primary repair anchors this labor",
            );
            labor.exclusion_reason = Some(ExclusionReason::DemotedNoAnchor);
            labor.record(
                TraceEntry::new(TraceStage::AnchorDemotion, TraceAction::Demoted, CoverageStatus::NotCovered, confidence)
                    .with_detail(json!({ "reason": ExclusionReason::DemotedNoAnchor.as_str() })),
            );
            demoted.push(index);
        }

        if !demoted.is_empty() {
            tracing::info!(count = demoted.len(), "Labor demoted for lack of a covered anchor");
        }
        demoted
    }

    /// Sends covered labor with an operation code and token price to review
    pub fn flag_nominal_prices(&self, items: &mut [LineItemCoverage]) -> Vec<usize> {
        let threshold = self.config.nominal_price_threshold;
        let mut flagged = Vec::new();
        for (index, labor) in items.iter_mut().enumerate() {
            let price = labor.item.total_price;
            if !(labor.item.is_labor() && labor.is_covered() && labor.item.has_code()) {
                continue;
            }
            if price <= Decimal::ZERO || price > threshold {
                continue;
            }
            labor.reclassify(
                CoverageStatus::ReviewNeeded,
                self.config.nominal_confidence,
                format!("Nominal labor price {} at or below {}", price, threshold),
            );
            labor.record(
                TraceEntry::new(
                    TraceStage::NominalPriceFlag,
                    TraceAction::Flagged,
                    CoverageStatus::ReviewNeeded,
                    self.config.nominal_confidence,
                )
                .with_detail(json!({ "price": price.to_string(), "threshold": threshold.to_string() })),
            );
            flagged.push(index);
        }
        flagged
    }
}

/// Labor not yet covered and not excluded by a deterministic rule
fn is_unresolved_labor(item: &LineItemCoverage) -> bool {
    item.item.is_labor()
        && !item.is_covered()
        && item.match_method != MatchMethod::Rule
        && !item.exclusion_reason.is_some_and(|r| r.is_hard())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::{ItemType, LineItem};
    use crate::model_port::mock::MockGenerativeModel;
    use crate::generative::GenerativeMatcherConfig;
    use crate::scope::PrimaryRepair;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn classified(item: LineItem, status: CoverageStatus, method: MatchMethod, confidence: f64) -> LineItemCoverage {
        LineItemCoverage::classify(item, status, method, confidence, "test")
    }

    fn uncovered_primary() -> ClaimContext {
        ClaimContext {
            primary_repair: Some(PrimaryRepair {
                description: "Bremsen".to_string(),
                category: Some("brakes".to_string()),
                component: None,
                is_covered: false,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_code_linkage_inherits_part() {
        let mut items = vec![
            classified(
                LineItem::new("Turbolader", ItemType::Parts, dec!(1400)).with_code("03L-253-016"),
                CoverageStatus::Covered,
                MatchMethod::Keyword,
                0.95,
            )
            .with_category(Some("turbo_supercharger".to_string())),
            classified(
                LineItem::new("AW 03L253016 aus/einbauen", ItemType::Labor, dec!(380)),
                CoverageStatus::ReviewNeeded,
                MatchMethod::Llm,
                0.5,
            ),
        ];

        let linked = PostProcessor::default().link_labor_by_code(&mut items);
        assert_eq!(linked, vec![1]);
        assert_eq!(items[1].status(), CoverageStatus::Covered);
        assert_eq!(items[1].coverage_category.as_deref(), Some("turbo_supercharger"));
        assert!((items[1].match_confidence - 0.90).abs() < 1e-9);
        assert!(items[1].is_balanced());
    }

    #[test]
    fn test_code_must_match_a_whole_word() {
        let part = classified(
            LineItem::new("Abgasrückführung", ItemType::Parts, dec!(600)).with_code("ABB"),
            CoverageStatus::Covered,
            MatchMethod::Keyword,
            0.9,
        );
        let mut items = vec![
            part.clone(),
            classified(
                LineItem::new("Turbo Abbau", ItemType::Labor, dec!(120)),
                CoverageStatus::ReviewNeeded,
                MatchMethod::Llm,
                0.5,
            ),
            classified(
                LineItem::new("Ventil ABB, (abb) tauschen", ItemType::Labor, dec!(90)),
                CoverageStatus::ReviewNeeded,
                MatchMethod::Llm,
                0.5,
            ),
        ];

        let linked = PostProcessor::default().link_labor_by_code(&mut items);
        assert_eq!(linked, vec![2]);
        assert_eq!(items[1].status(), CoverageStatus::ReviewNeeded);
    }

    #[test]
    fn test_rule_matched_labor_is_not_linked() {
        let mut items = vec![
            classified(
                LineItem::new("Turbolader", ItemType::Parts, dec!(1400)).with_code("03L253016"),
                CoverageStatus::Covered,
                MatchMethod::Keyword,
                0.9,
            ),
            classified(
                LineItem::new("Diagnose 03L253016", ItemType::Labor, dec!(90)),
                CoverageStatus::NotCovered,
                MatchMethod::Rule,
                1.0,
            )
            .with_exclusion(ExclusionReason::NonCoveredLabor),
        ];
        assert!(PostProcessor::default().link_labor_by_code(&mut items).is_empty());
    }

    #[test]
    fn test_anchor_demotion() {
        let mut items = vec![
            classified(
                LineItem::new("Bremsscheibe", ItemType::Parts, dec!(200)),
                CoverageStatus::NotCovered,
                MatchMethod::Keyword,
                0.8,
            ),
            classified(
                LineItem::new("Arbeit Bremse", ItemType::Labor, dec!(150)),
                CoverageStatus::Covered,
                MatchMethod::Llm,
                0.7,
            ),
        ];
        let demoted = PostProcessor::default().demote_unanchored_labor(&mut items, &uncovered_primary());

        assert_eq!(demoted, vec![1]);
        assert_eq!(items[1].status(), CoverageStatus::NotCovered);
        assert_eq!(items[1].exclusion_reason, Some(ExclusionReason::DemotedNoAnchor));
        assert_eq!(items[1].covered_amount(), Decimal::ZERO);
        assert_eq!(items[1].trace().last().unwrap().stage, TraceStage::AnchorDemotion);
    }

    #[test]
    fn test_covered_primary_repair_anchors_labor() {
        let mut items = vec![classified(
            LineItem::new("Arbeit Motor", ItemType::Labor, dec!(150)),
            CoverageStatus::Covered,
            MatchMethod::Llm,
            0.7,
        )];
        let context = ClaimContext {
            primary_repair: Some(PrimaryRepair {
                description: "Motor".to_string(),
                category: Some("engine".to_string()),
                component: None,
                is_covered: true,
            }),
            ..Default::default()
        };
        assert!(PostProcessor::default().demote_unanchored_labor(&mut items, &context).is_empty());
        assert!(items[0].is_covered());
    }

    #[test]
    fn test_nominal_price_flag_requires_code() {
        let mut items = vec![
            classified(
                LineItem::new("Turbo ersetzen", ItemType::Labor, dec!(1.00)).with_code("1234500"),
                CoverageStatus::Covered,
                MatchMethod::Keyword,
                0.9,
            ),
            classified(
                LineItem::new("Turbo ersetzen", ItemType::Labor, dec!(1.00)),
                CoverageStatus::Covered,
                MatchMethod::Keyword,
                0.9,
            ),
        ];
        let flagged = PostProcessor::default().flag_nominal_prices(&mut items);

        assert_eq!(flagged, vec![0]);
        assert_eq!(items[0].status(), CoverageStatus::ReviewNeeded);
        assert!((items[0].match_confidence - 0.30).abs() < 1e-9);
        assert!(items[1].is_covered());
    }

    fn linker(model: MockGenerativeModel) -> GenerativeMatcher {
        GenerativeMatcher::new(Arc::new(model), GenerativeMatcherConfig::default()).unwrap()
    }

    fn linkage_items() -> Vec<LineItemCoverage> {
        vec![
            classified(
                LineItem::new("Wasserpumpe", ItemType::Parts, dec!(320)),
                CoverageStatus::Covered,
                MatchMethod::Keyword,
                0.85,
            )
            .with_category(Some("cooling_system".to_string())),
            classified(
                LineItem::new("Zahnriemen abbauen", ItemType::Labor, dec!(210)),
                CoverageStatus::ReviewNeeded,
                MatchMethod::Llm,
                0.5,
            ),
            classified(
                LineItem::new("Scheiben polieren", ItemType::Labor, dec!(80)),
                CoverageStatus::NotCovered,
                MatchMethod::Llm,
                0.6,
            )
            .with_exclusion(ExclusionReason::ModelNotCovered),
        ]
    }

    #[tokio::test]
    async fn test_model_linkage_promotes_necessary_labor() {
        let model = MockGenerativeModel::new().with_responses([r#"```json
{"links": [
  {"index": 1, "necessary": true, "linked_part_index": 0, "rationale": "belt removal needed to reach pump"},
  {"index": 2, "necessary": false}
]}
```"#]);
        let linker = linker(model);
        let mut items = linkage_items();

        let linked = PostProcessor::default()
            .link_labor_by_model(&mut items, &ClaimContext::default(), &linker)
            .await
            .unwrap();

        assert_eq!(linked, vec![1]);
        assert!(items[1].is_covered());
        assert_eq!(items[1].coverage_category.as_deref(), Some("cooling_system"));
        assert_eq!(
            items[1].trace().last().unwrap().detail["linked_part_index"],
            serde_json::json!(0)
        );
        assert_eq!(items[2].status(), CoverageStatus::NotCovered);
    }

    #[tokio::test]
    async fn test_model_linkage_failure_never_denies_review_labor() {
        let model = MockGenerativeModel::new();
        model.push_failure("model overloaded").await;
        let linker = linker(model);
        let mut items = linkage_items();

        let result = PostProcessor::default()
            .link_labor_by_model(&mut items, &ClaimContext::default(), &linker)
            .await;

        assert!(result.is_err());
        assert_eq!(items[1].status(), CoverageStatus::ReviewNeeded);
        assert_eq!(items[1].exclusion_reason, None);
        assert_eq!(items[1].covered_amount(), Decimal::ZERO);
        assert_eq!(items[2].status(), CoverageStatus::NotCovered);
        assert_eq!(items[2].exclusion_reason, Some(ExclusionReason::LaborNotLinked));
        for index in [1, 2] {
            let last = items[index].trace().last().unwrap();
            assert_eq!(last.action, TraceAction::Failed);
            assert_eq!(last.stage, TraceStage::LaborLinkage);
        }
        assert!(items[0].is_covered());
    }

    #[tokio::test]
    async fn test_linkage_skipped_without_anchor() {
        let model = MockGenerativeModel::new();
        let linker = linker(model);
        let mut items = linkage_items();
        let first = items[0].clone();
        items[0] = classified(first.item, CoverageStatus::NotCovered, MatchMethod::Keyword, 0.8);

        let linked = PostProcessor::default()
            .link_labor_by_model(&mut items, &ClaimContext::default(), &linker)
            .await
            .unwrap();
        assert!(linked.is_empty());
        assert_eq!(items[1].status(), CoverageStatus::ReviewNeeded);
    }
}
