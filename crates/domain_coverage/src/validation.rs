//! Exclusion-list guard over generative matcher output
//!
//! The model sees the excluded components in its prompt but can still call
//! one covered. This pass forces any such item back to NOT_COVERED.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::line_item::{CoverageStatus, ExclusionReason, LineItemCoverage, MatchMethod};
use crate::scope::{ClaimContext, CoverageScope};
use crate::trace::{TraceAction, TraceEntry, TraceStage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationGuardConfig {
    /// Small parts that accompany a covered repair (seals, bolts, clips)
    pub ancillary_terms: Vec<String>,
    pub override_confidence: f64,
}

impl Default for ValidationGuardConfig {
    fn default() -> Self {
        Self {
            ancillary_terms: [
                "dichtung", "dichtring", "o-ring", "schraube", "mutter", "klammer", "clip",
                "kleinteile", "joint", "vis", "écrou", "gasket", "seal", "bolt", "screw",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            override_confidence: 1.0,
        }
    }
}

/// Whether anything on the claim is already covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairContext {
    pub has_covered_part: bool,
    pub primary_repair_covered: bool,
}

impl RepairContext {
    pub fn from_items(items: &[LineItemCoverage], context: &ClaimContext) -> Self {
        Self {
            has_covered_part: items.iter().any(|i| i.item.is_parts() && i.is_covered()),
            primary_repair_covered: context.primary_repair_covered(),
        }
    }

    pub fn is_anchored(&self) -> bool {
        self.has_covered_part || self.primary_repair_covered
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationGuard {
    config: ValidationGuardConfig,
}

impl ValidationGuard {
    pub fn new(mut config: ValidationGuardConfig) -> Self {
        config.ancillary_terms = config.ancillary_terms.iter().map(|t| t.to_lowercase()).collect();
        Self { config }
    }

    /// Applies the exclusion list to a single generative result
    pub fn validate(
        &self,
        mut item: LineItemCoverage,
        scope: &CoverageScope,
        repair: RepairContext,
    ) -> LineItemCoverage {
        if item.match_method != MatchMethod::Llm || item.status() == CoverageStatus::NotCovered {
            return item;
        }
        if item.item.is_labor() || (repair.is_anchored() && self.is_ancillary(&item)) {
            return item;
        }

        let excluded = scope
            .excluded_term_in(&item.item.description)
            .or_else(|| {
                item.matched_component
                    .as_deref()
                    .and_then(|c| scope.excluded_term_in(c))
            })
            .map(str::to_string);

        let Some(term) = excluded else {
            return item;
        };

        let previous = item.status();
        tracing::info!(
            description = %item.item.description,
            excluded_term = %term,
            previous = %previous,
            "Exclusion list overrides generative verdict"
        );

        item.reclassify(
            CoverageStatus::NotCovered,
            self.config.override_confidence,
            format!("Component '{}' is explicitly excluded by the policy", term),
        );
        item.exclusion_reason = Some(ExclusionReason::ComponentExcluded);
        item.record(
            TraceEntry::new(
                TraceStage::ValidationGuard,
                TraceAction::Overridden,
                CoverageStatus::NotCovered,
                self.config.override_confidence,
            )
            .with_detail(json!({ "excluded_term": term, "previous_status": previous })),
        );
        item
    }

    /// Validates every item, returning the indices that were overridden
    pub fn validate_all(
        &self,
        items: Vec<LineItemCoverage>,
        scope: &CoverageScope,
        context: &ClaimContext,
    ) -> (Vec<LineItemCoverage>, Vec<usize>) {
        let covered_parts = items.iter().filter(|i| i.item.is_parts() && i.is_covered()).count();
        let primary_repair_covered = context.primary_repair_covered();
        let mut overridden = Vec::new();
        let validated = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                // An item cannot anchor itself
                let own = usize::from(item.item.is_parts() && item.is_covered());
                let repair = RepairContext {
                    has_covered_part: covered_parts > own,
                    primary_repair_covered,
                };
                let result = self.validate(item, scope, repair);
                if result.trace().last().is_some_and(|e| e.stage == TraceStage::ValidationGuard) {
                    overridden.push(index);
                }
                result
            })
            .collect();
        (validated, overridden)
    }

    fn is_ancillary(&self, item: &LineItemCoverage) -> bool {
        let description = item.item.description.to_lowercase();
        self.config
            .ancillary_terms
            .iter()
            .any(|t| !t.is_empty() && description.contains(t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::{ItemType, LineItem};
    use rust_decimal_macros::dec;

    fn scope() -> CoverageScope {
        CoverageScope::new(vec!["engine".to_string()])
            .with_exclusions(vec!["Zahnriemen".to_string(), "Dichtung".to_string()])
    }

    fn model_covered(description: &str, item_type: ItemType) -> LineItemCoverage {
        LineItemCoverage::classify(
            LineItem::new(description, item_type, dec!(140)),
            CoverageStatus::Covered,
            MatchMethod::Llm,
            0.8,
            "model says covered",
        )
    }

    const UNANCHORED: RepairContext = RepairContext {
        has_covered_part: false,
        primary_repair_covered: false,
    };

    #[test]
    fn test_excluded_component_forced_not_covered() {
        let guard = ValidationGuard::default();
        let result = guard.validate(model_covered("Zahnriemen Satz", ItemType::Parts), &scope(), UNANCHORED);

        assert_eq!(result.status(), CoverageStatus::NotCovered);
        assert_eq!(result.exclusion_reason, Some(ExclusionReason::ComponentExcluded));
        assert_eq!(result.trace().last().unwrap().action, TraceAction::Overridden);
        assert!(result.is_balanced());
    }

    #[test]
    fn test_labor_is_exempt() {
        let guard = ValidationGuard::default();
        let result = guard.validate(model_covered("Zahnriemen abbauen", ItemType::Labor), &scope(), UNANCHORED);
        assert!(result.is_covered());
    }

    #[test]
    fn test_ancillary_part_exempt_only_with_anchor() {
        let guard = ValidationGuard::default();
        let anchored = RepairContext {
            has_covered_part: true,
            primary_repair_covered: false,
        };

        let kept = guard.validate(model_covered("Dichtung Wasserpumpe", ItemType::Parts), &scope(), anchored);
        assert!(kept.is_covered());

        let forced = guard.validate(model_covered("Dichtung Wasserpumpe", ItemType::Parts), &scope(), UNANCHORED);
        assert_eq!(forced.status(), CoverageStatus::NotCovered);
    }

    #[test]
    fn test_non_generative_results_untouched() {
        let guard = ValidationGuard::default();
        let keyword = LineItemCoverage::classify(
            LineItem::new("Zahnriemen", ItemType::Parts, dec!(90)),
            CoverageStatus::Covered,
            MatchMethod::Keyword,
            0.85,
            "",
        );
        assert!(guard.validate(keyword, &scope(), UNANCHORED).is_covered());
    }

    #[test]
    fn test_item_does_not_anchor_itself() {
        let guard = ValidationGuard::default();
        let (items, overridden) = guard.validate_all(
            vec![model_covered("Dichtung", ItemType::Parts)],
            &scope(),
            &ClaimContext::default(),
        );
        assert_eq!(overridden, vec![0]);
        assert_eq!(items[0].status(), CoverageStatus::NotCovered);
    }

    #[test]
    fn test_validate_all_reports_overrides() {
        let guard = ValidationGuard::default();
        let items = vec![
            model_covered("Einspritzdüse", ItemType::Parts),
            model_covered("Zahnriemen", ItemType::Parts),
        ];
        let (items, overridden) = guard.validate_all(items, &scope(), &ClaimContext::default());
        assert_eq!(overridden, vec![1]);
        assert!(items[0].is_covered());
    }
}
