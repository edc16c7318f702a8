//! Deterministic Rule Engine
//!
//! First stage of the matcher cascade. An ordered list of checks is applied
//! to each line item and the first one that fires decides the item:
//!
//! | # | rule id               | applies to  | result                     |
//! |---|-----------------------|-------------|----------------------------|
//! | 1 | `fee_item`            | fee items   | NOT_COVERED                |
//! | 2 | `exclusion_pattern`   | all         | NOT_COVERED                |
//! | 3 | `consumable`          | parts       | NOT_COVERED unless override|
//! | 4 | `zero_price`          | all         | COVERED                    |
//! | 5 | `non_covered_labor`   | labor       | NOT_COVERED                |
//! | 6 | `generic_description` | all         | NOT_COVERED                |
//! | 7 | `standalone_fastener` | all         | REVIEW_NEEDED              |
//! | 8 | `standalone_seal`     | all         | REVIEW_NEEDED              |
//!
//! Pattern tables are compiled once at construction and can be loaded from
//! a JSON rules file.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use regex::{Regex, RegexBuilder};

use crate::error::CoverageError;
use crate::line_item::{
    CoverageStatus, ExclusionReason, ItemType, LineItem, LineItemCoverage, MatchMethod,
};
use crate::trace::{TraceAction, TraceEntry, TraceStage};

/// Pattern tables and the review confidence used by the rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEngineConfig {
    pub exclusion_patterns: Vec<String>,
    pub consumable_patterns: Vec<String>,
    /// Named components that look like consumables ("Ölpumpe" contains "öl")
    pub component_override_patterns: Vec<String>,
    pub non_covered_labor_patterns: Vec<String>,
    pub generic_description_patterns: Vec<String>,
    pub fastener_patterns: Vec<String>,
    pub seal_patterns: Vec<String>,
    /// Confidence assigned to standalone fastener and seal items
    pub review_confidence: f64,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            exclusion_patterns: owned(&[
                r"\b(miet|leih|ersatz)(wagen|fahrzeug)",
                r"\brental\s+car\b",
                r"v[ée]hicule\s+de\s+remplacement",
                r"abschlepp",
                r"\btowing\b",
                r"remorquage",
                r"\bvignette\b",
            ]),
            consumable_patterns: owned(&[
                r"\b(motor|getriebe|alt)?[öo]e?l\b",
                r"\b(motor)?oil\b",
                r"\bhuile\b",
                r"filter",
                r"filtre",
                r"k[üu]e?hlmittel",
                r"frostschutz",
                r"\bcoolant\b",
                r"liquide\s+de\s+refroidissement",
                r"bremsfl[üu]e?ssigkeit",
                r"scheibenwasch",
                r"adblue",
            ]),
            component_override_patterns: owned(&[
                r"[öo]e?lpumpe",
                r"[öo]e?lk[üu]e?hler",
                r"[öo]e?lwanne",
                r"oil\s*(pump|cooler|pan)",
                r"pompe\s+[àa]\s+huile",
                r"partikelfilter",
                r"particle\s+filter",
                r"filtre\s+[àa]\s+particules",
            ]),
            non_covered_labor_patterns: owned(&[
                r"diagnos",
                r"fehlerspeicher",
                r"reinigung",
                r"\bcleaning\b",
                r"nettoyage",
                r"probefahrt",
                r"test\s*drive",
                r"essai\s+routier",
                r"fahrzeugw[äa]e?sche",
            ]),
            generic_description_patterns: owned(&[
                r"^\s*$",
                r"^[\s\-./*#_]+$",
                r"^\s*(diverses?|divers|sonstiges|misc(ellaneous)?|various|n/?a)\s*$",
            ]),
            fastener_patterns: owned(&[
                r"^\s*(schrauben?|muttern?|bolzen|bolts?|screws?|nuts?|vis|[ée]crous?|clips?|klammern?)\s*(m?\d+([.,x]\d+)*)?\s*$",
            ]),
            seal_patterns: owned(&[
                r"^\s*(dichtung|dichtring|o-?ring|gaskets?|seals?|joints?)\s*$",
            ]),
            review_confidence: 0.45,
        }
    }
}

pub(crate) fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

struct CompiledTable {
    name: &'static str,
    patterns: Vec<(String, Regex)>,
}

impl CompiledTable {
    fn compile(name: &'static str, patterns: &[String]) -> Result<Self, CoverageError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (p.clone(), re))
                    .map_err(|e| CoverageError::invalid_pattern(name, p, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { name, patterns })
    }

    /// Returns the first pattern that matches `text`
    fn first_match(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(p, _)| p.as_str())
    }
}

/// Deterministic first-hit classifier
pub struct RuleEngine {
    exclusions: CompiledTable,
    consumables: CompiledTable,
    component_overrides: CompiledTable,
    non_covered_labor: CompiledTable,
    generic_descriptions: CompiledTable,
    fasteners: CompiledTable,
    seals: CompiledTable,
    review_confidence: f64,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = [
            &self.exclusions,
            &self.consumables,
            &self.component_overrides,
            &self.non_covered_labor,
            &self.generic_descriptions,
            &self.fasteners,
            &self.seals,
        ];
        let mut s = f.debug_struct("RuleEngine");
        for table in tables {
            s.field(table.name, &table.patterns.len());
        }
        s.field("review_confidence", &self.review_confidence).finish()
    }
}

struct RuleHit {
    rule_id: &'static str,
    status: CoverageStatus,
    confidence: f64,
    reason: Option<ExclusionReason>,
    rationale: String,
    pattern: Option<String>,
}

impl RuleEngine {
    /// Compiles every pattern table; an invalid regex fails construction
    pub fn new(config: RuleEngineConfig) -> Result<Self, CoverageError> {
        if !(0.0..=1.0).contains(&config.review_confidence) {
            return Err(CoverageError::InvalidConfig(format!(
                "review_confidence must be within [0, 1], got {}",
                config.review_confidence
            )));
        }
        Ok(Self {
            exclusions: CompiledTable::compile("exclusion_patterns", &config.exclusion_patterns)?,
            consumables: CompiledTable::compile("consumable_patterns", &config.consumable_patterns)?,
            component_overrides: CompiledTable::compile(
                "component_override_patterns",
                &config.component_override_patterns,
            )?,
            non_covered_labor: CompiledTable::compile(
                "non_covered_labor_patterns",
                &config.non_covered_labor_patterns,
            )?,
            generic_descriptions: CompiledTable::compile(
                "generic_description_patterns",
                &config.generic_description_patterns,
            )?,
            fasteners: CompiledTable::compile("fastener_patterns", &config.fastener_patterns)?,
            seals: CompiledTable::compile("seal_patterns", &config.seal_patterns)?,
            review_confidence: config.review_confidence,
        })
    }

    /// Builds an engine from a JSON rules document
    ///
    /// Missing tables fall back to the built-in defaults.
    pub fn load_rules_from_str(json_str: &str) -> Result<Self, CoverageError> {
        let config: RuleEngineConfig = serde_json::from_str(json_str)
            .map_err(|e| CoverageError::RulesParse(e.to_string()))?;
        Self::new(config)
    }

    /// Builds an engine from a JSON rules file
    pub fn load_rules_from_file(path: &Path) -> Result<Self, CoverageError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| CoverageError::RulesFileNotFound(path.display().to_string()))?;
        Self::load_rules_from_str(&content)
    }

    /// Classifies `item` with the first rule that fires, or returns `None`
    pub fn match_item(&self, item: &LineItem) -> Option<LineItemCoverage> {
        let hit = self.evaluate(item)?;

        tracing::debug!(
            rule_id = hit.rule_id,
            status = %hit.status,
            description = %item.description,
            "Rule matched"
        );

        let mut detail = json!({
            "rule_id": hit.rule_id,
            "rationale": hit.rationale,
        });
        if let Some(pattern) = &hit.pattern {
            detail["pattern"] = json!(pattern);
        }

        let entry = TraceEntry::new(TraceStage::RuleEngine, TraceAction::Matched, hit.status, hit.confidence)
            .with_detail(detail);

        let mut coverage = LineItemCoverage::classify(
            item.clone(),
            hit.status,
            MatchMethod::Rule,
            hit.confidence,
            hit.rationale,
        )
        .with_trace(entry);
        coverage.exclusion_reason = hit.reason;
        Some(coverage)
    }

    fn evaluate(&self, item: &LineItem) -> Option<RuleHit> {
        let description = item.description.as_str();

        if item.item_type == ItemType::Fee {
            return Some(RuleHit {
                rule_id: "fee_item",
                status: CoverageStatus::NotCovered,
                confidence: 1.0,
                reason: Some(ExclusionReason::Fee),
                rationale: "Fee items are not covered".to_string(),
                pattern: None,
            });
        }

        if let Some(pattern) = self.exclusions.first_match(description) {
            return Some(RuleHit {
                rule_id: "exclusion_pattern",
                status: CoverageStatus::NotCovered,
                confidence: 1.0,
                reason: Some(ExclusionReason::ExclusionPattern),
                rationale: format!("Description matches exclusion pattern '{}'", pattern),
                pattern: Some(pattern.to_string()),
            });
        }

        if item.is_parts() {
            if let Some(pattern) = self.consumables.first_match(description) {
                if let Some(component) = self.component_overrides.first_match(description) {
                    tracing::debug!(
                        consumable = pattern,
                        component = component,
                        "Consumable exclusion skipped for named component"
                    );
                } else {
                    return Some(RuleHit {
                        rule_id: "consumable",
                        status: CoverageStatus::NotCovered,
                        confidence: 1.0,
                        reason: Some(ExclusionReason::Consumable),
                        rationale: format!("Consumable part matching '{}'", pattern),
                        pattern: Some(pattern.to_string()),
                    });
                }
            }
        }

        if item.total_price.is_zero() {
            return Some(RuleHit {
                rule_id: "zero_price",
                status: CoverageStatus::Covered,
                confidence: 1.0,
                reason: None,
                rationale: "Zero-priced item".to_string(),
                pattern: None,
            });
        }

        if item.is_labor() {
            if let Some(pattern) = self.non_covered_labor.first_match(description) {
                return Some(RuleHit {
                    rule_id: "non_covered_labor",
                    status: CoverageStatus::NotCovered,
                    confidence: 1.0,
                    reason: Some(ExclusionReason::NonCoveredLabor),
                    rationale: format!("Labor operation matching '{}' is not covered", pattern),
                    pattern: Some(pattern.to_string()),
                });
            }
        }

        if let Some(pattern) = self.generic_descriptions.first_match(description) {
            return Some(RuleHit {
                rule_id: "generic_description",
                status: CoverageStatus::NotCovered,
                confidence: 1.0,
                reason: Some(ExclusionReason::GenericDescription),
                rationale: "Description too generic to attribute to a covered component".to_string(),
                pattern: Some(pattern.to_string()),
            });
        }

        if let Some(pattern) = self.fasteners.first_match(description) {
            return Some(RuleHit {
                rule_id: "standalone_fastener",
                status: CoverageStatus::ReviewNeeded,
                confidence: self.review_confidence,
                reason: None,
                rationale: "Standalone fastener without a component reference".to_string(),
                pattern: Some(pattern.to_string()),
            });
        }

        if let Some(pattern) = self.seals.first_match(description) {
            return Some(RuleHit {
                rule_id: "standalone_seal",
                status: CoverageStatus::ReviewNeeded,
                confidence: self.review_confidence,
                reason: None,
                rationale: "Standalone seal or gasket without a component reference".to_string(),
                pattern: Some(pattern.to_string()),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine() -> RuleEngine {
        RuleEngine::new(RuleEngineConfig::default()).unwrap()
    }

    fn rule_id(coverage: &LineItemCoverage) -> String {
        coverage.trace().entries()[0]
            .detail_str("rule_id")
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn test_fee_wins_over_consumable() {
        let item = LineItem::new("Entsorgung Altöl", ItemType::Fee, dec!(15));
        let result = engine().match_item(&item).unwrap();
        assert_eq!(result.status(), CoverageStatus::NotCovered);
        assert_eq!(result.exclusion_reason, Some(ExclusionReason::Fee));
        assert_eq!(rule_id(&result), "fee_item");
    }

    #[test]
    fn test_consumable_part_not_covered() {
        let item = LineItem::new("Motoröl 5W30", ItemType::Parts, dec!(89.50));
        let result = engine().match_item(&item).unwrap();
        assert_eq!(result.exclusion_reason, Some(ExclusionReason::Consumable));
        assert_eq!(result.match_confidence, 1.0);
    }

    #[test]
    fn test_component_override_skips_consumable() {
        let item = LineItem::new("Partikelfilter DPF", ItemType::Parts, dec!(1680));
        assert!(engine().match_item(&item).is_none());

        let plain = LineItem::new("Luftfilter", ItemType::Parts, dec!(38));
        assert_eq!(
            engine().match_item(&plain).unwrap().exclusion_reason,
            Some(ExclusionReason::Consumable)
        );
    }

    #[test]
    fn test_consumable_rule_ignores_labor() {
        let item = LineItem::new("Ölwechsel durchführen", ItemType::Labor, dec!(60));
        assert!(engine().match_item(&item).is_none());
    }

    #[test]
    fn test_zero_price_is_covered() {
        let item = LineItem::new("Kulanz Steuergerät", ItemType::Parts, dec!(0));
        let result = engine().match_item(&item).unwrap();
        assert_eq!(result.status(), CoverageStatus::Covered);
        assert_eq!(rule_id(&result), "zero_price");
    }

    #[test]
    fn test_non_covered_labor() {
        let item = LineItem::new("Fehlerspeicher auslesen", ItemType::Labor, dec!(95));
        let result = engine().match_item(&item).unwrap();
        assert_eq!(result.exclusion_reason, Some(ExclusionReason::NonCoveredLabor));
    }

    #[test]
    fn test_generic_description() {
        let item = LineItem::new("Diverses", ItemType::Parts, dec!(30));
        let result = engine().match_item(&item).unwrap();
        assert_eq!(result.exclusion_reason, Some(ExclusionReason::GenericDescription));
    }

    #[test]
    fn test_standalone_fastener_needs_review() {
        let item = LineItem::new("Schraube M8x20", ItemType::Parts, dec!(2.40));
        let result = engine().match_item(&item).unwrap();
        assert_eq!(result.status(), CoverageStatus::ReviewNeeded);
        assert_eq!(result.match_confidence, 0.45);
        assert_eq!(rule_id(&result), "standalone_fastener");
    }

    #[test]
    fn test_standalone_seal_is_anchored() {
        let item = LineItem::new("Dichtung", ItemType::Parts, dec!(12));
        let result = engine().match_item(&item).unwrap();
        assert_eq!(rule_id(&result), "standalone_seal");

        let compound = LineItem::new("Zylinderkopfdichtung", ItemType::Parts, dec!(180));
        assert!(engine().match_item(&compound).is_none());
    }

    #[test]
    fn test_unmatched_item_passes_through() {
        let item = LineItem::new("Turbolader", ItemType::Parts, dec!(1450));
        assert!(engine().match_item(&item).is_none());
    }

    #[test]
    fn test_load_rules_from_str_overrides_tables() {
        let engine = RuleEngine::load_rules_from_str(
            r#"{ "exclusion_patterns": ["\\bpolitur\\b"], "review_confidence": 0.5 }"#,
        )
        .unwrap();
        let item = LineItem::new("Politur", ItemType::Parts, dec!(40));
        let result = engine.match_item(&item).unwrap();
        assert_eq!(result.exclusion_reason, Some(ExclusionReason::ExclusionPattern));

        let rental = LineItem::new("Mietwagen 3 Tage", ItemType::Other, dec!(240));
        assert!(engine.match_item(&rental).is_none());
    }

    #[test]
    fn test_invalid_pattern_fails_construction() {
        let config = RuleEngineConfig {
            consumable_patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        let err = RuleEngine::new(config).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidPattern { .. }));
    }

    #[test]
    fn test_load_rules_from_missing_file() {
        let err = RuleEngine::load_rules_from_file(Path::new("/nonexistent/rules.json")).unwrap_err();
        assert!(matches!(err, CoverageError::RulesFileNotFound(_)));
    }
}
