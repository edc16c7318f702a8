//! Invoice line items and their coverage classification
//!
//! A [`LineItem`] is the immutable input parsed from a repair invoice. A
//! [`LineItemCoverage`] wraps it with the classification produced by the
//! matcher cascade. Status and amounts are only changed together through
//! [`LineItemCoverage::reclassify`], which keeps
//! `covered_amount + not_covered_amount == total_price`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use core_kernel::{amounts_match, ClaimId, Currency, Money, MoneyError};
use crate::error::CoverageError;
use crate::trace::{DecisionTrace, TraceEntry};

/// Kind of invoice line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[serde(alias = "part", alias = "PARTS", alias = "parts_item")]
    Parts,
    #[serde(alias = "labour", alias = "LABOR", alias = "work")]
    Labor,
    #[serde(alias = "fees", alias = "FEE")]
    Fee,
    Other,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Parts => "parts",
            ItemType::Labor => "labor",
            ItemType::Fee => "fee",
            ItemType::Other => "other",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parts" | "part" => Ok(ItemType::Parts),
            "labor" | "labour" | "work" => Ok(ItemType::Labor),
            "fee" | "fees" => Ok(ItemType::Fee),
            "other" => Ok(ItemType::Other),
            other => Err(CoverageError::UnknownItemType(other.to_string())),
        }
    }
}

/// A single invoice line as extracted upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub item_code: Option<String>,
    pub total_price: Decimal,
}

impl LineItem {
    pub fn new(description: impl Into<String>, item_type: ItemType, total_price: Decimal) -> Self {
        Self {
            description: description.into(),
            item_type,
            item_code: None,
            total_price,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.item_code = Some(code.into());
        self
    }

    pub fn is_labor(&self) -> bool {
        self.item_type == ItemType::Labor
    }

    pub fn is_parts(&self) -> bool {
        self.item_type == ItemType::Parts
    }

    /// Item code reduced to uppercase alphanumerics, if non-empty
    pub fn normalized_code(&self) -> Option<String> {
        self.item_code
            .as_deref()
            .map(normalize_code)
            .filter(|c| !c.is_empty())
    }

    /// True when an item code is present and not blank
    pub fn has_code(&self) -> bool {
        self.normalized_code().is_some()
    }
}

/// Uppercases and strips everything that is not a letter or digit
///
/// Part numbers are printed inconsistently ("1K0-121-251", "1K0 121 251"),
/// so code comparisons happen on this canonical form.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Coverage status of a line item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageStatus {
    Covered,
    NotCovered,
    ReviewNeeded,
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoverageStatus::Covered => "COVERED",
            CoverageStatus::NotCovered => "NOT_COVERED",
            CoverageStatus::ReviewNeeded => "REVIEW_NEEDED",
        };
        f.write_str(s)
    }
}

/// Which matcher produced the classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMethod {
    Rule,
    Keyword,
    Llm,
}

/// Tag explaining why an item is not covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Fee,
    ExclusionPattern,
    Consumable,
    NonCoveredLabor,
    GenericDescription,
    CategoryNotCovered,
    ModelNotCovered,
    ComponentExcluded,
    LaborNotLinked,
    DemotedNoAnchor,
}

impl ExclusionReason {
    /// Exclusions decided by a deterministic rule or the exclusion list
    ///
    /// Items carrying a hard exclusion are never promoted by labor linkage.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            ExclusionReason::Fee
                | ExclusionReason::ExclusionPattern
                | ExclusionReason::Consumable
                | ExclusionReason::NonCoveredLabor
                | ExclusionReason::GenericDescription
                | ExclusionReason::ComponentExcluded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::Fee => "fee",
            ExclusionReason::ExclusionPattern => "exclusion_pattern",
            ExclusionReason::Consumable => "consumable",
            ExclusionReason::NonCoveredLabor => "non_covered_labor",
            ExclusionReason::GenericDescription => "generic_description",
            ExclusionReason::CategoryNotCovered => "category_not_covered",
            ExclusionReason::ModelNotCovered => "model_not_covered",
            ExclusionReason::ComponentExcluded => "component_excluded",
            ExclusionReason::LaborNotLinked => "labor_not_linked",
            ExclusionReason::DemotedNoAnchor => "demoted_no_anchor",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line item together with its coverage classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemCoverage {
    #[serde(flatten)]
    pub item: LineItem,
    coverage_status: CoverageStatus,
    pub coverage_category: Option<String>,
    pub matched_component: Option<String>,
    pub match_method: MatchMethod,
    pub match_confidence: f64,
    pub match_reasoning: String,
    pub exclusion_reason: Option<ExclusionReason>,
    covered_amount: Decimal,
    not_covered_amount: Decimal,
    decision_trace: DecisionTrace,
}

impl LineItemCoverage {
    /// Creates a classified item with amounts split according to `status`
    pub fn classify(
        item: LineItem,
        status: CoverageStatus,
        method: MatchMethod,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        let (covered_amount, not_covered_amount) = split_amounts(status, item.total_price);
        Self {
            item,
            coverage_status: status,
            coverage_category: None,
            matched_component: None,
            match_method: method,
            match_confidence: clamp_confidence(confidence),
            match_reasoning: reasoning.into(),
            exclusion_reason: None,
            covered_amount,
            not_covered_amount,
            decision_trace: DecisionTrace::new(),
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.coverage_category = category;
        self
    }

    pub fn with_component(mut self, component: Option<String>) -> Self {
        self.matched_component = component;
        self
    }

    pub fn with_exclusion(mut self, reason: ExclusionReason) -> Self {
        self.exclusion_reason = Some(reason);
        self
    }

    pub fn with_trace(mut self, entry: TraceEntry) -> Self {
        self.decision_trace.push(entry);
        self
    }

    /// Places earlier-stage entries ahead of this item's own trace
    pub fn with_prior_trace(mut self, prior: &DecisionTrace) -> Self {
        let mut trace = prior.clone();
        for entry in self.decision_trace.iter() {
            trace.push(entry.clone());
        }
        self.decision_trace = trace;
        self
    }

    pub fn status(&self) -> CoverageStatus {
        self.coverage_status
    }

    pub fn is_covered(&self) -> bool {
        self.coverage_status == CoverageStatus::Covered
    }

    pub fn covered_amount(&self) -> Decimal {
        self.covered_amount
    }

    pub fn not_covered_amount(&self) -> Decimal {
        self.not_covered_amount
    }

    pub fn trace(&self) -> &DecisionTrace {
        &self.decision_trace
    }

    /// Appends an entry to the decision trace
    pub fn record(&mut self, entry: TraceEntry) {
        self.decision_trace.push(entry);
    }

    /// Moves the item to a new status and re-splits its amounts
    ///
    /// Promotion to COVERED clears any exclusion reason; the caller sets a
    /// new reason for demotions.
    pub fn reclassify(&mut self, status: CoverageStatus, confidence: f64, reasoning: impl Into<String>) {
        let (covered, not_covered) = split_amounts(status, self.item.total_price);
        self.coverage_status = status;
        self.covered_amount = covered;
        self.not_covered_amount = not_covered;
        self.match_confidence = clamp_confidence(confidence);
        self.match_reasoning = reasoning.into();
        if status == CoverageStatus::Covered {
            self.exclusion_reason = None;
        }
    }

    /// Checks `covered_amount + not_covered_amount == total_price` within tolerance
    pub fn is_balanced(&self) -> bool {
        self.covered_amount
            .checked_add(self.not_covered_amount)
            .is_some_and(|sum| amounts_match(sum, self.item.total_price))
    }
}

fn split_amounts(status: CoverageStatus, total: Decimal) -> (Decimal, Decimal) {
    match status {
        CoverageStatus::Covered => (total, Decimal::ZERO),
        CoverageStatus::NotCovered | CoverageStatus::ReviewNeeded => (Decimal::ZERO, total),
    }
}

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-method item counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCounts {
    pub rule: usize,
    pub keyword: usize,
    pub llm: usize,
}

/// Totals over all classified items of a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub total_claimed: Money,
    pub total_covered: Money,
    pub total_not_covered: Money,
    /// Portion of `total_not_covered` that is pending review
    pub total_review_needed: Money,
    pub coverage_percent: Decimal,
    pub items_covered: usize,
    pub items_not_covered: usize,
    pub items_review_needed: usize,
    pub method_counts: MethodCounts,
}

impl CoverageSummary {
    /// Builds the summary, failing when any total leaves the `Decimal` range
    pub fn try_from_items(items: &[LineItemCoverage], currency: Currency) -> Result<Self, MoneyError> {
        Self::build(items, currency, Money::checked_sum::<Vec<Decimal>>)
    }

    /// Builds the summary with totals clamped at the `Decimal` bounds
    pub fn from_items(items: &[LineItemCoverage], currency: Currency) -> Self {
        let saturating =
            |amounts: Vec<Decimal>, currency: Currency| Ok::<_, Infallible>(Money::saturating_sum(amounts, currency));
        match Self::build(items, currency, saturating) {
            Ok(summary) => summary,
            Err(never) => match never {},
        }
    }

    fn build<F, E>(items: &[LineItemCoverage], currency: Currency, sum: F) -> Result<Self, E>
    where
        F: Fn(Vec<Decimal>, Currency) -> Result<Money, E>,
    {
        let total_claimed = sum(items.iter().map(|i| i.item.total_price).collect(), currency)?;
        let total_covered = sum(items.iter().map(|i| i.covered_amount).collect(), currency)?;
        let total_not_covered = sum(items.iter().map(|i| i.not_covered_amount).collect(), currency)?;
        let total_review_needed = sum(
            items
                .iter()
                .filter(|i| i.status() == CoverageStatus::ReviewNeeded)
                .map(|i| i.item.total_price)
                .collect(),
            currency,
        )?;

        let mut method_counts = MethodCounts::default();
        for item in items {
            match item.match_method {
                MatchMethod::Rule => method_counts.rule += 1,
                MatchMethod::Keyword => method_counts.keyword += 1,
                MatchMethod::Llm => method_counts.llm += 1,
            }
        }

        let count = |status: CoverageStatus| items.iter().filter(|i| i.status() == status).count();

        Ok(Self {
            coverage_percent: total_covered.percent_of(&total_claimed),
            total_claimed,
            total_covered,
            total_not_covered,
            total_review_needed,
            items_covered: count(CoverageStatus::Covered),
            items_not_covered: count(CoverageStatus::NotCovered),
            items_review_needed: count(CoverageStatus::ReviewNeeded),
            method_counts,
        })
    }
}

/// Output of one coverage analysis pass over a claim's line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageAnalysisResult {
    pub claim_id: ClaimId,
    pub line_items: Vec<LineItemCoverage>,
    pub summary: CoverageSummary,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl CoverageAnalysisResult {
    pub fn covered_parts(&self) -> impl Iterator<Item = &LineItemCoverage> {
        self.line_items.iter().filter(|i| i.item.is_parts() && i.is_covered())
    }

    pub fn items_with_status(&self, status: CoverageStatus) -> impl Iterator<Item = &LineItemCoverage> {
        self.line_items.iter().filter(move |i| i.status() == status)
    }
}
