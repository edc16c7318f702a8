//! Append-only decision trace
//!
//! Every stage that touches a line item records what it did. Entries are
//! only ever appended; there is no API to edit or remove one, so the trace
//! reads as the exact sequence of decisions that produced the final status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::line_item::CoverageStatus;

/// Stage that produced a trace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    RuleEngine,
    KeywordMatcher,
    GenerativeMatcher,
    LaborLinkage,
    AnchorDemotion,
    NominalPriceFlag,
    ValidationGuard,
}

/// What the stage did to the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceAction {
    /// The stage classified the item
    Matched,
    /// A match was found but below the hand-off threshold
    Deferred,
    /// Confidence was capped before thresholds were applied
    Capped,
    /// The stage could not classify the item and fell back
    Failed,
    /// Status raised to COVERED
    Promoted,
    /// Status lowered to NOT_COVERED
    Demoted,
    /// Status moved to REVIEW_NEEDED
    Flagged,
    /// A model opinion was replaced by a hard rule
    Overridden,
}

/// A single entry in a line item's decision trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub stage: TraceStage,
    pub action: TraceAction,
    pub verdict: CoverageStatus,
    pub confidence: f64,
    #[serde(default)]
    pub detail: Value,
}

impl TraceEntry {
    pub fn new(
        stage: TraceStage,
        action: TraceAction,
        verdict: CoverageStatus,
        confidence: f64,
    ) -> Self {
        Self {
            stage,
            action,
            verdict,
            confidence,
            detail: Value::Null,
        }
    }

    /// Attaches structured detail (rule id, rationale, linked part, error text)
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    /// Reads a string field out of the detail object
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail.get(key).and_then(Value::as_str)
    }
}

/// Ordered, append-only list of trace entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionTrace(Vec<TraceEntry>);

impl DecisionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.0.last()
    }

    /// Returns true if any entry was written by `stage`
    pub fn touched_by(&self, stage: TraceStage) -> bool {
        self.0.iter().any(|e| e.stage == stage)
    }
}

impl<'a> IntoIterator for &'a DecisionTrace {
    type Item = &'a TraceEntry;
    type IntoIter = std::slice::Iter<'a, TraceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trace_preserves_order() {
        let mut trace = DecisionTrace::new();
        trace.push(TraceEntry::new(
            TraceStage::GenerativeMatcher,
            TraceAction::Matched,
            CoverageStatus::Covered,
            0.8,
        ));
        trace.push(
            TraceEntry::new(
                TraceStage::AnchorDemotion,
                TraceAction::Demoted,
                CoverageStatus::NotCovered,
                0.8,
            )
            .with_detail(json!({"reason": "demoted_no_anchor"})),
        );

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.entries()[0].stage, TraceStage::GenerativeMatcher);
        assert_eq!(trace.last().unwrap().detail_str("reason"), Some("demoted_no_anchor"));
        assert!(trace.touched_by(TraceStage::AnchorDemotion));
        assert!(!trace.touched_by(TraceStage::RuleEngine));
    }

    #[test]
    fn test_trace_serializes_as_list() {
        let mut trace = DecisionTrace::new();
        trace.push(TraceEntry::new(
            TraceStage::RuleEngine,
            TraceAction::Matched,
            CoverageStatus::NotCovered,
            1.0,
        ));
        let json = serde_json::to_value(&trace).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["stage"], "rule_engine");
        assert_eq!(json[0]["verdict"], "NOT_COVERED");
    }
}
