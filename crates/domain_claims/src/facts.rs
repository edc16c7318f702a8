//! Normalized facts extracted from claim documents
//!
//! Extraction happens upstream; this crate only reads the name/value pairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single extracted fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    /// Structured form when the extractor produced one (dates, lists, tables)
    #[serde(default)]
    pub structured_value: Option<Value>,
    /// Extractor confidence in [0, 1]
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl ExtractedFact {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            structured_value: None,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_value = Some(value);
        self
    }

    /// True when either form of the value is present and non-empty
    pub fn is_present(&self) -> bool {
        let text = self.value.as_deref().is_some_and(|v| !v.trim().is_empty());
        let structured = self.structured_value.as_ref().is_some_and(|v| !v.is_null());
        text || structured
    }
}

/// All facts for one claim, in extraction order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimFacts(Vec<ExtractedFact>);

impl ClaimFacts {
    pub fn new(facts: Vec<ExtractedFact>) -> Self {
        Self(facts)
    }

    /// First fact with the given name
    pub fn get(&self, name: &str) -> Option<&ExtractedFact> {
        self.0.iter().find(|f| f.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|f| f.value.as_deref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(ExtractedFact::is_present)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedFact> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Share of `required` names that are present, 1.0 when nothing is required
    pub fn completeness(&self, required: &[String]) -> f64 {
        if required.is_empty() {
            return 1.0;
        }
        let present = required.iter().filter(|name| self.has(name)).count();
        present as f64 / required.len() as f64
    }

    /// Mean extractor confidence over facts that report one
    pub fn mean_confidence(&self) -> Option<f64> {
        let values: Vec<f64> = self.0.iter().filter_map(|f| f.confidence).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

impl FromIterator<ExtractedFact> for ClaimFacts {
    fn from_iter<I: IntoIterator<Item = ExtractedFact>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
