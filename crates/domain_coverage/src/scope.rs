//! Policy coverage scope and claim context

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a policy covers, as extracted from the policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageScope {
    /// Categories the policy covers (e.g. "engine", "turbo_supercharger")
    #[serde(default)]
    pub covered_categories: Vec<String>,
    /// Named components per covered category
    #[serde(default)]
    pub covered_components: BTreeMap<String, Vec<String>>,
    /// Explicitly excluded components or terms
    #[serde(default)]
    pub excluded_components: Vec<String>,
}

impl CoverageScope {
    pub fn new(covered_categories: Vec<String>) -> Self {
        Self {
            covered_categories,
            ..Default::default()
        }
    }

    pub fn with_components(mut self, category: impl Into<String>, components: Vec<String>) -> Self {
        self.covered_components.insert(category.into(), components);
        self
    }

    pub fn with_exclusions(mut self, excluded: Vec<String>) -> Self {
        self.excluded_components = excluded;
        self
    }

    /// Checks whether `category` is covered
    ///
    /// Comparison is case and spacing insensitive, and a substring match in
    /// either direction counts ("turbo" matches "turbo_supercharger").
    pub fn is_category_covered(&self, category: &str) -> bool {
        let wanted = normalize_category(category);
        if wanted.is_empty() {
            return false;
        }
        self.covered_categories.iter().any(|c| {
            let have = normalize_category(c);
            !have.is_empty() && (have.contains(&wanted) || wanted.contains(&have))
        })
    }

    /// Returns the first excluded term found in `text`, case-insensitively
    pub fn excluded_term_in(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.excluded_components
            .iter()
            .map(String::as_str)
            .find(|term| {
                let needle = term.trim().to_lowercase();
                !needle.is_empty() && haystack.contains(&needle)
            })
    }
}

/// Lowercases and folds spaces and hyphens into underscores
pub fn normalize_category(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// The repair the claim is about, as determined upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRepair {
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    pub is_covered: bool,
}

/// A part already resolved as covered, passed to the generative matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoveredPart {
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
}

/// Claim-specific context shared by the generative stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimContext {
    #[serde(default)]
    pub primary_repair: Option<PrimaryRepair>,
    #[serde(default)]
    pub already_covered_parts: Vec<CoveredPart>,
    /// Invoice grand total, when extracted, for the totals cross-check
    #[serde(default)]
    pub invoice_total: Option<Decimal>,
}

impl ClaimContext {
    pub fn primary_repair_covered(&self) -> bool {
        self.primary_repair.as_ref().is_some_and(|p| p.is_covered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_match_both_directions() {
        let scope = CoverageScope::new(vec!["Turbo Supercharger".to_string(), "engine".to_string()]);
        assert!(scope.is_category_covered("turbo"));
        assert!(scope.is_category_covered("turbo-supercharger"));
        assert!(scope.is_category_covered("ENGINE_block"));
        assert!(!scope.is_category_covered("brakes"));
        assert!(!scope.is_category_covered("  "));
    }

    #[test]
    fn test_excluded_term_lookup() {
        let scope = CoverageScope::default()
            .with_exclusions(vec!["Zahnriemen".to_string(), "".to_string()]);
        assert_eq!(scope.excluded_term_in("ZAHNRIEMEN ERSETZEN"), Some("Zahnriemen"));
        assert_eq!(scope.excluded_term_in("Turbolader"), None);
    }
}
