//! Custom Test Assertions
//!
//! Assertion helpers with failure messages that name the offending item,
//! component or version.

use domain_claims::DecisionDossier;
use domain_confidence::ConfidenceSummary;
use domain_coverage::{CoverageAnalysisResult, CoverageStatus};

/// Asserts the status of the line item at `index`
pub fn assert_item_status(result: &CoverageAnalysisResult, index: usize, expected: CoverageStatus) {
    let item = result
        .line_items
        .get(index)
        .unwrap_or_else(|| panic!("No line item at index {} ({} items)", index, result.line_items.len()));
    assert_eq!(
        item.status(),
        expected,
        "Line item {} '{}': expected {:?}, got {:?} via {:?} ({})",
        index,
        item.item.description,
        expected,
        item.status(),
        item.match_method,
        item.match_reasoning
    );
}

/// Asserts every item splits its price exactly and the summary adds up
pub fn assert_amounts_balance(result: &CoverageAnalysisResult) {
    for (index, item) in result.line_items.iter().enumerate() {
        assert_eq!(
            item.covered_amount() + item.not_covered_amount(),
            item.item.total_price,
            "Line item {} '{}' does not split its price",
            index,
            item.item.description
        );
    }

    let summary = &result.summary;
    assert_eq!(
        summary.total_covered.amount() + summary.total_not_covered.amount(),
        summary.total_claimed.amount(),
        "Covered {} + not covered {} != claimed {}",
        summary.total_covered.amount(),
        summary.total_not_covered.amount(),
        summary.total_claimed.amount()
    );
    assert_eq!(
        summary.items_covered + summary.items_not_covered + summary.items_review_needed,
        result.line_items.len(),
        "Item counts do not add up to the number of line items"
    );
}

/// Asserts the composite and every component score lie in [0, 1] and the
/// active weights sum to one
pub fn assert_confidence_well_formed(summary: &ConfidenceSummary) {
    assert!(
        (0.0..=1.0).contains(&summary.composite_score),
        "Composite score {} out of range",
        summary.composite_score
    );
    for component in &summary.component_scores {
        assert!(
            (0.0..=1.0).contains(&component.score),
            "Component {:?} score {} out of range",
            component.component,
            component.score
        );
    }

    let total: f64 = summary.component_scores.iter().map(|c| c.weight).sum();
    if summary.component_scores.iter().any(|c| c.is_active()) {
        assert!((total - 1.0).abs() < 1e-9, "Active weights sum to {}", total);
    } else {
        assert_eq!(total, 0.0, "Weights without any active component");
    }
}

/// Asserts dossier versions are exactly 1..=n
pub fn assert_versions_contiguous(versions: &[u32]) {
    for (index, version) in versions.iter().enumerate() {
        assert_eq!(
            *version,
            index as u32 + 1,
            "Dossier versions are not contiguous: {:?}",
            versions
        );
    }
}

/// Asserts a dossier carries a routing block that changed its verdict
pub fn assert_routing_overridden(dossier: &DecisionDossier) {
    let routing = dossier
        .routing
        .as_ref()
        .unwrap_or_else(|| panic!("Dossier v{} has no routing block", dossier.version));
    assert!(
        routing.verdict_overridden,
        "Dossier v{} routing kept verdict {:?}",
        dossier.version,
        routing.original_verdict
    );
    assert_eq!(dossier.claim_verdict, routing.routed_verdict);
}
