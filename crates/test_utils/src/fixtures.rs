//! Pre-built Test Fixtures
//!
//! Consistent claim data for unit and integration tests. The turbocharger
//! claim is the reference case: one covered part, complete facts, passing
//! hard checks and an approving assessment.

use core_kernel::{ClaimId, ClaimRunId};
use domain_claims::{
    AssessmentResult, CheckResult, ClaimFacts, ExtractedFact, PayoutCalculation, Recommendation,
    ScreeningCheck, ScreeningResult,
};
use domain_confidence::{ComponentName, ScorerConfig, Signal, SourceStage};
use domain_coverage::{CoverageScope, ItemType, LineItem};
use rust_decimal_macros::dec;

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn claim_id() -> ClaimId {
        ClaimId::new("64297").unwrap()
    }

    pub fn other_claim_id() -> ClaimId {
        ClaimId::new("65040").unwrap()
    }

    pub fn run_id(id: &str) -> ClaimRunId {
        ClaimRunId::new(id).unwrap()
    }
}

/// Fixture for policy coverage scopes
pub struct CoverageScopeFixtures;

impl CoverageScopeFixtures {
    /// Turbocharger cover only
    pub fn turbo() -> CoverageScope {
        CoverageScope::new(vec!["turbo_supercharger".to_string()])
    }

    /// Engine and turbocharger cover with a timing-belt exclusion
    pub fn engine_and_turbo() -> CoverageScope {
        CoverageScope::new(vec!["engine".to_string(), "turbo_supercharger".to_string()])
            .with_components("turbo_supercharger", vec!["turbocharger".to_string(), "wastegate".to_string()])
            .with_exclusions(vec!["Zahnriemen".to_string()])
    }
}

/// Fixture for invoice lines
pub struct LineItemFixtures;

impl LineItemFixtures {
    pub fn turbocharger() -> LineItem {
        LineItem::new("Turbolader", ItemType::Parts, dec!(1800))
    }

    pub fn disposal_fee() -> LineItem {
        LineItem::new("Entsorgung", ItemType::Fee, dec!(40))
    }

    /// A part no rule or keyword resolves
    pub fn unresolved_part() -> LineItem {
        LineItem::new("Stellmotor Drosselklappe", ItemType::Parts, dec!(310))
    }
}

/// Fixture for the upstream stage outputs the decision stage consumes
pub struct ClaimFixtures;

impl ClaimFixtures {
    pub const REQUIRED_FACTS: [&'static str; 5] = ["policy_number", "vin", "mileage", "repair_date", "invoice_total"];

    /// Every required fact present with high extraction confidence
    pub fn complete_facts() -> ClaimFacts {
        Self::REQUIRED_FACTS
            .iter()
            .map(|name| ExtractedFact::new(*name, "x").with_confidence(0.95))
            .collect()
    }

    /// Policy, vehicle and mileage hard checks all passing
    pub fn passing_screening() -> ScreeningResult {
        ScreeningResult::new(vec![
            ScreeningCheck::new("policy_validity", CheckResult::Pass).hard(),
            ScreeningCheck::new("vehicle_identity", CheckResult::Pass).hard(),
            ScreeningCheck::new("mileage_limit", CheckResult::Pass).hard(),
        ])
    }

    /// Passing screening with a 1500.00 payout on the turbocharger claim
    pub fn turbo_screening() -> ScreeningResult {
        Self::passing_screening().with_payout(PayoutCalculation::compute(dec!(1800), dec!(300), None))
    }

    pub fn approving_assessment() -> AssessmentResult {
        AssessmentResult::new(Recommendation::Approve)
            .with_payout(dec!(1500))
            .with_confidence(0.9)
    }
}

/// Fixture for confidence signals
pub struct SignalFixtures;

impl SignalFixtures {
    /// One ratio signal per name the default scorer maps, all at `value`
    pub fn uniform(value: f64) -> Vec<Signal> {
        ScorerConfig::default()
            .signal_components
            .keys()
            .map(|name| Signal::ratio(name.clone(), value, SourceStage::Decision))
            .collect()
    }

    /// Like [`SignalFixtures::uniform`] but without the signals of `dropped`
    pub fn uniform_without(value: f64, dropped: ComponentName) -> Vec<Signal> {
        ScorerConfig::default()
            .signal_components
            .iter()
            .filter(|(_, component)| **component != dropped)
            .map(|(name, _)| Signal::ratio(name.clone(), value, SourceStage::Decision))
            .collect()
    }
}
