//! Screening and assessment inputs
//!
//! Screening is the deterministic pre-check run (policy validity, vehicle
//! match, limits) together with a payout pre-calculation. The assessment is
//! the generative review of the whole claim. Both are produced upstream and
//! consumed here as plain data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckResult {
    Pass,
    Fail,
    Inconclusive,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckResult::Pass => "PASS",
            CheckResult::Fail => "FAIL",
            CheckResult::Inconclusive => "INCONCLUSIVE",
        };
        f.write_str(s)
    }
}

/// One deterministic screening check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningCheck {
    /// Stable identifier, also used as the clause reference
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    pub result: CheckResult,
    /// Flagged by the screener as decisive for the claim
    #[serde(default)]
    pub is_hard: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub evidence: Value,
    /// Indices into the claim's line items
    #[serde(default)]
    pub affected_items: Vec<usize>,
}

impl ScreeningCheck {
    pub fn new(check_id: impl Into<String>, result: CheckResult) -> Self {
        let check_id = check_id.into();
        Self {
            name: check_id.replace('_', " "),
            check_id,
            result,
            is_hard: false,
            reason: None,
            evidence: Value::Null,
            affected_items: Vec::new(),
        }
    }

    pub fn hard(mut self) -> Self {
        self.is_hard = true;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_items(mut self, items: Vec<usize>) -> Self {
        self.affected_items = items;
        self
    }
}

/// Deterministic payout pre-calculation from the screener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutCalculation {
    pub covered_total: Decimal,
    #[serde(default)]
    pub deductible: Decimal,
    /// Policy cap applied to the covered total, if any
    #[serde(default)]
    pub cap_applied: Option<Decimal>,
    pub final_payout: Decimal,
}

impl PayoutCalculation {
    /// Covered total less deductible, capped, never negative
    pub fn compute(covered_total: Decimal, deductible: Decimal, cap: Option<Decimal>) -> Self {
        let capped = match cap {
            Some(cap) if covered_total > cap => cap,
            _ => covered_total,
        };
        let final_payout = capped.saturating_sub(deductible).max(Decimal::ZERO);
        Self {
            covered_total,
            deductible,
            cap_applied: cap.filter(|c| covered_total > *c),
            final_payout,
        }
    }
}

/// Output of the screening stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub checks: Vec<ScreeningCheck>,
    #[serde(default)]
    pub payout: Option<PayoutCalculation>,
    #[serde(default = "Utc::now")]
    pub screened_at: DateTime<Utc>,
}

impl ScreeningResult {
    pub fn new(checks: Vec<ScreeningCheck>) -> Self {
        Self {
            checks,
            payout: None,
            screened_at: Utc::now(),
        }
    }

    pub fn with_payout(mut self, payout: PayoutCalculation) -> Self {
        self.payout = Some(payout);
        self
    }

    pub fn check(&self, check_id: &str) -> Option<&ScreeningCheck> {
        self.checks.iter().find(|c| c.check_id == check_id)
    }

    /// Share of decided checks that passed; `None` when nothing was decided
    pub fn pass_rate(&self) -> Option<f64> {
        let decided: Vec<&ScreeningCheck> = self
            .checks
            .iter()
            .filter(|c| c.result != CheckResult::Inconclusive)
            .collect();
        if decided.is_empty() {
            return None;
        }
        let passed = decided.iter().filter(|c| c.result == CheckResult::Pass).count();
        Some(passed as f64 / decided.len() as f64)
    }

    pub fn inconclusive_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.result == CheckResult::Inconclusive)
            .count()
    }
}

/// What the generative assessment recommends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    Deny,
    /// Explicit request for a human adjuster
    Refer,
}

/// One check reported by the assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentCheck {
    pub check_id: String,
    pub result: CheckResult,
    #[serde(default)]
    pub details: Option<String>,
}

/// Output of the generative assessment stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub recommendation: Recommendation,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub checks: Vec<AssessmentCheck>,
    /// Payout the assessment arrived at
    #[serde(default)]
    pub payout: Option<Decimal>,
    /// Model's stated confidence in [0, 1]
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub fraud_indicators: Vec<String>,
}

impl AssessmentResult {
    pub fn new(recommendation: Recommendation) -> Self {
        Self {
            recommendation,
            rationale: String::new(),
            checks: Vec::new(),
            payout: None,
            confidence: None,
            fraud_indicators: Vec::new(),
        }
    }

    pub fn with_payout(mut self, payout: Decimal) -> Self {
        self.payout = Some(payout);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_check(mut self, check_id: impl Into<String>, result: CheckResult) -> Self {
        self.checks.push(AssessmentCheck {
            check_id: check_id.into(),
            result,
            details: None,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payout_calculation() {
        let payout = PayoutCalculation::compute(dec!(2000), dec!(200), None);
        assert_eq!(payout.final_payout, dec!(1800));
        assert_eq!(payout.cap_applied, None);

        let capped = PayoutCalculation::compute(dec!(6000), dec!(200), Some(dec!(5000)));
        assert_eq!(capped.final_payout, dec!(4800));
        assert_eq!(capped.cap_applied, Some(dec!(5000)));

        let below_deductible = PayoutCalculation::compute(dec!(150), dec!(200), None);
        assert_eq!(below_deductible.final_payout, dec!(0));
    }

    #[test]
    fn test_pass_rate_ignores_inconclusive() {
        let screening = ScreeningResult::new(vec![
            ScreeningCheck::new("policy_validity", CheckResult::Pass),
            ScreeningCheck::new("mileage_limit", CheckResult::Fail),
            ScreeningCheck::new("service_history", CheckResult::Inconclusive),
        ]);
        assert_eq!(screening.pass_rate(), Some(0.5));
        assert_eq!(screening.inconclusive_count(), 1);

        let undecided = ScreeningResult::new(vec![ScreeningCheck::new("x", CheckResult::Inconclusive)]);
        assert_eq!(undecided.pass_rate(), None);
    }

    #[test]
    fn test_check_result_wire_format() {
        let json = serde_json::to_string(&CheckResult::Inconclusive).unwrap();
        assert_eq!(json, "\"INCONCLUSIVE\"");
        let rec: Recommendation = serde_json::from_str("\"REFER\"").unwrap();
        assert_eq!(rec, Recommendation::Refer);
    }
}
