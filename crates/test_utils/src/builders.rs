//! Test Data Builders
//!
//! Builders that let a test state only the fields it cares about.

use domain_claims::{CheckResult, PayoutCalculation, ScreeningCheck, ScreeningResult};
use domain_coverage::{ItemType, LineItem};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Builder for invoice lines
pub struct LineItemBuilder {
    description: String,
    item_type: ItemType,
    item_code: Option<String>,
    total_price: Decimal,
}

impl Default for LineItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineItemBuilder {
    pub fn new() -> Self {
        Self {
            description: "Turbolader".to_string(),
            item_type: ItemType::Parts,
            item_code: None,
            total_price: dec!(100),
        }
    }

    pub fn part(description: impl Into<String>) -> Self {
        Self::new().with_description(description)
    }

    pub fn labor(description: impl Into<String>) -> Self {
        Self::new().with_description(description).with_type(ItemType::Labor)
    }

    pub fn fee(description: impl Into<String>) -> Self {
        Self::new().with_description(description).with_type(ItemType::Fee)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.item_code = Some(code.into());
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.total_price = price;
        self
    }

    pub fn build(self) -> LineItem {
        let item = LineItem::new(self.description, self.item_type, self.total_price);
        match self.item_code {
            Some(code) => item.with_code(code),
            None => item,
        }
    }
}

/// Builder for screening results
#[derive(Default)]
pub struct ScreeningBuilder {
    checks: Vec<ScreeningCheck>,
    payout: Option<PayoutCalculation>,
}

impl ScreeningBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hard check
    pub fn hard(mut self, check_id: &str, result: CheckResult) -> Self {
        self.checks.push(ScreeningCheck::new(check_id, result).hard());
        self
    }

    /// Adds a soft check
    pub fn soft(mut self, check_id: &str, result: CheckResult) -> Self {
        self.checks.push(ScreeningCheck::new(check_id, result));
        self
    }

    pub fn with_payout(mut self, covered_total: Decimal, deductible: Decimal) -> Self {
        self.payout = Some(PayoutCalculation::compute(covered_total, deductible, None));
        self
    }

    pub fn build(self) -> ScreeningResult {
        let screening = ScreeningResult::new(self.checks);
        match self.payout {
            Some(payout) => screening.with_payout(payout),
            None => screening,
        }
    }
}
