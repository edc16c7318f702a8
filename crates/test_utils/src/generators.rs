//! Property-Based Test Generators
//!
//! Proptest strategies for invoice lines, confidence signals and verdicts.

use domain_claims::ClaimVerdict;
use domain_confidence::{ScorerConfig, Signal, SourceStage};
use domain_coverage::{ItemType, LineItem};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Descriptions the rule and keyword stages recognise, plus unknown ones
const DESCRIPTIONS: &[&str] = &[
    "Turbolader",
    "Wastegate",
    "Entsorgung",
    "Kleinmaterial",
    "Motoröl 5W30",
    "Diagnose",
    "Zahnriemen",
    "Stellmotor Drosselklappe",
    "Ersatzfahrzeug",
];

pub fn item_type_strategy() -> impl Strategy<Value = ItemType> {
    prop_oneof![
        Just(ItemType::Parts),
        Just(ItemType::Labor),
        Just(ItemType::Fee),
        Just(ItemType::Other),
    ]
}

/// Non-negative prices with two decimal places, up to 50 000.00
pub fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..5_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

pub fn line_item_strategy() -> impl Strategy<Value = LineItem> {
    (
        prop::sample::select(DESCRIPTIONS),
        item_type_strategy(),
        price_strategy(),
    )
        .prop_map(|(description, item_type, price)| LineItem::new(description, item_type, price))
}

pub fn line_items_strategy(max: usize) -> impl Strategy<Value = Vec<LineItem>> {
    prop::collection::vec(line_item_strategy(), 0..max)
}

/// Ratio signals whose names the default scorer maps to a component
pub fn mapped_signal_strategy() -> impl Strategy<Value = Signal> {
    let names: Vec<String> = ScorerConfig::default().signal_components.keys().cloned().collect();
    (prop::sample::select(names), 0.0f64..=1.0)
        .prop_map(|(name, value)| Signal::ratio(name, value, SourceStage::Coverage))
}

pub fn verdict_strategy() -> impl Strategy<Value = Option<ClaimVerdict>> {
    prop_oneof![
        Just(None),
        Just(Some(ClaimVerdict::Approve)),
        Just(Some(ClaimVerdict::Deny)),
        Just(Some(ClaimVerdict::Refer)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_prices_are_non_negative(price in price_strategy()) {
            prop_assert!(price >= Decimal::ZERO);
            prop_assert!(price.scale() <= 2);
        }
    }
}
