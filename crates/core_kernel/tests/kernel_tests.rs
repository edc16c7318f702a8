//! Comprehensive tests for core_kernel

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

use core_kernel::{
    amounts_match, ClaimId, ClaimRunId, Currency, IdentifierError, Money, MoneyError, PortError,
    AMOUNT_TOLERANCE,
};

// ============================================================================
// Money Tests
// ============================================================================

mod money_tests {
    use super::*;

    #[test]
    fn test_sum_rounds_once_to_minor_unit() {
        let total = Money::checked_sum([dec!(10.004), dec!(10.004), dec!(10.004)], Currency::CHF).unwrap();
        assert_eq!(total.amount(), dec!(30.01));
        assert_eq!(total.currency(), Currency::CHF);
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::new(dec!(1800), Currency::CHF);
        let b = Money::new(dec!(300), Currency::CHF);
        assert_eq!(a.checked_sub(&b).unwrap().amount(), dec!(1500));
        assert_eq!(a.checked_add(&b).unwrap().amount(), dec!(2100));

        let eur = Money::new(dec!(1), Currency::EUR);
        assert_eq!(
            a.checked_add(&eur),
            Err(MoneyError::CurrencyMismatch("CHF".to_string(), "EUR".to_string()))
        );
    }

    #[test]
    fn test_approx_eq_requires_same_currency() {
        let chf = Money::new(dec!(100.00), Currency::CHF);
        assert!(chf.approx_eq(&Money::new(dec!(100.01), Currency::CHF)));
        assert!(!chf.approx_eq(&Money::new(dec!(100.02), Currency::CHF)));
        assert!(!chf.approx_eq(&Money::new(dec!(100.00), Currency::EUR)));
    }

    #[test]
    fn test_percent_of() {
        let covered = Money::new(dec!(450), Currency::CHF);
        let claimed = Money::new(dec!(1200), Currency::CHF);
        assert_eq!(covered.percent_of(&claimed), dec!(37.50));
        assert_eq!(covered.percent_of(&Money::zero(Currency::CHF)), Decimal::ZERO);
    }

    #[test]
    fn test_currency_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Currency::CHF).unwrap(), "\"CHF\"");
        assert_eq!(" eur ".parse::<Currency>().unwrap(), Currency::EUR);
        assert!(matches!("XYZ".parse::<Currency>(), Err(MoneyError::UnknownCurrency(_))));
    }
}

// ============================================================================
// Identifier Tests
// ============================================================================

mod identifier_tests {
    use super::*;

    #[test]
    fn test_rejects_separators_and_control_characters() {
        for bad in ["a/b", "a\\b", "a:b", "tab\there"] {
            assert!(
                matches!(ClaimId::new(bad), Err(IdentifierError::ForbiddenCharacter { .. })),
                "{:?} accepted",
                bad
            );
        }
        assert!(matches!(ClaimRunId::new("."), Err(IdentifierError::RelativeComponent { .. })));
        assert!(matches!(ClaimRunId::new(""), Err(IdentifierError::Empty { .. })));
    }

    #[test]
    fn test_length_limit() {
        assert!(ClaimId::new("x".repeat(128)).is_ok());
        assert!(matches!(
            ClaimId::new("x".repeat(129)),
            Err(IdentifierError::TooLong { max: 128, .. })
        ));
    }

    #[test]
    fn test_generated_run_ids_sort_by_creation() {
        let first = ClaimRunId::generate();
        std::thread::sleep(Duration::from_millis(2));
        let second = ClaimRunId::generate();
        assert!(first < second);
        assert!(ClaimRunId::new(second.as_str()).is_ok());
    }

    #[test]
    fn test_parse_and_convert() {
        let id: ClaimId = "CLM-64297".parse().unwrap();
        let raw: String = id.clone().into();
        assert_eq!(raw, "CLM-64297");
        assert_eq!(ClaimId::try_from(raw).unwrap(), id);
    }
}

// ============================================================================
// Port Error Tests
// ============================================================================

mod port_error_tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(PortError::timeout("classify", Duration::from_secs(30)).is_transient());
        assert!(PortError::connection("reset").is_transient());
        assert!(PortError::RateLimited { retry_after_secs: 5 }.is_transient());
        assert!(!PortError::validation("bad payload").is_transient());
        assert!(!PortError::transformation("not json").is_transient());
        assert!(PortError::conflict("dossier_v2 exists").is_conflict());
        assert!(PortError::not_found("DecisionDossier", "64297/v9").is_not_found());
    }

    #[test]
    fn test_timeout_reports_limit() {
        let error = PortError::timeout("classify", Duration::from_millis(1500));
        assert_eq!(error.to_string(), "Timeout after 1500ms: classify");
    }
}

// ============================================================================
// Property-based Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_amounts_match_is_symmetric(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let a = Decimal::new(a, 2);
        let b = Decimal::new(b, 2);
        prop_assert_eq!(amounts_match(a, b), amounts_match(b, a));
        prop_assert_eq!(amounts_match(a, b), (a - b).abs() <= AMOUNT_TOLERANCE);
    }

    #[test]
    fn prop_plain_identifiers_round_trip(raw in "[A-Za-z0-9_-]{1,64}") {
        let id = ClaimId::new(raw.clone()).unwrap();
        prop_assert_eq!(id.as_str(), raw.as_str());
        let json = serde_json::to_string(&id).unwrap();
        let back: ClaimId = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, id);
    }
}
