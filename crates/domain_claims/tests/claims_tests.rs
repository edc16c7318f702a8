//! Comprehensive tests for domain_claims

use proptest::prelude::*;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{ClaimId, ClaimRunId, Currency};

use domain_coverage::{
    ClaimContext, CoverageOrchestrator, CoverageScope, ItemType, LineItem, OrchestratorConfig,
};

use domain_claims::ports::mock::InMemoryDossierRepository;
use domain_claims::{
    AssessmentResult, CheckResult, ClaimFacts, ClaimVerdict, DecisionInput, DecisionStage,
    DossierRepository, EngineRegistry, ExtractedFact, PayoutCalculation, Recommendation,
    ScreeningCheck, ScreeningResult,
};

fn claim_id() -> ClaimId {
    ClaimId::new("65040").unwrap()
}

fn run_id() -> ClaimRunId {
    ClaimRunId::new("run-2024-03-02").unwrap()
}

fn hard_checks(results: [CheckResult; 3]) -> ScreeningResult {
    ScreeningResult::new(vec![
        ScreeningCheck::new("policy_validity", results[0]).hard(),
        ScreeningCheck::new("vehicle_identity", results[1]).hard(),
        ScreeningCheck::new("mileage_limit", results[2]).hard(),
    ])
}

fn reference_stage(repository: Arc<InMemoryDossierRepository>) -> DecisionStage {
    let engine = EngineRegistry::with_defaults()
        .build("reference", &serde_json::json!({ "currency": "CHF" }))
        .unwrap();
    DecisionStage::new(engine, repository)
}

// ============================================================================
// Decision With Coverage Tests
// ============================================================================

mod coverage_decision_tests {
    use super::*;

    #[tokio::test]
    async fn test_dossier_financials_follow_coverage() {
        let orchestrator = CoverageOrchestrator::new(OrchestratorConfig::default(), None).unwrap();
        let scope = CoverageScope::new(vec!["turbo_supercharger".to_string()]);
        let coverage = orchestrator
            .analyze(
                &claim_id(),
                vec![
                    LineItem::new("Turbolader", ItemType::Parts, dec!(1800)),
                    LineItem::new("Motoröl", ItemType::Parts, dec!(90)),
                    LineItem::new("Entsorgung", ItemType::Fee, dec!(10)),
                ],
                &scope,
                &ClaimContext::default(),
            )
            .await;

        let screening = hard_checks([CheckResult::Pass; 3])
            .with_payout(PayoutCalculation::compute(dec!(1800), dec!(300), None));
        let assessment = AssessmentResult::new(Recommendation::Approve);
        let facts = ClaimFacts::new(vec![ExtractedFact::new("vin", "WVWZZZ1JZXW000001")]);

        let repository = Arc::new(InMemoryDossierRepository::new());
        let dossier = reference_stage(repository)
            .evaluate(
                &run_id(),
                DecisionInput {
                    claim_id: &claim_id(),
                    facts: &facts,
                    screening: Some(&screening),
                    coverage: Some(&coverage),
                    assessment: Some(&assessment),
                    assumptions: &[],
                    overrides: &[],
                },
            )
            .await
            .unwrap();

        assert_eq!(dossier.version, 1);
        assert_eq!(dossier.claim_verdict, ClaimVerdict::Approve);
        let money = &dossier.financial_summary;
        assert_eq!(money.currency, Currency::CHF);
        assert_eq!(money.claimed.amount(), dec!(1900));
        assert_eq!(money.covered.amount(), dec!(1800));
        assert_eq!(money.not_covered.amount(), dec!(100));
        assert_eq!(money.deductible.amount(), dec!(300));
        assert_eq!(money.final_payout.amount(), dec!(1500));

        let coverage_clause = dossier.clause("line_item_coverage").unwrap();
        assert_eq!(coverage_clause.affected_line_items, vec![1, 2]);
        assert_eq!(dossier.engine.name, "reference");
    }
}

// ============================================================================
// Versioning Tests
// ============================================================================

mod versioning_tests {
    use super::*;

    async fn evaluate(stage: &DecisionStage, screening: &ScreeningResult) -> domain_claims::DecisionDossier {
        let facts = ClaimFacts::default();
        let assessment = AssessmentResult::new(Recommendation::Approve).with_payout(dec!(700));
        stage
            .evaluate(
                &run_id(),
                DecisionInput {
                    claim_id: &claim_id(),
                    facts: &facts,
                    screening: Some(screening),
                    coverage: None,
                    assessment: Some(&assessment),
                    assumptions: &[],
                    overrides: &[],
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_evaluation_does_not_touch_first() {
        let repository = Arc::new(InMemoryDossierRepository::new());
        let stage = reference_stage(repository.clone());

        let first = evaluate(&stage, &hard_checks([CheckResult::Pass; 3])).await;
        let second = evaluate(
            &stage,
            &hard_checks([CheckResult::Pass, CheckResult::Fail, CheckResult::Pass]),
        )
        .await;

        assert_eq!(second.version, 2);
        assert_eq!(second.claim_verdict, ClaimVerdict::Deny);
        assert_eq!(repository.list_versions(&claim_id(), &run_id()).await.unwrap(), vec![1, 2]);
        let reloaded = repository.load_dossier(&claim_id(), &run_id(), 1).await.unwrap();
        assert_eq!(reloaded, first);

        let latest = repository.latest_dossier(&claim_id(), &run_id()).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
    }

    #[tokio::test]
    async fn test_runs_are_versioned_independently() {
        let repository = Arc::new(InMemoryDossierRepository::new());
        let stage = reference_stage(repository.clone());
        evaluate(&stage, &hard_checks([CheckResult::Pass; 3])).await;

        let other_run = ClaimRunId::new("run-2024-03-05").unwrap();
        assert_eq!(repository.count_versions(&claim_id(), &other_run).await.unwrap(), 0);
        assert!(repository.latest_dossier(&claim_id(), &other_run).await.unwrap().is_none());
    }
}

// ============================================================================
// Property-based Tests
// ============================================================================

fn check_result() -> impl Strategy<Value = CheckResult> {
    prop_oneof![
        Just(CheckResult::Pass),
        Just(CheckResult::Fail),
        Just(CheckResult::Inconclusive),
    ]
}

fn recommendation() -> impl Strategy<Value = Recommendation> {
    prop_oneof![
        Just(Recommendation::Approve),
        Just(Recommendation::Deny),
        Just(Recommendation::Refer),
    ]
}

proptest! {
    #[test]
    fn prop_verdict_rules(
        results in prop::array::uniform3(check_result()),
        rec in recommendation(),
        payout_cents in 0i64..200_000,
    ) {
        let engine = EngineRegistry::with_defaults()
            .build("reference", &serde_json::Value::Null)
            .unwrap();
        let screening = hard_checks(results);
        let assessment = AssessmentResult::new(rec)
            .with_payout(rust_decimal::Decimal::new(payout_cents, 2));
        let facts = ClaimFacts::default();
        let id = claim_id();

        let decision = engine.decide(&DecisionInput {
            claim_id: &id,
            facts: &facts,
            screening: Some(&screening),
            coverage: None,
            assessment: Some(&assessment),
            assumptions: &[],
            overrides: &[],
        }).unwrap();

        if results.contains(&CheckResult::Fail) {
            prop_assert_eq!(decision.verdict, ClaimVerdict::Deny);
        } else if results.contains(&CheckResult::Inconclusive) {
            prop_assert_eq!(decision.verdict, ClaimVerdict::Refer);
        }
        if decision.verdict == ClaimVerdict::Approve {
            prop_assert!(results.iter().all(|r| *r == CheckResult::Pass));
            prop_assert_eq!(rec, Recommendation::Approve);
            prop_assert!(payout_cents > 0);
        }
    }
}
