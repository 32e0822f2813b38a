//! End-to-end attack scenarios against the in-memory registry
//!
//! Each test drives the full scenario sequence through [`ScenarioRunner`] and
//! checks the verdicts, the ledger side effects and the fatal paths.

use registry_probe::simulated::dev_account;
use registry_probe::{
    run_probe, FailureCategory, GasConfig, LedgerClient, Observation, ProbeConfig, ProbeError, ScenarioId, ScenarioRunner,
    SimulatedRegistry, Verdict,
};

const T0: u64 = 1_700_000_000;

fn category_of(report: &registry_probe::ProbeReport, id: ScenarioId) -> Option<FailureCategory> {
    report.result(id).and_then(|result| result.observation.category())
}

#[tokio::test]
async fn test_full_attack_sequence() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    assert!(report.defects().is_empty(), "{}", report.summary());
    assert_eq!(report.results.len(), 6);
    assert!(report.results.iter().all(|r| r.verdict == Verdict::Pass));

    assert_eq!(category_of(&report, ScenarioId::Impersonation), Some(FailureCategory::AccessDenied));
    assert_eq!(category_of(&report, ScenarioId::Replay), Some(FailureCategory::ReplayRejected));
    assert_eq!(
        category_of(&report, ScenarioId::SybilRegistration),
        Some(FailureCategory::AuthorityOnlyViolation)
    );

    // Admission and the legitimate report are the only commits
    assert_eq!(ledger.commit_count().await, 2);
    assert_eq!(ledger.simulation_count().await, 5);

    let reports = ledger.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].location, "Crash Hwy 1");
    assert_eq!(reports[0].reporter, dev_account(1));
    assert_eq!(report.final_report_count, Some(1));

    let estimate = report.flood_estimate.as_ref().unwrap();
    let gas = report.result(ScenarioId::LegitimateReport).unwrap().gas_used().unwrap();
    assert_eq!(estimate.gas_used, gas);
    assert_eq!(estimate.transactions_per_block, 30_000_000 / gas);
}

#[tokio::test]
async fn test_attacks_never_commit() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    for id in [ScenarioId::Impersonation, ScenarioId::Replay, ScenarioId::SybilRegistration] {
        let result = report.result(id).unwrap();
        assert!(result.gas_used().is_none(), "{} committed", id);
        assert!(matches!(result.observation, Observation::Blocked { .. }));
    }
    assert!(!ledger.is_authorized(dev_account(8)).await.unwrap());
}

#[tokio::test]
async fn test_on_chain_authority_outside_pool() {
    let pool: Vec<_> = (0..10).map(dev_account).collect();
    let outsider = dev_account(42);
    let ledger = SimulatedRegistry::new(pool.clone(), outsider, T0);

    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    let reconciled = report.authority_override.unwrap();
    assert_eq!(reconciled.configured, pool[0]);
    assert_eq!(reconciled.on_chain, outsider);
    assert_eq!(report.roles.authority, outsider);
    assert!(report.defects().is_empty(), "{}", report.summary());
}

#[tokio::test]
async fn test_on_chain_authority_colliding_with_attacker() {
    let pool: Vec<_> = (0..10).map(dev_account).collect();
    let ledger = SimulatedRegistry::new(pool.clone(), pool[9], T0);

    let result = run_probe(&ledger, ProbeConfig::default()).await;
    assert!(matches!(result, Err(ProbeError::InvalidRoles(_))));
    assert_eq!(ledger.simulation_count().await, 0);
}

#[tokio::test]
async fn test_unreachable_registry_is_fatal() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    ledger.set_reachable(false).await;

    let result = run_probe(&ledger, ProbeConfig::default()).await;
    assert!(matches!(result, Err(ProbeError::Ledger(_))));
}

#[tokio::test]
async fn test_environment_incompatibility_aborts_run() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    ledger.set_environment_incompatible(true).await;

    let result = run_probe(&ledger, ProbeConfig::default()).await;
    match result {
        Err(ProbeError::EnvironmentIncompatible { scenario, reason }) => {
            assert_eq!(scenario, "admission");
            assert!(reason.contains("invalid opcode"));
        }
        other => panic!("Expected environment incompatibility, got {:?}", other.map(|r| r.summary())),
    }
    assert_eq!(ledger.commit_count().await, 0);
}

#[tokio::test]
async fn test_admission_race_skips_dependent_scenarios() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    ledger.revert_next_commit().await;

    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    let admission = report.result(ScenarioId::Admission).unwrap();
    assert_eq!(admission.verdict, Verdict::Inconclusive);
    assert!(matches!(admission.observation, Observation::RaceReverted { .. }));

    assert_eq!(report.result(ScenarioId::LegitimateReport).unwrap().verdict, Verdict::Skipped);
    assert_eq!(report.result(ScenarioId::Replay).unwrap().verdict, Verdict::Skipped);

    // Impersonation still runs against a fresh ledger time
    assert_eq!(report.result(ScenarioId::Impersonation).unwrap().verdict, Verdict::Pass);
    assert_eq!(report.result(ScenarioId::FinalConsistency).unwrap().verdict, Verdict::Pass);
    assert!(report.flood_estimate.is_none());
    assert!(report.defects().is_empty());
}

#[tokio::test]
async fn test_lost_admission_confirmation_rereads_ledger() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    ledger.lose_confirmation_of(1).await;

    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    let admission = report.result(ScenarioId::Admission).unwrap();
    assert_eq!(admission.verdict, Verdict::Inconclusive);
    assert!(matches!(admission.observation, Observation::TransportFailure { .. }));

    // The admission landed, so the dependent scenarios still run
    assert_eq!(report.result(ScenarioId::LegitimateReport).unwrap().verdict, Verdict::Pass);
    assert_eq!(report.result(ScenarioId::Replay).unwrap().verdict, Verdict::Pass);
    assert_eq!(report.result(ScenarioId::FinalConsistency).unwrap().verdict, Verdict::Pass);
    assert!(report.flood_estimate.is_some());
    assert!(report.defects().is_empty(), "{}", report.summary());
}

#[tokio::test]
async fn test_lost_report_confirmation_is_not_a_defect() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    ledger.lose_confirmation_of(2).await;

    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    assert_eq!(report.result(ScenarioId::LegitimateReport).unwrap().verdict, Verdict::Inconclusive);
    assert_eq!(ledger.reports().await.len(), 1);

    let consistency = report.result(ScenarioId::FinalConsistency).unwrap();
    assert_eq!(consistency.verdict, Verdict::Inconclusive);
    assert_eq!(report.final_report_count, Some(1));
    assert!(report.flood_estimate.is_none());
    assert!(report.defects().is_empty(), "{}", report.summary());
}

#[tokio::test]
async fn test_lost_report_confirmation_still_bounds_the_count() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0).with_freshness_window(u64::MAX);
    ledger.lose_confirmation_of(2).await;

    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    // The unconfirmed report accounts for one accepted report, the replay for the other
    let defects: Vec<_> = report.defects().iter().map(|r| r.name.clone()).collect();
    assert_eq!(defects, vec!["replay".to_string(), "final_consistency".to_string()]);
    assert_eq!(report.final_report_count, Some(2));
}

#[tokio::test]
async fn test_insufficient_gas_limit_is_inconclusive() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    let config = ProbeConfig {
        gas: GasConfig { commit_gas_limit: 1_000 },
        ..ProbeConfig::default()
    };

    let report = ScenarioRunner::new(&ledger, config).run().await.unwrap();
    assert_eq!(report.result(ScenarioId::Admission).unwrap().verdict, Verdict::Inconclusive);
    match &report.result(ScenarioId::LegitimateReport).unwrap().observation {
        Observation::Skipped { diagnostic } => assert!(diagnostic.contains("not admitted")),
        other => panic!("Expected skipped report, got {:?}", other),
    }
    assert!(ledger.reports().await.is_empty());
}

#[tokio::test]
async fn test_missing_freshness_check_is_a_defect() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0).with_freshness_window(u64::MAX);

    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();
    let defects: Vec<_> = report.defects().iter().map(|r| r.name.clone()).collect();
    assert_eq!(defects, vec!["replay".to_string(), "final_consistency".to_string()]);

    match &report.result(ScenarioId::FinalConsistency).unwrap().observation {
        Observation::Consistency {
            baseline,
            observed,
            expected_increase,
        } => {
            assert_eq!(*baseline, 0);
            assert_eq!(*observed, 2);
            assert_eq!(*expected_increase, 1);
        }
        other => panic!("Expected consistency observation, got {:?}", other),
    }
    assert!(report.summary().contains("DEFECTS FOUND"));
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
    let report = run_probe(&ledger, ProbeConfig::default()).await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 6);
    assert_eq!(json["results"][2]["name"], "impersonation");
    assert_eq!(json["results"][2]["verdict"], "pass");
    assert_eq!(json["results"][2]["observation"]["category"], "access_denied");
}
