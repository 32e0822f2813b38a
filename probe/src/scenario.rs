//! Scenario orchestration.
//!
//! The six scenarios run strictly in order against one ledger. Each has a
//! sender role, an expectation and a set of preconditions; a scenario whose
//! preconditions are unmet is recorded as skipped without touching the
//! ledger. Admission status is re-read from the ledger before each scenario
//! that depends on it. The only values carried between scenarios are the
//! anchor timestamp of the legitimate report and the accepted-report
//! baseline, and neither outlives the run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    resolve_roles, AuthorityOverride, Expectation, FailureCategory, FailureClassifier, FloodCostEstimate, Gas,
    LedgerClient, LedgerError, Observation, Operation, ProbeConfig, ProbeResult, Role, Roles, ScenarioResult, Timestamp,
    TransactionSimulator, Verdict,
};

/// Identity of a scenario in the fixed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Authority admits the participant
    Admission,
    /// Admitted participant files a fresh report
    LegitimateReport,
    /// Unadmitted attacker files a report
    Impersonation,
    /// Participant resubmits with a stale timestamp
    Replay,
    /// Attacker tries to admit a second identity
    SybilRegistration,
    /// Accepted-report counter moved by exactly the legitimate commits
    FinalConsistency,
}

impl ScenarioId {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Admission => "admission",
            ScenarioId::LegitimateReport => "legitimate_report",
            ScenarioId::Impersonation => "impersonation",
            ScenarioId::Replay => "replay",
            ScenarioId::SybilRegistration => "sybil_registration",
            ScenarioId::FinalConsistency => "final_consistency",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Condition that must hold before a scenario is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// The participant is admitted, by this run or an earlier one
    ParticipantAdmitted,
    /// The legitimate report read its anchor timestamp
    ReportAnchored,
    /// The accepted-report baseline was read before any report
    BaselineRecorded,
}

impl Precondition {
    fn diagnostic(&self) -> &'static str {
        match self {
            Precondition::ParticipantAdmitted => "participant is not admitted",
            Precondition::ReportAnchored => "no anchor timestamp from the legitimate report",
            Precondition::BaselineRecorded => "accepted-report baseline was not recorded",
        }
    }
}

/// Static description of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    pub id: ScenarioId,
    /// Role that signs the operation; `None` for read-only checks
    pub sender: Option<Role>,
    pub expectation: Expectation,
    pub preconditions: Vec<Precondition>,
    pub description: String,
}

impl ScenarioDescriptor {
    fn new(id: ScenarioId, sender: Option<Role>, expectation: Expectation, description: &str) -> Self {
        Self {
            id,
            sender,
            expectation,
            preconditions: Vec::new(),
            description: description.to_string(),
        }
    }

    fn requires(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }
}

/// The standard sequence, in execution order
pub fn default_scenarios() -> Vec<ScenarioDescriptor> {
    vec![
        ScenarioDescriptor::new(
            ScenarioId::Admission,
            Some(Role::Authority),
            Expectation::Succeed,
            "authority admits the participant",
        ),
        ScenarioDescriptor::new(
            ScenarioId::LegitimateReport,
            Some(Role::Participant),
            Expectation::Succeed,
            "admitted participant reports at the current ledger time",
        )
        .requires(Precondition::ParticipantAdmitted),
        ScenarioDescriptor::new(
            ScenarioId::Impersonation,
            Some(Role::Attacker),
            Expectation::Blocked(FailureCategory::AccessDenied),
            "unadmitted attacker submits a forged report",
        ),
        ScenarioDescriptor::new(
            ScenarioId::Replay,
            Some(Role::Participant),
            Expectation::Blocked(FailureCategory::ReplayRejected),
            "participant resubmits the report with a stale timestamp",
        )
        .requires(Precondition::ParticipantAdmitted)
        .requires(Precondition::ReportAnchored),
        ScenarioDescriptor::new(
            ScenarioId::SybilRegistration,
            Some(Role::Attacker),
            Expectation::Blocked(FailureCategory::AuthorityOnlyViolation),
            "attacker tries to admit another identity",
        ),
        ScenarioDescriptor::new(
            ScenarioId::FinalConsistency,
            None,
            Expectation::Invariant,
            "accepted reports grew by exactly the legitimate commits",
        )
        .requires(Precondition::BaselineRecorded),
    ]
}

/// State carried from one scenario to the next within a run
#[derive(Debug, Default)]
struct RunState {
    anchor: Option<Timestamp>,
    baseline: Option<u64>,
    final_count: Option<u64>,
    legitimate_commits: u64,
    /// Legitimate reports submitted without a confirmed outcome
    unconfirmed_reports: u64,
    legitimate_gas: Option<Gas>,
}

/// Drives the scenario sequence against one ledger
pub struct ScenarioRunner<'a, L: ?Sized> {
    ledger: &'a L,
    config: ProbeConfig,
    classifier: FailureClassifier,
    scenarios: Vec<ScenarioDescriptor>,
}

impl<'a, L> ScenarioRunner<'a, L>
where
    L: LedgerClient + ?Sized,
{
    pub fn new(ledger: &'a L, config: ProbeConfig) -> Self {
        Self {
            ledger,
            config,
            classifier: FailureClassifier::default(),
            scenarios: default_scenarios(),
        }
    }

    /// Replace the revert-reason table
    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run a different descriptor list, still strictly in the given order
    pub fn with_scenarios(mut self, scenarios: Vec<ScenarioDescriptor>) -> Self {
        self.scenarios = scenarios;
        self
    }

    /// Run every scenario and assemble the report
    ///
    /// Fails only on conditions that make the registry impossible to
    /// evaluate: an unreadable account pool or authority, unusable roles, or
    /// an execution environment the registry cannot run on.
    pub async fn run(&self) -> ProbeResult<ProbeReport> {
        let pool = self.ledger.accounts().await?;
        let resolution = resolve_roles(self.ledger, &pool, &self.config.roles).await?;
        let roles = resolution.roles;

        let simulator = TransactionSimulator::new(
            self.ledger,
            &self.classifier,
            self.config.gas.commit_gas_limit,
            self.config.commit_timeout(),
        );

        let mut state = RunState::default();
        match self.ledger.accepted_report_count().await {
            Ok(count) => state.baseline = Some(count),
            Err(err) => warn!("Could not read accepted-report baseline: {}", err),
        }

        let mut results = Vec::with_capacity(self.scenarios.len());
        for descriptor in &self.scenarios {
            info!("Running scenario: {} ({})", descriptor.id, descriptor.description);
            let result = self.run_scenario(descriptor, &roles, &mut state, &simulator).await?;
            log_result(&result);
            results.push(result);
        }

        let flood_estimate = state
            .legitimate_gas
            .and_then(|gas| FloodCostEstimate::compute(gas, &self.config.economics));
        if let Some(estimate) = &flood_estimate {
            info!("{}", estimate.summary());
        }

        Ok(ProbeReport {
            generated_at: Utc::now(),
            roles,
            authority_override: resolution.authority_override,
            results,
            baseline_report_count: state.baseline,
            final_report_count: state.final_count,
            flood_estimate,
        })
    }

    async fn run_scenario(
        &self,
        descriptor: &ScenarioDescriptor,
        roles: &Roles,
        state: &mut RunState,
        simulator: &TransactionSimulator<'_, L>,
    ) -> ProbeResult<ScenarioResult> {
        let name = descriptor.id.name();
        let judge = |observation| ScenarioResult::new(name, descriptor.expectation, observation);

        for precondition in &descriptor.preconditions {
            let holds = match precondition {
                Precondition::ParticipantAdmitted => match self.ledger.is_authorized(roles.participant).await {
                    Ok(admitted) => admitted,
                    Err(err) => return Ok(judge(read_failure("admission status", err))),
                },
                Precondition::ReportAnchored => state.anchor.is_some(),
                Precondition::BaselineRecorded => state.baseline.is_some(),
            };
            if !holds {
                return Ok(judge(Observation::Skipped {
                    diagnostic: precondition.diagnostic().to_string(),
                }));
            }
        }

        let scenarios = &self.config.scenarios;
        let operation = match descriptor.id {
            ScenarioId::Admission => match self.ledger.is_authorized(roles.participant).await {
                Ok(true) => {
                    return Ok(judge(Observation::AlreadySatisfied {
                        note: format!("{} is already admitted", roles.participant),
                    }));
                }
                Ok(false) => Operation::AdmitParticipant {
                    target: roles.participant,
                },
                Err(err) => return Ok(judge(read_failure("admission status", err))),
            },
            ScenarioId::LegitimateReport => match self.ledger.current_time().await {
                Ok(now) => {
                    state.anchor = Some(now);
                    Operation::SubmitReport {
                        location: scenarios.report_location.clone(),
                        timestamp: now,
                    }
                }
                Err(err) => return Ok(judge(read_failure("ledger time", err))),
            },
            ScenarioId::Impersonation => {
                let timestamp = match state.anchor {
                    Some(anchor) => anchor,
                    None => match self.ledger.current_time().await {
                        Ok(now) => now,
                        Err(err) => return Ok(judge(read_failure("ledger time", err))),
                    },
                };
                Operation::SubmitReport {
                    location: scenarios.forged_location.clone(),
                    timestamp,
                }
            }
            ScenarioId::Replay => Operation::SubmitReport {
                location: scenarios.report_location.clone(),
                timestamp: state
                    .anchor
                    .unwrap_or_default()
                    .saturating_sub(scenarios.replay_offset_secs),
            },
            ScenarioId::SybilRegistration => Operation::AdmitParticipant {
                target: roles.sybil_target,
            },
            ScenarioId::FinalConsistency => return Ok(judge(self.check_consistency(state).await)),
        };

        let Some(sender) = descriptor.sender.map(|role| roles.address(role)) else {
            return Ok(judge(Observation::Skipped {
                diagnostic: format!("{} has no sender role", name),
            }));
        };

        let result = simulator
            .attempt(name, &operation, sender, descriptor.expectation)
            .await?;

        if descriptor.id == ScenarioId::LegitimateReport {
            match &result.observation {
                Observation::Committed { gas_used } => {
                    state.legitimate_commits += 1;
                    state.legitimate_gas = Some(*gas_used);
                }
                // The transaction may have landed even though no receipt arrived
                Observation::TransportFailure { .. } => state.unconfirmed_reports += 1,
                _ => {}
            }
        }

        Ok(result)
    }

    async fn check_consistency(&self, state: &mut RunState) -> Observation {
        let baseline = state.baseline.unwrap_or_default();
        match self.ledger.accepted_report_count().await {
            Ok(observed) => {
                state.final_count = Some(observed);
                let expected_increase = state.legitimate_commits;
                let unaccounted = observed
                    .checked_sub(baseline)
                    .and_then(|increase| increase.checked_sub(expected_increase));
                if state.unconfirmed_reports > 0 && unaccounted.is_some_and(|n| n <= state.unconfirmed_reports) {
                    warn!(
                        "Accepted reports {} -> {} with {} unconfirmed legitimate report(s)",
                        baseline, observed, state.unconfirmed_reports
                    );
                    return Observation::TransportFailure {
                        note: format!(
                            "accepted reports {} -> {}, but {} legitimate report(s) had no confirmed outcome",
                            baseline, observed, state.unconfirmed_reports
                        ),
                    };
                }
                Observation::Consistency {
                    baseline,
                    observed,
                    expected_increase,
                }
            }
            Err(err) => read_failure("accepted-report count", err),
        }
    }
}

fn read_failure(what: &str, err: LedgerError) -> Observation {
    warn!("Could not read {}: {}", what, err);
    Observation::TransportFailure {
        note: format!("could not read {}: {}", what, err),
    }
}

fn log_result(result: &ScenarioResult) {
    match result.verdict {
        Verdict::Pass => info!("Scenario {} passed: {}", result.name, result.observation),
        Verdict::Defect => error!(
            "DEFECT in {}: expected {:?}, observed {}",
            result.name, result.expectation, result.observation
        ),
        Verdict::Inconclusive => warn!("Scenario {} inconclusive: {}", result.name, result.observation),
        Verdict::Skipped => warn!("Scenario {} skipped: {}", result.name, result.observation),
    }
}

/// Outcome of a full probe run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub generated_at: DateTime<Utc>,
    pub roles: Roles,
    pub authority_override: Option<AuthorityOverride>,
    pub results: Vec<ScenarioResult>,
    pub baseline_report_count: Option<u64>,
    pub final_report_count: Option<u64>,
    /// Present only when the legitimate report committed
    pub flood_estimate: Option<FloodCostEstimate>,
}

impl ProbeReport {
    /// Result for the named scenario
    pub fn result(&self, id: ScenarioId) -> Option<&ScenarioResult> {
        self.results.iter().find(|result| result.name == id.name())
    }

    pub fn defects(&self) -> Vec<&ScenarioResult> {
        self.with_verdict(Verdict::Defect)
    }

    pub fn passed(&self) -> Vec<&ScenarioResult> {
        self.with_verdict(Verdict::Pass)
    }

    pub fn inconclusive(&self) -> Vec<&ScenarioResult> {
        self.with_verdict(Verdict::Inconclusive)
    }

    pub fn skipped(&self) -> Vec<&ScenarioResult> {
        self.with_verdict(Verdict::Skipped)
    }

    pub fn has_defects(&self) -> bool {
        self.results.iter().any(ScenarioResult::is_defect)
    }

    fn with_verdict(&self, verdict: Verdict) -> Vec<&ScenarioResult> {
        self.results.iter().filter(|result| result.verdict == verdict).collect()
    }

    /// Generate summary report
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Registry Probe Report ({})\n\
             - Authority: {}{}\n\
             - Participant: {}\n\
             - Attacker: {}\n\
             - Scenarios: {} passed, {} defects, {} inconclusive, {} skipped\n",
            self.generated_at.to_rfc3339(),
            self.roles.authority,
            if self.authority_override.is_some() { " (on-chain override)" } else { "" },
            self.roles.participant,
            self.roles.attacker,
            self.passed().len(),
            self.defects().len(),
            self.inconclusive().len(),
            self.skipped().len(),
        );

        for result in &self.results {
            let verdict = match result.verdict {
                Verdict::Pass => "PASS",
                Verdict::Defect => "DEFECT",
                Verdict::Inconclusive => "INCONCLUSIVE",
                Verdict::Skipped => "SKIPPED",
            };
            out.push_str(&format!("  [{:<12}] {:<20} {}\n", verdict, result.name, result.observation));
        }

        match &self.flood_estimate {
            Some(estimate) => out.push_str(&estimate.summary()),
            None => out.push_str("Flood cost estimate: unavailable (no legitimate report committed)"),
        }
        out.push('\n');
        out.push_str(&format!(
            "Overall Status: {}",
            if self.has_defects() { "DEFECTS FOUND" } else { "NO DEFECTS" }
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedRegistry;

    const T0: u64 = 1_700_000_000;

    #[test]
    fn test_default_sequence_order() {
        let names: Vec<_> = default_scenarios().iter().map(|d| d.id.name()).collect();
        assert_eq!(
            names,
            vec![
                "admission",
                "legitimate_report",
                "impersonation",
                "replay",
                "sybil_registration",
                "final_consistency"
            ]
        );
    }

    #[test]
    fn test_replay_requires_anchor() {
        let scenarios = default_scenarios();
        let replay = scenarios.iter().find(|d| d.id == ScenarioId::Replay).unwrap();
        assert!(replay.preconditions.contains(&Precondition::ParticipantAdmitted));
        assert!(replay.preconditions.contains(&Precondition::ReportAnchored));
        assert_eq!(replay.expectation, Expectation::Blocked(FailureCategory::ReplayRejected));
    }

    #[tokio::test]
    async fn test_healthy_registry_has_no_defects() {
        let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
        let report = ScenarioRunner::new(&ledger, ProbeConfig::default()).run().await.unwrap();

        assert!(!report.has_defects(), "{}", report.summary());
        assert_eq!(report.passed().len(), 6);
        assert_eq!(report.baseline_report_count, Some(0));
        assert_eq!(report.final_report_count, Some(1));
        assert!(report.flood_estimate.is_some());
    }

    #[tokio::test]
    async fn test_already_admitted_participant() {
        let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
        let first = ScenarioRunner::new(&ledger, ProbeConfig::default()).run().await.unwrap();
        assert!(!first.has_defects());

        ledger.advance_clock(60).await;
        let second = ScenarioRunner::new(&ledger, ProbeConfig::default()).run().await.unwrap();
        let admission = second.result(ScenarioId::Admission).unwrap();
        assert!(matches!(admission.observation, Observation::AlreadySatisfied { .. }));
        assert_eq!(admission.verdict, Verdict::Pass);
        assert_eq!(second.baseline_report_count, Some(1));
        assert_eq!(second.final_report_count, Some(2));
        assert!(!second.has_defects());
    }

    #[tokio::test]
    async fn test_custom_sequence() {
        let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
        let sybil_only: Vec<_> = default_scenarios()
            .into_iter()
            .filter(|d| d.id == ScenarioId::SybilRegistration)
            .collect();

        let report = ScenarioRunner::new(&ledger, ProbeConfig::default())
            .with_scenarios(sybil_only)
            .run()
            .await
            .unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].verdict, Verdict::Pass);
        assert!(report.flood_estimate.is_none());
        assert_eq!(ledger.commit_count().await, 0);
    }

    #[tokio::test]
    async fn test_summary_lists_every_scenario() {
        let ledger = SimulatedRegistry::with_dev_accounts(10, T0);
        let report = ScenarioRunner::new(&ledger, ProbeConfig::default()).run().await.unwrap();
        let summary = report.summary();
        for descriptor in default_scenarios() {
            assert!(summary.contains(descriptor.id.name()));
        }
        assert!(summary.contains("NO DEFECTS"));
    }
}
