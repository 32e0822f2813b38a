//! Simulate-then-commit protocol.
//!
//! Every state-changing operation is dry-run first. A failing simulation is
//! classified and reported without submitting anything, so no fee is spent on a
//! transaction known in advance to revert. Only a passing simulation is
//! committed, with a fixed gas ceiling and a single bounded wait for inclusion.
//! Nothing is retried.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::{
    extract_revert_reason, Address, CommitOutcome, Expectation, FailureClassifier, Gas, LedgerClient,
    Observation, Operation, ProbeError, ProbeResult, ScenarioResult, SimulationOutcome,
};

/// Runs single operations through the two-phase protocol
pub struct TransactionSimulator<'a, L: ?Sized> {
    ledger: &'a L,
    classifier: &'a FailureClassifier,
    gas_limit: Gas,
    commit_timeout: Duration,
}

impl<'a, L> TransactionSimulator<'a, L>
where
    L: LedgerClient + ?Sized,
{
    pub fn new(ledger: &'a L, classifier: &'a FailureClassifier, gas_limit: Gas, commit_timeout: Duration) -> Self {
        Self {
            ledger,
            classifier,
            gas_limit,
            commit_timeout,
        }
    }

    /// Attempt `operation` as `sender` and judge the outcome against `expectation`
    ///
    /// Returns `Err` only for an execution-environment incompatibility, which
    /// means the registry cannot be evaluated on this node at all.
    pub async fn attempt(
        &self,
        name: &str,
        operation: &Operation,
        sender: Address,
        expectation: Expectation,
    ) -> ProbeResult<ScenarioResult> {
        let observation = self.observe(name, operation, sender).await?;
        Ok(ScenarioResult::new(name, expectation, observation))
    }

    async fn observe(&self, name: &str, operation: &Operation, sender: Address) -> ProbeResult<Observation> {
        debug!("Simulating {} from {}", operation, sender);

        let simulation = match self.ledger.simulate(operation, sender).await {
            Ok(simulation) => simulation,
            Err(err) => {
                warn!("Simulation of {} failed to complete: {}", operation, err);
                return Ok(Observation::TransportFailure {
                    note: format!("simulation did not complete: {}", err),
                });
            }
        };

        if let SimulationOutcome::WouldFail(text) = simulation {
            if self.classifier.is_environment_incompatible(&text) {
                error!(
                    "Execution environment incompatible while simulating {}: {}",
                    operation, text
                );
                return Err(ProbeError::EnvironmentIncompatible {
                    scenario: name.to_string(),
                    reason: text,
                });
            }

            let category = self.classifier.classify(&text);
            debug!("Simulation rejected {}: {:?}", operation, category);
            return Ok(Observation::Blocked {
                category,
                reason: extract_revert_reason(&text).to_string(),
            });
        }

        let commit = self.ledger.commit(operation, sender, self.gas_limit);
        let observation = match tokio::time::timeout(self.commit_timeout, commit).await {
            Ok(Ok(CommitOutcome::Committed { gas_used })) => Observation::Committed { gas_used },
            Ok(Ok(CommitOutcome::Reverted)) => {
                warn!("Commit of {} reverted after a passing simulation", operation);
                Observation::RaceReverted {
                    note: "state advanced between simulation and commit".to_string(),
                }
            }
            Ok(Err(err)) => {
                warn!("Commit of {} failed: {}", operation, err);
                Observation::TransportFailure {
                    note: format!("commit did not complete: {}", err),
                }
            }
            Err(_) => {
                warn!(
                    "Commit of {} not confirmed within {:?}",
                    operation, self.commit_timeout
                );
                Observation::TransportFailure {
                    note: format!("no confirmation within {:?}", self.commit_timeout),
                }
            }
        };

        Ok(observation)
    }
}
