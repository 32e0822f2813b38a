//! Scenario expectations, observations and verdicts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{FailureCategory, Gas};

/// What a scenario expects the registry to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "expect", content = "category", rename_all = "snake_case")]
pub enum Expectation {
    /// Legitimate operation; must be accepted
    Succeed,
    /// Attack; must be rejected with the given category
    Blocked(FailureCategory),
    /// Read-only invariant check
    Invariant,
}

/// What actually happened when a scenario ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// Simulation passed and the commit was included
    Committed { gas_used: Gas },
    /// Simulation failed; nothing was submitted
    Blocked { category: FailureCategory, reason: String },
    /// Simulation passed but the commit reverted
    RaceReverted { note: String },
    /// A ledger call failed or timed out
    TransportFailure { note: String },
    /// The desired state already held, no transaction needed
    AlreadySatisfied { note: String },
    /// A precondition did not hold, the scenario was not attempted
    Skipped { diagnostic: String },
    /// Accepted-report counter check
    Consistency {
        baseline: u64,
        observed: u64,
        expected_increase: u64,
    },
}

impl Observation {
    /// Failure category carried by the observation, if any
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Observation::Blocked { category, .. } => Some(*category),
            Observation::RaceReverted { .. } | Observation::TransportFailure { .. } => {
                Some(FailureCategory::Unclassified)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Committed { gas_used } => write!(f, "committed (gas used: {})", gas_used),
            Observation::Blocked { category, reason } => write!(f, "blocked: {} ({})", category, reason),
            Observation::RaceReverted { note } => write!(f, "reverted after simulation: {}", note),
            Observation::TransportFailure { note } => write!(f, "ledger call failed: {}", note),
            Observation::AlreadySatisfied { note } => write!(f, "already satisfied: {}", note),
            Observation::Skipped { diagnostic } => write!(f, "skipped: {}", diagnostic),
            Observation::Consistency {
                baseline,
                observed,
                expected_increase,
            } => write!(
                f,
                "accepted reports {} -> {} (expected +{})",
                baseline, observed, expected_increase
            ),
        }
    }
}

/// How a result should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Registry behaved as expected
    Pass,
    /// Registry behaved unexpectedly: a finding against the registry
    Defect,
    /// Could not decide because of transport or a race between phases
    Inconclusive,
    /// Precondition unmet, not attempted
    Skipped,
}

/// Outcome of one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub expectation: Expectation,
    pub observation: Observation,
    pub matched: bool,
    pub verdict: Verdict,
}

impl ScenarioResult {
    /// Judge `observation` against `expectation`
    pub fn new(name: impl Into<String>, expectation: Expectation, observation: Observation) -> Self {
        let matched = match (&expectation, &observation) {
            (Expectation::Succeed, Observation::Committed { .. })
            | (Expectation::Succeed, Observation::AlreadySatisfied { .. }) => true,
            (Expectation::Blocked(expected), Observation::Blocked { category, .. }) => expected == category,
            (
                Expectation::Invariant,
                Observation::Consistency {
                    baseline,
                    observed,
                    expected_increase,
                },
            ) => observed.checked_sub(*baseline) == Some(*expected_increase),
            _ => false,
        };

        let verdict = match &observation {
            Observation::Skipped { .. } => Verdict::Skipped,
            Observation::RaceReverted { .. } | Observation::TransportFailure { .. } => Verdict::Inconclusive,
            _ if matched => Verdict::Pass,
            _ => Verdict::Defect,
        };

        Self {
            name: name.into(),
            expectation,
            observation,
            matched,
            verdict,
        }
    }

    /// Gas used, when the scenario committed
    pub fn gas_used(&self) -> Option<Gas> {
        match self.observation {
            Observation::Committed { gas_used } => Some(gas_used),
            _ => None,
        }
    }

    pub fn is_defect(&self) -> bool {
        self.verdict == Verdict::Defect
    }
}
