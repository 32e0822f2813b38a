//! # Registry Probe
//!
//! This library drives a live adversarial simulation against a ledger-resident
//! reporting registry: a contract where a single authority admits participants
//! (vehicles) and admitted participants submit timestamped accident reports.
//!
//! The harness checks that the registry rejects impersonation, replay and
//! unauthorized registration, and that exactly one legitimate report lands.
//!
//! ## Architecture
//!
//! - **Ledger**: the [`LedgerClient`] seam to the deployed registry (queries,
//!   simulate, commit, network time)
//! - **Roles**: resolves Authority, Participant and Attacker from the node's
//!   account pool and reconciles the authority against the chain
//! - **Simulator**: the simulate-then-commit protocol every write goes through
//! - **Classifier**: ordered phrase table mapping revert reasons to
//!   [`FailureCategory`] values
//! - **Scenario**: the ordered, precondition-gated scenario sequence
//! - **Economics**: flood-cost feasibility bound from the observed gas
//!
//! ## Usage
//!
//! ```rust,no_run
//! use registry_probe::{ProbeConfig, ScenarioRunner, SimulatedRegistry};
//!
//! # async fn demo() -> registry_probe::ProbeResult<()> {
//! let ledger = SimulatedRegistry::with_dev_accounts(10, 1_700_000_000);
//! let report = ScenarioRunner::new(&ledger, ProbeConfig::default())
//!     .run()
//!     .await?;
//!
//! println!("{}", report.summary());
//! assert!(report.defects().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod classifier;
pub mod config;
pub mod economics;
pub mod ledger;
pub mod outcome;
pub mod roles;
pub mod scenario;
pub mod simulated;
pub mod simulator;

pub use address::{Address, AddressParseError};
pub use classifier::{classify, extract_revert_reason, DefenseRule, FailureCategory, FailureClassifier};
pub use config::{GasConfig, NetworkConfig, ProbeConfig, ScenarioConfig};
pub use economics::{CostAssumptions, FloodCostEstimate};
pub use ledger::{CommitOutcome, LedgerClient, LedgerError, LedgerResult, Operation, SimulationOutcome};
pub use outcome::{Expectation, Observation, ScenarioResult, Verdict};
pub use roles::{resolve_roles, AuthorityOverride, Role, RolePositions, RoleResolution, Roles};
pub use scenario::{default_scenarios, Precondition, ProbeReport, ScenarioDescriptor, ScenarioId, ScenarioRunner};
pub use simulated::{AccidentReport, SimulatedRegistry};
pub use simulator::TransactionSimulator;

/// Ledger timestamp in seconds since the Unix epoch
pub type Timestamp = u64;

/// Gas units consumed or allowed by a transaction
pub type Gas = u64;

/// Errors that abort a probe run
///
/// Security findings are never errors: a blocked attack or a registry defect
/// is recorded as a [`ScenarioResult`]. Only conditions under which the
/// registry cannot be evaluated at all surface here.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The account pool cannot supply distinct actors
    #[error("invalid role assignment: {0}")]
    InvalidRoles(String),

    /// The registry's authority of record could not be read
    #[error("registry unreachable: could not read authority of record: {0}")]
    RegistryUnreachable(#[source] LedgerError),

    /// The deployed registry cannot execute on this node
    #[error("execution environment incompatible during `{scenario}`: {reason}")]
    EnvironmentIncompatible {
        /// Scenario whose simulation hit the failure
        scenario: String,
        /// Raw failure text from the node
        reason: String,
    },

    /// Ledger failure outside any scenario (for example the account pool)
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Run the default scenario sequence against `ledger`
pub async fn run_probe<L>(ledger: &L, config: ProbeConfig) -> ProbeResult<ProbeReport>
where
    L: LedgerClient + ?Sized,
{
    config.validate()?;
    ScenarioRunner::new(ledger, config).run().await
}
