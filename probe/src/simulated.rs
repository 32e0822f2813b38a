//! In-memory accident registry.
//!
//! Enforces the same published rules as the deployed contract so the harness
//! can be exercised without a node:
//!
//! - `registerVehicle` is restricted to the traffic authority
//! - `reportAccident` is restricted to registered vehicles
//! - report timestamps may not lie ahead of the ledger clock
//! - report timestamps older than the freshness window are replays
//!
//! Failures are phrased the way a development node reports reverts. Each
//! commit mines one block, advancing the clock by the block interval.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    Address, CommitOutcome, Gas, LedgerClient, LedgerError, LedgerResult, Operation, SimulationOutcome,
    Timestamp,
};

/// Prefix a development node puts in front of revert reasons
pub const REVERT_PREFIX: &str = "VM Exception while processing transaction: revert";

/// Default freshness window in seconds
pub const DEFAULT_FRESHNESS_WINDOW: u64 = 300;

const BASE_TX_GAS: Gas = 21_000;
const STORAGE_SLOT_GAS: Gas = 20_000;
const CALLDATA_BYTE_GAS: Gas = 16;
const EVENT_GAS: Gas = 2_375;

/// A report accepted by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccidentReport {
    pub id: u64,
    pub location: String,
    pub reporter: Address,
    pub timestamp: Timestamp,
}

#[derive(Debug)]
struct RegistryState {
    accounts: Vec<Address>,
    authority: Address,
    authorized: HashSet<Address>,
    reports: Vec<AccidentReport>,
    clock: Timestamp,
    block_interval: u64,
    freshness_window: u64,
    simulations: u64,
    commits: u64,
    revert_next_commit: bool,
    lost_confirmation: Option<u64>,
    environment_incompatible: bool,
    reachable: bool,
}

impl RegistryState {
    fn check(&self, operation: &Operation, sender: Address) -> Result<(), String> {
        match operation {
            Operation::AdmitParticipant { .. } => {
                if sender != self.authority {
                    return Err("Only Traffic Authority can register vehicles".to_string());
                }
            }
            Operation::SubmitReport { timestamp, .. } => {
                if !self.authorized.contains(&sender) {
                    return Err("Access Denied: Vehicle not authorized".to_string());
                }
                if *timestamp > self.clock {
                    return Err("Future time not allowed".to_string());
                }
                if self.clock - *timestamp > self.freshness_window {
                    return Err("Replay Attack detected: report timestamp is stale".to_string());
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, operation: &Operation, sender: Address) {
        match operation {
            Operation::AdmitParticipant { target } => {
                self.authorized.insert(*target);
            }
            Operation::SubmitReport { location, timestamp } => {
                let id = self.reports.len() as u64 + 1;
                self.reports.push(AccidentReport {
                    id,
                    location: location.clone(),
                    reporter: sender,
                    timestamp: *timestamp,
                });
            }
        }
    }

    fn ensure_reachable(&self) -> LedgerResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(LedgerError::Transport("connection refused".to_string()))
        }
    }
}

/// Deterministic gas cost of an operation
pub fn gas_cost(operation: &Operation) -> Gas {
    match operation {
        Operation::AdmitParticipant { .. } => BASE_TX_GAS + STORAGE_SLOT_GAS + 32 * CALLDATA_BYTE_GAS + EVENT_GAS,
        Operation::SubmitReport { location, .. } => {
            let length = location.len() as Gas;
            let location_slots = length.div_ceil(32).max(1);
            BASE_TX_GAS
                + STORAGE_SLOT_GAS * (3 + location_slots)
                + (96 + length) * CALLDATA_BYTE_GAS
                + EVENT_GAS
        }
    }
}

/// In-memory registry implementing [`LedgerClient`]
#[derive(Debug)]
pub struct SimulatedRegistry {
    state: Mutex<RegistryState>,
}

impl SimulatedRegistry {
    /// Registry over `accounts`, administered by `authority`
    pub fn new(accounts: Vec<Address>, authority: Address, clock: Timestamp) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                accounts,
                authority,
                authorized: HashSet::new(),
                reports: Vec::new(),
                clock,
                block_interval: 1,
                freshness_window: DEFAULT_FRESHNESS_WINDOW,
                simulations: 0,
                commits: 0,
                revert_next_commit: false,
                lost_confirmation: None,
                environment_incompatible: false,
                reachable: true,
            }),
        }
    }

    /// Registry over `count` deterministic accounts, deployed by the first
    pub fn with_dev_accounts(count: usize, clock: Timestamp) -> Self {
        let accounts: Vec<Address> = (0..count).map(dev_account).collect();
        let authority = accounts.first().copied().unwrap_or(Address::ZERO);
        Self::new(accounts, authority, clock)
    }

    pub fn with_freshness_window(mut self, seconds: u64) -> Self {
        self.state.get_mut().freshness_window = seconds;
        self
    }

    pub async fn set_authority(&self, authority: Address) {
        self.state.lock().await.authority = authority;
    }

    pub async fn advance_clock(&self, seconds: u64) {
        self.state.lock().await.clock += seconds;
    }

    /// Make the next commit revert even if its simulation passed
    pub async fn revert_next_commit(&self) {
        self.state.lock().await.revert_next_commit = true;
    }

    /// Apply the `commit`-th commit (1-based) but fail its confirmation
    pub async fn lose_confirmation_of(&self, commit: u64) {
        self.state.lock().await.lost_confirmation = Some(commit);
    }

    /// Make every simulation fail the way a node without the right opcodes does
    pub async fn set_environment_incompatible(&self, incompatible: bool) {
        self.state.lock().await.environment_incompatible = incompatible;
    }

    /// Make every call fail with a transport error
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    pub async fn reports(&self) -> Vec<AccidentReport> {
        self.state.lock().await.reports.clone()
    }

    pub async fn commit_count(&self) -> u64 {
        self.state.lock().await.commits
    }

    pub async fn simulation_count(&self) -> u64 {
        self.state.lock().await.simulations
    }
}

/// Deterministic development account at pool position `index`
pub fn dev_account(index: usize) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xd0;
    bytes[12..].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    Address::new(bytes)
}

#[async_trait]
impl LedgerClient for SimulatedRegistry {
    async fn accounts(&self) -> LedgerResult<Vec<Address>> {
        let state = self.state.lock().await;
        state.ensure_reachable()?;
        Ok(state.accounts.clone())
    }

    async fn authority(&self) -> LedgerResult<Address> {
        let state = self.state.lock().await;
        state.ensure_reachable()?;
        Ok(state.authority)
    }

    async fn is_authorized(&self, address: Address) -> LedgerResult<bool> {
        let state = self.state.lock().await;
        state.ensure_reachable()?;
        Ok(state.authorized.contains(&address))
    }

    async fn accepted_report_count(&self) -> LedgerResult<u64> {
        let state = self.state.lock().await;
        state.ensure_reachable()?;
        Ok(state.reports.len() as u64)
    }

    async fn authorized_count(&self) -> LedgerResult<u64> {
        let state = self.state.lock().await;
        state.ensure_reachable()?;
        Ok(state.authorized.len() as u64)
    }

    async fn current_time(&self) -> LedgerResult<Timestamp> {
        let state = self.state.lock().await;
        state.ensure_reachable()?;
        Ok(state.clock)
    }

    async fn simulate(&self, operation: &Operation, sender: Address) -> LedgerResult<SimulationOutcome> {
        let mut state = self.state.lock().await;
        state.ensure_reachable()?;
        state.simulations += 1;

        if state.environment_incompatible {
            return Ok(SimulationOutcome::WouldFail(
                "VM Exception while processing transaction: invalid opcode".to_string(),
            ));
        }

        Ok(match state.check(operation, sender) {
            Ok(()) => SimulationOutcome::WouldSucceed,
            Err(reason) => SimulationOutcome::WouldFail(format!("{} {}", REVERT_PREFIX, reason)),
        })
    }

    async fn commit(&self, operation: &Operation, sender: Address, gas_limit: Gas) -> LedgerResult<CommitOutcome> {
        let mut state = self.state.lock().await;
        state.ensure_reachable()?;
        state.commits += 1;
        let interval = state.block_interval;
        state.clock += interval;

        if std::mem::take(&mut state.revert_next_commit) {
            debug!("Forced revert of {}", operation);
            return Ok(CommitOutcome::Reverted);
        }

        let gas_used = gas_cost(operation);
        if gas_used > gas_limit || state.check(operation, sender).is_err() {
            return Ok(CommitOutcome::Reverted);
        }

        state.apply(operation, sender);
        if state.lost_confirmation == Some(state.commits) {
            debug!("Dropping confirmation of {}", operation);
            return Err(LedgerError::Transport("connection reset while awaiting receipt".to_string()));
        }
        Ok(CommitOutcome::Committed { gas_used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_700_000_000;

    fn report(location: &str, timestamp: Timestamp) -> Operation {
        Operation::SubmitReport {
            location: location.to_string(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_admission_is_authority_only() {
        let registry = SimulatedRegistry::with_dev_accounts(3, T0);
        let admit = Operation::AdmitParticipant { target: dev_account(2) };

        let outcome = registry.simulate(&admit, dev_account(1)).await.unwrap();
        match outcome {
            SimulationOutcome::WouldFail(reason) => {
                assert!(reason.starts_with(REVERT_PREFIX));
                assert!(reason.contains("Only Traffic Authority"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }

        let committed = registry.commit(&admit, dev_account(0), 3_000_000).await.unwrap();
        assert!(matches!(committed, CommitOutcome::Committed { .. }));
        assert!(registry.is_authorized(dev_account(2)).await.unwrap());
        assert_eq!(registry.authorized_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_report_rules() {
        let registry = SimulatedRegistry::with_dev_accounts(3, T0);
        let vehicle = dev_account(1);
        registry
            .commit(&Operation::AdmitParticipant { target: vehicle }, dev_account(0), 3_000_000)
            .await
            .unwrap();
        let now = registry.current_time().await.unwrap();

        let reason = |outcome: SimulationOutcome| match outcome {
            SimulationOutcome::WouldFail(reason) => reason,
            SimulationOutcome::WouldSucceed => String::new(),
        };

        let stranger = reason(registry.simulate(&report("x", now), dev_account(2)).await.unwrap());
        assert!(stranger.contains("Access Denied"));

        let future = reason(registry.simulate(&report("x", now + 60), vehicle).await.unwrap());
        assert!(future.contains("Future time"));

        let stale = reason(registry.simulate(&report("x", now - 600), vehicle).await.unwrap());
        assert!(stale.contains("Replay Attack"));

        let within_window = registry.simulate(&report("x", now - 300), vehicle).await.unwrap();
        assert_eq!(within_window, SimulationOutcome::WouldSucceed);
        assert_eq!(registry.simulation_count().await, 4);
        assert_eq!(registry.accepted_report_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_mines_block_and_records_report() {
        let registry = SimulatedRegistry::with_dev_accounts(2, T0);
        let vehicle = dev_account(1);
        registry
            .commit(&Operation::AdmitParticipant { target: vehicle }, dev_account(0), 3_000_000)
            .await
            .unwrap();
        assert_eq!(registry.current_time().await.unwrap(), T0 + 1);

        let operation = report("Crash Hwy 1", T0 + 1);
        let outcome = registry.commit(&operation, vehicle, 3_000_000).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { gas_used: gas_cost(&operation) });

        let reports = registry.reports().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, 1);
        assert_eq!(reports[0].reporter, vehicle);
        assert_eq!(reports[0].location, "Crash Hwy 1");
    }

    #[tokio::test]
    async fn test_forced_revert_and_gas_limit() {
        let registry = SimulatedRegistry::with_dev_accounts(2, T0);
        let admit = Operation::AdmitParticipant { target: dev_account(1) };

        registry.revert_next_commit().await;
        assert_eq!(
            registry.commit(&admit, dev_account(0), 3_000_000).await.unwrap(),
            CommitOutcome::Reverted
        );
        assert_eq!(
            registry.commit(&admit, dev_account(0), 1_000).await.unwrap(),
            CommitOutcome::Reverted
        );
        assert!(!registry.is_authorized(dev_account(1)).await.unwrap());
        assert_eq!(registry.commit_count().await, 2);
    }

    #[tokio::test]
    async fn test_lost_confirmation_still_applies() {
        let registry = SimulatedRegistry::with_dev_accounts(2, T0);
        let admit = Operation::AdmitParticipant { target: dev_account(1) };
        registry.lose_confirmation_of(1).await;

        let outcome = registry.commit(&admit, dev_account(0), 3_000_000).await;
        assert!(matches!(outcome, Err(LedgerError::Transport(_))));
        assert!(registry.is_authorized(dev_account(1)).await.unwrap());

        let outcome = registry.commit(&report("Crash Hwy 1", T0 + 1), dev_account(1), 3_000_000).await;
        assert!(matches!(outcome, Ok(CommitOutcome::Committed { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_and_incompatible() {
        let registry = SimulatedRegistry::with_dev_accounts(2, T0);
        registry.set_environment_incompatible(true).await;
        let outcome = registry.simulate(&report("x", T0), dev_account(1)).await.unwrap();
        assert!(matches!(outcome, SimulationOutcome::WouldFail(reason) if reason.contains("invalid opcode")));

        registry.set_reachable(false).await;
        assert!(matches!(registry.authority().await, Err(LedgerError::Transport(_))));
    }

    #[test]
    fn test_gas_cost_grows_with_location() {
        let short = gas_cost(&report("a", 0));
        let long = gas_cost(&report(&"a".repeat(100), 0));
        assert!(long > short);
        assert_eq!(gas_cost(&report("Crash Hwy 1", 0)), 105_087);
    }

    #[test]
    fn test_dev_accounts_are_distinct() {
        let accounts: HashSet<Address> = (0..10).map(dev_account).collect();
        assert_eq!(accounts.len(), 10);
    }
}
