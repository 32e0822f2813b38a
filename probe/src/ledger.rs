//! Ledger client seam.
//!
//! The registry under test is an external collaborator. The harness reaches it
//! only through [`LedgerClient`]: typed read queries, a non-mutating
//! simulation and a confirmed commit per state-changing [`Operation`], and the
//! ledger's own clock. Every call is a fallible remote call.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Address, Gas, Timestamp};

/// State-changing request against the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Admit `target` as a reporting participant (authority only)
    AdmitParticipant { target: Address },
    /// Submit a report for `location` observed at `timestamp`
    SubmitReport { location: String, timestamp: Timestamp },
}

impl Operation {
    /// Registry function the operation invokes
    pub fn function_name(&self) -> &'static str {
        match self {
            Operation::AdmitParticipant { .. } => "registerVehicle",
            Operation::SubmitReport { .. } => "reportAccident",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::AdmitParticipant { target } => write!(f, "registerVehicle({})", target),
            Operation::SubmitReport { location, timestamp } => {
                write!(f, "reportAccident({:?}, {})", location, timestamp)
            }
        }
    }
}

/// Result of dry-running an operation as a given sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationOutcome {
    WouldSucceed,
    /// Carries the node's failure text verbatim
    WouldFail(String),
}

/// Result of submitting an operation and waiting for inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    Committed { gas_used: Gas },
    Reverted,
}

/// Failures talking to the ledger
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with an error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered with something that could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result type for ledger calls
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Operations the harness consumes from a deployed registry
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Ordered account pool known to the node
    async fn accounts(&self) -> LedgerResult<Vec<Address>>;

    /// The registry's authority of record
    async fn authority(&self) -> LedgerResult<Address>;

    /// Whether `address` has been admitted
    async fn is_authorized(&self, address: Address) -> LedgerResult<bool>;

    /// Total number of accepted reports
    async fn accepted_report_count(&self) -> LedgerResult<u64>;

    /// Total number of admitted participants
    async fn authorized_count(&self) -> LedgerResult<u64>;

    /// Timestamp of the latest block
    async fn current_time(&self) -> LedgerResult<Timestamp>;

    /// Execute `operation` against current state without persisting effects
    async fn simulate(&self, operation: &Operation, sender: Address) -> LedgerResult<SimulationOutcome>;

    /// Submit `operation` and wait until the network confirms inclusion
    async fn commit(
        &self,
        operation: &Operation,
        sender: Address,
        gas_limit: Gas,
    ) -> LedgerResult<CommitOutcome>;
}
