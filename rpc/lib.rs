//! JSON-RPC ledger adapter for the registry probe
//!
//! This crate connects the scenario harness in `registry-probe` to a deployed
//! registry contract on an Ethereum-compatible development node. Queries and
//! simulations are `eth_call`s; commits go through `eth_sendTransaction` from
//! the node's unlocked accounts and are confirmed by polling for the receipt.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use registry_probe::{run_probe, ProbeConfig};
//! use registry_probe_rpc::JsonRpcLedger;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = ProbeConfig::load(None)?;
//! let ledger = JsonRpcLedger::from_config(&config)?;
//! let report = run_probe(&ledger, config).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod abi;
pub mod jsonrpc;

use std::time::Duration;

use async_trait::async_trait;
use registry_probe::{
    Address, CommitOutcome, Gas, LedgerClient, LedgerError, LedgerResult, Operation, ProbeConfig, SimulationOutcome,
    Timestamp,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::abi::Token;
use crate::jsonrpc::{decode_data, encode_data, parse_quantity, CallError, JsonRpcTransport};

/// Canonical signatures of the registry functions
pub mod signatures {
    pub const REGISTER_VEHICLE: &str = "registerVehicle(address)";
    pub const REPORT_ACCIDENT: &str = "reportAccident(string,uint256)";
    pub const TRAFFIC_AUTHORITY: &str = "trafficAuthority()";
    pub const AUTHORIZED_VEHICLES: &str = "authorizedVehicles(address)";
    pub const ACCIDENT_COUNT: &str = "getAccidentCount()";
    pub const AUTHORIZED_VEHICLE_COUNT: &str = "getAuthorizedVehicleCount()";
}

/// Calldata for a state-changing registry operation
pub fn calldata(operation: &Operation) -> Vec<u8> {
    match operation {
        Operation::AdmitParticipant { target } => {
            abi::encode_call(signatures::REGISTER_VEHICLE, &[Token::Address(*target)])
        }
        Operation::SubmitReport { location, timestamp } => abi::encode_call(
            signatures::REPORT_ACCIDENT,
            &[Token::String(location.as_str()), Token::Uint(*timestamp)],
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    #[serde(default)]
    status: Option<String>,
    gas_used: String,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

/// [`LedgerClient`] backed by a node's JSON-RPC endpoint
pub struct JsonRpcLedger {
    transport: JsonRpcTransport,
    registry: Address,
    poll_interval: Duration,
}

impl JsonRpcLedger {
    pub fn new(
        url: impl Into<String>,
        registry: Address,
        request_timeout: Duration,
        poll_interval: Duration,
    ) -> LedgerResult<Self> {
        Ok(Self {
            transport: JsonRpcTransport::new(url, request_timeout)?,
            registry,
            poll_interval,
        })
    }

    pub fn from_config(config: &ProbeConfig) -> LedgerResult<Self> {
        Self::new(
            config.network.rpc_url.clone(),
            config.network.registry_address,
            config.request_timeout(),
            config.receipt_poll_interval(),
        )
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    async fn eth_call(&self, from: Option<Address>, data: &[u8]) -> Result<Vec<u8>, CallError> {
        let mut call = json!({
            "to": self.registry.to_string(),
            "data": encode_data(data),
        });
        if let Some(from) = from {
            call["from"] = Value::String(from.to_string());
        }
        let result: String = self.transport.call("eth_call", json!([call, "latest"])).await?;
        decode_data(&result).map_err(|e| CallError::Decode(e.to_string()))
    }

    async fn query(&self, signature: &str, args: &[Token<'_>]) -> LedgerResult<Vec<u8>> {
        Ok(self.eth_call(None, &abi::encode_call(signature, args)).await?)
    }

    async fn wait_for_receipt(&self, hash: &str) -> LedgerResult<Receipt> {
        loop {
            let receipt: Option<Receipt> = self
                .transport
                .call("eth_getTransactionReceipt", json!([hash]))
                .await?;
            match receipt {
                Some(receipt) => return Ok(receipt),
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

fn decode_err(err: abi::AbiError) -> LedgerError {
    LedgerError::Decode(err.to_string())
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn accounts(&self) -> LedgerResult<Vec<Address>> {
        Ok(self.transport.call("eth_accounts", json!([])).await?)
    }

    async fn authority(&self) -> LedgerResult<Address> {
        let data = self.query(signatures::TRAFFIC_AUTHORITY, &[]).await?;
        abi::decode_address(&data).map_err(decode_err)
    }

    async fn is_authorized(&self, address: Address) -> LedgerResult<bool> {
        let data = self.query(signatures::AUTHORIZED_VEHICLES, &[Token::Address(address)]).await?;
        abi::decode_bool(&data).map_err(decode_err)
    }

    async fn accepted_report_count(&self) -> LedgerResult<u64> {
        let data = self.query(signatures::ACCIDENT_COUNT, &[]).await?;
        abi::decode_uint(&data).map_err(decode_err)
    }

    async fn authorized_count(&self) -> LedgerResult<u64> {
        let data = self.query(signatures::AUTHORIZED_VEHICLE_COUNT, &[]).await?;
        abi::decode_uint(&data).map_err(decode_err)
    }

    async fn current_time(&self) -> LedgerResult<Timestamp> {
        let block: Option<BlockHeader> = self
            .transport
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let block = block.ok_or_else(|| LedgerError::Decode("node returned no latest block".to_string()))?;
        parse_quantity(&block.timestamp)
    }

    async fn simulate(&self, operation: &Operation, sender: Address) -> LedgerResult<SimulationOutcome> {
        match self.eth_call(Some(sender), &calldata(operation)).await {
            Ok(_) => Ok(SimulationOutcome::WouldSucceed),
            Err(CallError::Rpc(error)) => {
                debug!("eth_call for {} failed: {}", operation, error.message);
                Ok(SimulationOutcome::WouldFail(error.failure_text()))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn commit(&self, operation: &Operation, sender: Address, gas_limit: Gas) -> LedgerResult<CommitOutcome> {
        let transaction = json!({
            "from": sender.to_string(),
            "to": self.registry.to_string(),
            "gas": format!("{:#x}", gas_limit),
            "data": encode_data(&calldata(operation)),
        });

        let hash: String = match self.transport.call("eth_sendTransaction", json!([transaction])).await {
            Ok(hash) => hash,
            Err(CallError::Rpc(error)) if error.is_revert() => {
                // Nodes that execute on submission reject a reverting transaction outright
                warn!("eth_sendTransaction for {} reverted: {}", operation, error.failure_text());
                return Ok(CommitOutcome::Reverted);
            }
            Err(other) => return Err(other.into()),
        };
        debug!("Submitted {} as {}", operation, hash);

        let receipt = self.wait_for_receipt(&hash).await?;
        let succeeded = match receipt.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            None => true,
        };
        if !succeeded {
            return Ok(CommitOutcome::Reverted);
        }
        Ok(CommitOutcome::Committed {
            gas_used: parse_quantity(&receipt.gas_used)?,
        })
    }
}
