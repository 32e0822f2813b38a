//! JSON-RPC 2.0 transport over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use registry_probe::LedgerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::abi;

/// Error object returned by the node
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Revert reason carried in `data`, in any of the shapes common nodes use
    pub fn revert_reason(&self) -> Option<String> {
        self.data.as_ref().and_then(find_revert_reason)
    }

    /// Whether the node rejected the call because execution reverted
    pub fn is_revert(&self) -> bool {
        self.revert_reason().is_some() || self.message.contains("revert")
    }

    /// Node message, extended with the decoded revert reason when it adds anything
    pub fn failure_text(&self) -> String {
        match self.revert_reason() {
            Some(reason) if !self.message.contains(&reason) => format!("{}: {}", self.message, reason),
            _ => self.message.clone(),
        }
    }
}

fn find_revert_reason(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let payload = hex::decode(text.strip_prefix("0x")?).ok()?;
            abi::decode_revert_reason(&payload)
        }
        Value::Object(map) => {
            if let Some(Value::String(reason)) = map.get("reason") {
                return Some(reason.clone());
            }
            map.values().find_map(find_revert_reason)
        }
        Value::Array(items) => items.iter().find_map(find_revert_reason),
        _ => None,
    }
}

/// Why a call did not produce a result
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// The request never got a well-formed answer
    Transport(String),
    /// The node answered with an error object
    Rpc(RpcErrorObject),
    /// The result did not have the expected shape
    Decode(String),
}

impl From<CallError> for LedgerError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Transport(message) => LedgerError::Transport(message),
            CallError::Rpc(object) => LedgerError::Rpc {
                code: object.code,
                message: object.failure_text(),
            },
            CallError::Decode(message) => LedgerError::Decode(message),
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// HTTP JSON-RPC client with a per-request timeout
pub struct JsonRpcTransport {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue `method` and decode its result as `T`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, CallError> {
        let request = Request {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!("-> {} #{}", method, request.id);

        let response: Response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Transport(format!("request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| CallError::Transport(format!("invalid response: {}", e)))?;

        if let Some(error) = response.error {
            trace!("<- {} error {}: {}", method, error.code, error.message);
            return Err(CallError::Rpc(error));
        }
        serde_json::from_value(response.result)
            .map_err(|e| CallError::Decode(format!("unexpected {} result: {}", method, e)))
    }
}

/// Parse a hex quantity such as `0x1b4`
pub fn parse_quantity(text: &str) -> Result<u64, LedgerError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Decode(format!("quantity without 0x prefix: {}", text)))?;
    if digits.is_empty() {
        return Err(LedgerError::Decode("empty quantity".to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|e| LedgerError::Decode(format!("invalid quantity {}: {}", text, e)))
}

/// Hex data with a `0x` prefix
pub fn encode_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_data(text: &str) -> Result<Vec<u8>, LedgerError> {
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|e| LedgerError::Decode(format!("invalid hex data: {}", e)))
}
