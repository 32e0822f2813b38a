//! Probe configuration.
//!
//! All values have defaults suited to a local development node. A TOML file
//! and `REGISTRY_PROBE__<SECTION>__<KEY>` environment variables are layered on
//! top through the `config` crate; callers may override further with the
//! builder methods. The configuration is passed into the harness explicitly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Address, CostAssumptions, Gas, ProbeError, ProbeResult, RolePositions};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "REGISTRY_PROBE";

/// Registry address the bundled deployment scripts use
pub const DEFAULT_REGISTRY_ADDRESS: Address = Address::new([
    0x06, 0x16, 0x89, 0xfe, 0x75, 0x34, 0xe4, 0xec, 0x3d, 0xbf, 0xcc, 0x37, 0x6c, 0x79, 0xd0, 0x9f, 0x0f, 0xcc,
    0xa2, 0x9a,
]);

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub network: NetworkConfig,
    pub roles: RolePositions,
    pub gas: GasConfig,
    pub economics: CostAssumptions,
    pub scenarios: ScenarioConfig,
}

/// Node endpoint and wait bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub registry_address: Address,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Single bounded wait for a commit to be confirmed
    pub commit_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            registry_address: DEFAULT_REGISTRY_ADDRESS,
            request_timeout_secs: 10,
            commit_timeout_secs: 60,
            receipt_poll_interval_ms: 250,
        }
    }
}

/// Gas settings for commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Fixed ceiling supplied on every commit; never estimated per operation
    pub commit_gas_limit: Gas,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            commit_gas_limit: 3_000_000,
        }
    }
}

/// Curated scenario payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Location used by the legitimate report and the replay
    pub report_location: String,
    /// Location used by the impersonation attempt
    pub forged_location: String,
    /// How far before the legitimate report the replay is dated
    pub replay_offset_secs: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            report_location: "Crash Hwy 1".to_string(),
            forged_location: "Fake Crash".to_string(),
            replay_offset_secs: 600,
        }
    }
}

impl ProbeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults, then `path` (if given and present), then environment overrides
    pub fn load(path: Option<&Path>) -> ProbeResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let loaded: ProbeConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|e| ProbeError::InvalidConfig(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a TOML document; missing keys take defaults
    pub fn from_toml_str(contents: &str) -> ProbeResult<Self> {
        let parsed: ProbeConfig =
            toml::from_str(contents).map_err(|e| ProbeError::InvalidConfig(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.network.rpc_url = url.into();
        self
    }

    pub fn with_registry_address(mut self, address: Address) -> Self {
        self.network.registry_address = address;
        self
    }

    pub fn with_role_positions(mut self, positions: RolePositions) -> Self {
        self.roles = positions;
        self
    }

    pub fn with_economics(mut self, economics: CostAssumptions) -> Self {
        self.economics = economics;
        self
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.network.commit_timeout_secs = timeout.as_secs();
        self
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.network.commit_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.network.receipt_poll_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ProbeResult<()> {
        let invalid = |message: &str| Err(ProbeError::InvalidConfig(message.to_string()));

        if self.network.rpc_url.trim().is_empty() {
            return invalid("rpc_url must not be empty");
        }
        if self.network.commit_timeout_secs == 0 {
            return invalid("commit_timeout_secs must be positive");
        }
        if self.network.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be positive");
        }
        if self.network.receipt_poll_interval_ms == 0 {
            return invalid("receipt_poll_interval_ms must be positive");
        }
        if self.gas.commit_gas_limit == 0 {
            return invalid("commit_gas_limit must be positive");
        }
        if self.economics.block_gas_capacity == 0 {
            return invalid("block_gas_capacity must be positive");
        }
        if self.economics.blocks_per_hour == 0 {
            return invalid("blocks_per_hour must be positive");
        }
        if !self.economics.exchange_rate.is_finite() || self.economics.exchange_rate < 0.0 {
            return invalid("exchange_rate must be a non-negative number");
        }
        if self.scenarios.replay_offset_secs == 0 {
            return invalid("replay_offset_secs must be positive");
        }
        Ok(())
    }
}
