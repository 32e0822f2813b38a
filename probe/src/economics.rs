//! Flooding-attack cost model.
//!
//! Given the gas one accepted report consumed, estimate what it would cost an
//! admitted-but-malicious participant to fill every block with reports for an
//! hour. The figures are a feasibility bound that moves with every assumption
//! below; they are never a measured cost.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Gas;

/// Wei per gwei
pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Wei per base unit (ether)
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Economic assumptions behind the estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostAssumptions {
    /// Gas available per block
    pub block_gas_capacity: Gas,
    /// Gas price in gwei
    pub gas_price_gwei: u64,
    /// Fiat value of one base unit
    pub exchange_rate: f64,
    /// Blocks produced per hour
    pub blocks_per_hour: u64,
}

impl Default for CostAssumptions {
    fn default() -> Self {
        Self {
            block_gas_capacity: 30_000_000,
            gas_price_gwei: 50,
            exchange_rate: 2500.0,
            blocks_per_hour: blocks_per_hour(Duration::from_secs(12)),
        }
    }
}

impl CostAssumptions {
    pub fn with_gas_price_gwei(mut self, gwei: u64) -> Self {
        self.gas_price_gwei = gwei;
        self
    }

    pub fn with_exchange_rate(mut self, rate: f64) -> Self {
        self.exchange_rate = rate;
        self
    }

    pub fn with_block_gas_capacity(mut self, capacity: Gas) -> Self {
        self.block_gas_capacity = capacity;
        self
    }

    /// Derive blocks per hour from a fixed block interval
    pub fn with_block_interval(mut self, interval: Duration) -> Self {
        self.blocks_per_hour = blocks_per_hour(interval);
        self
    }

    pub fn gas_price_wei(&self) -> u128 {
        u128::from(self.gas_price_gwei) * WEI_PER_GWEI
    }
}

/// Whole blocks produced in an hour at `interval`
pub fn blocks_per_hour(interval: Duration) -> u64 {
    let millis = interval.as_millis();
    if millis == 0 {
        return 0;
    }
    (3_600_000 / millis) as u64
}

/// Assumption-sensitive cost of sustaining a report flood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodCostEstimate {
    pub gas_used: Gas,
    pub transactions_per_block: u64,
    pub cost_per_transaction_wei: u128,
    pub cost_per_block_wei: u128,
    /// Fiat cost to fill every block for one hour
    pub cost_per_hour: f64,
    pub assumptions: CostAssumptions,
}

impl FloodCostEstimate {
    /// Derive the estimate; `None` when `gas_used` is zero
    pub fn compute(gas_used: Gas, assumptions: &CostAssumptions) -> Option<Self> {
        if gas_used == 0 {
            return None;
        }

        let transactions_per_block = assumptions.block_gas_capacity / gas_used;
        let cost_per_transaction_wei = u128::from(gas_used) * assumptions.gas_price_wei();
        let cost_per_block_wei = u128::from(transactions_per_block) * cost_per_transaction_wei;
        let cost_per_hour = wei_to_ether(cost_per_block_wei)
            * assumptions.exchange_rate
            * assumptions.blocks_per_hour as f64;

        Some(Self {
            gas_used,
            transactions_per_block,
            cost_per_transaction_wei,
            cost_per_block_wei,
            cost_per_hour,
            assumptions: assumptions.clone(),
        })
    }

    pub fn cost_per_transaction_ether(&self) -> f64 {
        wei_to_ether(self.cost_per_transaction_wei)
    }

    pub fn cost_per_block_ether(&self) -> f64 {
        wei_to_ether(self.cost_per_block_wei)
    }

    /// Human-readable summary, labelled as an estimate
    pub fn summary(&self) -> String {
        format!(
            "Flood cost estimate (assumption-sensitive; {} gwei, {} per unit, {} blocks/hour):\n\
             \x20 gas per report:        {}\n\
             \x20 cost per report:       {:.6}\n\
             \x20 reports per block:     {}\n\
             \x20 cost to fill 1 block:  {:.4}\n\
             \x20 cost to sustain 1 hour: {:.2}",
            self.assumptions.gas_price_gwei,
            self.assumptions.exchange_rate,
            self.assumptions.blocks_per_hour,
            self.gas_used,
            self.cost_per_transaction_ether(),
            self.transactions_per_block,
            self.cost_per_block_ether(),
            self.cost_per_hour,
        )
    }
}

fn wei_to_ether(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETHER as f64
}
