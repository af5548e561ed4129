//! Run configuration.

use alloy_primitives::{address, Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deterministic deployment factory (CreateX), deployed at the same
/// address on most networks.
pub const DEFAULT_CREATE2_FACTORY: Address = address!("ba5Ed099633D3B313e4D5F7bdc1305d3c28ba5Ed");

/// How deployments are sent. Calls and sends behave the same under every
/// strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum StrategyConfig {
    /// Plain contract-creation transactions.
    #[default]
    Basic,
    /// Deterministic addresses through a `deployCreate2(bytes32,bytes)` factory.
    Create2 {
        salt: B256,
        #[serde(default = "default_factory")]
        factory: Address,
    },
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::Basic => "basic",
            StrategyConfig::Create2 { .. } => "create2",
        }
    }
}

fn default_factory() -> Address {
    DEFAULT_CREATE2_FACTORY
}

/// Configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeployConfig {
    /// Blocks on top of the inclusion block before a transaction counts as
    /// confirmed. Forced to 1 on automining networks.
    pub required_confirmations: u64,
    #[serde(with = "millis")]
    pub block_polling_interval: Duration,
    /// How long a transaction may stay pending before it is resent with
    /// higher fees.
    #[serde(with = "millis")]
    pub time_before_bumping_fees: Duration,
    /// Fee bumps allowed per interaction before the future times out.
    pub max_fee_bumps: u32,
    pub disable_fee_bumping: bool,
    pub max_batch_size: Option<usize>,
    /// Account index used when a future does not declare a sender.
    pub default_sender: usize,
    /// Refuse to send when the computed max fee per gas exceeds this.
    pub max_fee_per_gas_limit: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    /// Forces legacy pricing at this gas price.
    pub gas_price: Option<U256>,
    pub strategy: StrategyConfig,
    /// Blocks scanned backwards when looking for a transaction that was sent
    /// but never journaled.
    pub block_scan_depth: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 5,
            block_polling_interval: Duration::from_secs(1),
            time_before_bumping_fees: Duration::from_secs(3 * 60),
            max_fee_bumps: 4,
            disable_fee_bumping: false,
            max_batch_size: None,
            default_sender: 0,
            max_fee_per_gas_limit: None,
            max_priority_fee_per_gas: None,
            gas_price: None,
            strategy: StrategyConfig::Basic,
            block_scan_depth: 128,
        }
    }
}

/// `Duration` as whole milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
