//! Fee selection and bumping.

use crate::config::DeployConfig;
use crate::provider::{Fees, JsonRpcClient, ProviderError};
use alloy_primitives::U256;

/// Percentage added to the previous fees on every bump.
const BUMP_PERCENT: u64 = 10;

/// Fees for a fresh transaction: the network's suggestion with the
/// configured overrides applied.
pub async fn initial_fees(
    client: &JsonRpcClient,
    config: &DeployConfig,
) -> Result<Fees, ProviderError> {
    if let Some(gas_price) = config.gas_price {
        return Ok(Fees::Legacy { gas_price });
    }
    let fees = client.network_fees().await?;
    Ok(apply_overrides(fees, config))
}

fn apply_overrides(fees: Fees, config: &DeployConfig) -> Fees {
    match fees {
        Fees::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let priority = config
                .max_priority_fee_per_gas
                .unwrap_or(max_priority_fee_per_gas);
            Fees::Eip1559 {
                max_fee_per_gas: max_fee_per_gas.max(priority),
                max_priority_fee_per_gas: priority,
            }
        }
        legacy => legacy,
    }
}

/// Fees for a resend of a stalled transaction.
///
/// Each component grows by at least ten percent over the previous send,
/// which nodes require to accept a replacement, and never drops below the
/// network's current suggestion.
pub fn bump(previous: &Fees, network: &Fees) -> Fees {
    let grow =
        |value: U256| value + value * U256::from(BUMP_PERCENT) / U256::from(100u64) + U256::from(1u64);
    match (previous, network) {
        (
            Fees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
            Fees::Eip1559 {
                max_fee_per_gas: network_max,
                max_priority_fee_per_gas: network_priority,
            },
        ) => Fees::Eip1559 {
            max_fee_per_gas: grow(*max_fee_per_gas).max(*network_max),
            max_priority_fee_per_gas: grow(*max_priority_fee_per_gas).max(*network_priority),
        },
        (
            Fees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
            Fees::Legacy { gas_price },
        ) => Fees::Eip1559 {
            max_fee_per_gas: grow(*max_fee_per_gas).max(*gas_price),
            max_priority_fee_per_gas: grow(*max_priority_fee_per_gas),
        },
        (Fees::Legacy { gas_price }, _) => Fees::Legacy {
            gas_price: grow(*gas_price).max(network.max_price()),
        },
    }
}

/// Returns true if `fees` stay within the configured ceiling.
pub fn within_limit(fees: &Fees, config: &DeployConfig) -> bool {
    config
        .max_fee_per_gas_limit
        .map_or(true, |limit| fees.max_price() <= limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eip1559(max: u64, priority: u64) -> Fees {
        Fees::Eip1559 {
            max_fee_per_gas: U256::from(max),
            max_priority_fee_per_gas: U256::from(priority),
        }
    }

    #[test]
    fn test_bump_grows_at_least_ten_percent() {
        let bumped = bump(&eip1559(100, 10), &eip1559(50, 5));
        assert_eq!(bumped, eip1559(111, 12));

        let bumped = bump(&eip1559(100, 10), &eip1559(500, 20));
        assert_eq!(bumped, eip1559(500, 20));

        let legacy = bump(
            &Fees::Legacy {
                gas_price: U256::from(1u64),
            },
            &Fees::Legacy {
                gas_price: U256::from(1u64),
            },
        );
        assert_eq!(legacy.max_price(), U256::from(2u64));
    }

    #[test]
    fn test_overrides_and_limit() {
        let config = DeployConfig {
            max_priority_fee_per_gas: Some(U256::from(3u64)),
            max_fee_per_gas_limit: Some(U256::from(99u64)),
            ..Default::default()
        };
        let fees = apply_overrides(eip1559(90, 1), &config);
        assert_eq!(fees, eip1559(90, 3));
        assert!(within_limit(&fees, &config));
        assert!(!within_limit(&bump(&fees, &fees), &config));
    }
}
