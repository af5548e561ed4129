//! Typed JSON-RPC methods over a [`Provider`].

use super::types::{
    quantity, Block, Fees, FullBlock, RawStaticCallResult, Transaction, TransactionReceipt,
    TransactionRequest,
};
use super::{Provider, ProviderError};
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::trace;

/// Priority fee used when the node cannot suggest one (1 gwei).
const DEFAULT_PRIORITY_FEE: u64 = 1_000_000_000;

/// Block selector for state queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
    Number(u64),
}

impl BlockTag {
    fn to_value(self) -> Value {
        match self {
            BlockTag::Latest => json!("latest"),
            BlockTag::Pending => json!("pending"),
            BlockTag::Number(n) => json!(format!("{n:#x}")),
        }
    }
}

/// Typed wrapper over a shared provider.
#[derive(Clone)]
pub struct JsonRpcClient {
    provider: Arc<dyn Provider>,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient").finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ProviderError> {
        trace!(method, %params, "rpc request");
        let value = self.provider.request(method, params).await?;
        serde_json::from_value(value).map_err(|err| ProviderError::InvalidResponse {
            method: method.to_string(),
            message: err.to_string(),
        })
    }

    async fn call_quantity(&self, method: &str, params: Value) -> Result<u64, ProviderError> {
        let raw: String = self.call_typed(method, params).await?;
        quantity::parse(&raw).map_err(|message| ProviderError::InvalidResponse {
            method: method.to_string(),
            message,
        })
    }

    pub async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.call_quantity("eth_chainId", json!([])).await
    }

    pub async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.call_typed("eth_accounts", json!([])).await
    }

    pub async fn block_number(&self) -> Result<u64, ProviderError> {
        self.call_quantity("eth_blockNumber", json!([])).await
    }

    pub async fn latest_block(&self) -> Result<Block, ProviderError> {
        self.call_typed("eth_getBlockByNumber", json!(["latest", false]))
            .await
    }

    pub async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<FullBlock>, ProviderError> {
        self.call_typed(
            "eth_getBlockByNumber",
            json!([BlockTag::Number(number).to_value(), true]),
        )
        .await
    }

    pub async fn transaction_count(
        &self,
        address: Address,
        tag: BlockTag,
    ) -> Result<u64, ProviderError> {
        self.call_quantity("eth_getTransactionCount", json!([address, tag.to_value()]))
            .await
    }

    pub async fn gas_price(&self) -> Result<U256, ProviderError> {
        self.call_typed("eth_gasPrice", json!([])).await
    }

    pub async fn max_priority_fee(&self) -> Result<U256, ProviderError> {
        self.call_typed("eth_maxPriorityFeePerGas", json!([])).await
    }

    /// Fees suggested by the network: EIP-1559 when the latest block has a
    /// base fee, legacy gas price otherwise.
    pub async fn network_fees(&self) -> Result<Fees, ProviderError> {
        let block = self.latest_block().await?;
        match block.base_fee_per_gas {
            Some(base_fee) => {
                let priority = self
                    .max_priority_fee()
                    .await
                    .unwrap_or(U256::from(DEFAULT_PRIORITY_FEE));
                Ok(Fees::Eip1559 {
                    max_fee_per_gas: base_fee * U256::from(2u64) + priority,
                    max_priority_fee_per_gas: priority,
                })
            }
            None => Ok(Fees::Legacy {
                gas_price: self.gas_price().await?,
            }),
        }
    }

    pub async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ProviderError> {
        self.call_quantity("eth_estimateGas", json!([request])).await
    }

    /// Performs a read-only call. A reverted execution is a successful
    /// request with `success: false`.
    pub async fn call(
        &self,
        request: &TransactionRequest,
        tag: BlockTag,
    ) -> Result<RawStaticCallResult, ProviderError> {
        match self
            .call_typed::<Bytes>("eth_call", json!([request, tag.to_value()]))
            .await
        {
            Ok(return_data) => Ok(RawStaticCallResult {
                return_data,
                success: true,
            }),
            Err(err) if err.is_revert() => Ok(RawStaticCallResult {
                return_data: err.revert_data().unwrap_or_default(),
                success: false,
            }),
            Err(err) => Err(err),
        }
    }

    pub async fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<B256, ProviderError> {
        self.call_typed("eth_sendTransaction", json!([request])).await
    }

    pub async fn transaction(&self, hash: B256) -> Result<Option<Transaction>, ProviderError> {
        self.call_typed("eth_getTransactionByHash", json!([hash]))
            .await
    }

    pub async fn receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, ProviderError> {
        self.call_typed("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    /// Returns true if the network mines a block per transaction.
    ///
    /// Networks that do not answer any of the known automine queries are
    /// treated as real, interval-mined networks.
    pub async fn is_automining(&self) -> bool {
        for method in ["hardhat_getAutomine", "anvil_getAutomine"] {
            if let Ok(automine) = self.call_typed::<bool>(method, json!([])).await {
                return automine;
            }
        }
        false
    }
}
