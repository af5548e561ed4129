//! Wire types exchanged with the network.
//!
//! Quantities follow JSON-RPC conventions (`0x`-prefixed hex). 256-bit
//! amounts use `U256` so they survive journaling exactly.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Fee parameters of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Fees {
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
    Legacy {
        gas_price: U256,
    },
}

impl Fees {
    /// The highest price per gas the transaction may pay.
    pub fn max_price(&self) -> U256 {
        match self {
            Fees::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
            Fees::Legacy { gas_price } => *gas_price,
        }
    }
}

/// Parameters of `eth_sendTransaction`, `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "quantity::opt")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "quantity::opt")]
    pub gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
}

impl TransactionRequest {
    pub fn with_fees(mut self, fees: Fees) -> Self {
        match fees {
            Fees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                self.max_fee_per_gas = Some(max_fee_per_gas);
                self.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
            }
            Fees::Legacy { gas_price } => self.gas_price = Some(gas_price),
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "quantity::opt")]
    pub log_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_hash: B256,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(with = "quantity")]
    pub status: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == 1
    }
}

/// A transaction as returned by `eth_getTransactionByHash` or inside a full block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "quantity")]
    pub nonce: u64,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "quantity::opt")]
    pub block_number: Option<u64>,
}

impl Transaction {
    /// Returns true if the transaction performs the same effect as `request`.
    pub fn matches(&self, request: &TransactionRequest) -> bool {
        self.from == request.from
            && self.to == request.to
            && self.input == request.data
            && self.value == request.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(with = "quantity")]
    pub number: u64,
    pub hash: B256,
    #[serde(default)]
    pub base_fee_per_gas: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullBlock {
    #[serde(with = "quantity")]
    pub number: u64,
    pub hash: B256,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Outcome of a read-only call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStaticCallResult {
    pub return_data: Bytes,
    pub success: bool,
}

/// `u64` as a JSON-RPC hex quantity. Plain numbers are accepted on input.
pub mod quantity {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => parse(&s).map_err(de::Error::custom),
        }
    }

    pub fn parse(s: &str) -> Result<u64, String> {
        match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        }
        .map_err(|err| format!("invalid quantity {s}: {err}"))
    }

    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] u64);
            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(v)| v))
        }
    }
}
