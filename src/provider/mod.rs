//! Network access.
//!
//! Everything the engine learns from or sends to the chain goes through the
//! [`Provider`] trait: a single JSON-RPC shaped `request(method, params)`
//! call. [`JsonRpcClient`] layers typed methods on top of it.

mod client;
mod dev;
mod http;
pub mod types;

pub use client::{BlockTag, JsonRpcClient};
pub use dev::{DevAccount, DevNetwork};
pub use http::HttpProvider;
pub use types::{
    Block, Fees, FullBlock, Log, RawStaticCallResult, Transaction, TransactionReceipt,
    TransactionRequest,
};

use alloy_primitives::{hex, Bytes};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// JSON-RPC error code nodes use for reverted executions.
pub const EXECUTION_REVERTED: i64 = 3;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response to {method}: {message}")]
    InvalidResponse { method: String, message: String },
    #[error("method {0} is not supported")]
    UnsupportedMethod(String),
}

impl ProviderError {
    /// Return data of a reverted execution, when the node reported one.
    pub fn revert_data(&self) -> Option<Bytes> {
        let ProviderError::Rpc { data: Some(data), .. } = self else {
            return None;
        };
        let encoded = data
            .as_str()
            .or_else(|| data.get("data").and_then(Value::as_str))?;
        hex::decode(encoded).ok().map(Bytes::from)
    }

    /// Returns true if the node rejected the request because execution reverted.
    pub fn is_revert(&self) -> bool {
        match self {
            ProviderError::Rpc { code, message, .. } => {
                *code == EXECUTION_REVERTED || message.contains("revert")
            }
            _ => false,
        }
    }
}

/// A JSON-RPC request/response channel to a network.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        (**self).request(method, params).await
    }
}
