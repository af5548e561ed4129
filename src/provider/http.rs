//! JSON-RPC over HTTP.

use super::{Provider, ProviderError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct HttpProvider {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?
            .json()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(ProviderError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data: error.get("data").cloned(),
            });
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| ProviderError::InvalidResponse {
                method: method.to_string(),
                message: "response has neither result nor error".to_string(),
            })
    }
}
