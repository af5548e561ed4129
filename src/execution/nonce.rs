//! Per-sender nonce allocation.

use crate::provider::{BlockTag, JsonRpcClient, ProviderError};
use alloy_primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Hands out nonces so that a sender's interactions get strictly increasing,
/// gapless nonces even when futures of the same batch run concurrently.
///
/// The next nonce of each sender is cached for the run and only fetched from
/// the network the first time the sender is used.
#[derive(Debug, Default)]
pub struct NonceManager {
    next: DashMap<Address, Arc<Mutex<Option<u64>>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes exclusive use of `sender`'s nonce sequence.
    ///
    /// The guard should be held until the transaction using the nonce has
    /// been handed to the network, so no other interaction can slip in
    /// between allocation and send.
    pub async fn lock(&self, sender: Address) -> NonceGuard {
        let slot = self.next.entry(sender).or_default().clone();
        NonceGuard {
            sender,
            next: slot.lock_owned().await,
        }
    }
}

/// Exclusive access to one sender's next nonce.
pub struct NonceGuard {
    sender: Address,
    next: OwnedMutexGuard<Option<u64>>,
}

impl NonceGuard {
    /// The nonce the next interaction of this sender should use.
    ///
    /// `floor` is one past the highest nonce already recorded for the sender;
    /// recorded nonces may belong to transactions the network has not seen
    /// yet.
    pub async fn peek(
        &mut self,
        client: &JsonRpcClient,
        floor: Option<u64>,
    ) -> Result<u64, ProviderError> {
        let cached = match *self.next {
            Some(next) => next,
            None => {
                let pending = client
                    .transaction_count(self.sender, BlockTag::Pending)
                    .await?;
                debug!(sender = %self.sender, pending, "fetched nonce from network");
                *self.next = Some(pending);
                pending
            }
        };
        Ok(cached.max(floor.unwrap_or(0)))
    }

    /// Marks `nonce` as taken.
    pub fn commit(&mut self, nonce: u64) {
        *self.next = Some(nonce + 1);
    }

    /// Marks a nonce recorded in an earlier run as taken, without fetching
    /// from the network.
    pub fn reserve(&mut self, nonce: u64) {
        if let Some(next) = *self.next {
            if next <= nonce {
                *self.next = Some(nonce + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{DevNetwork, Provider};

    #[tokio::test]
    async fn test_nonces_are_cached_and_increasing() {
        let network = Arc::new(DevNetwork::new(1, 7));
        let sender = network.accounts()[0].address;
        let client = JsonRpcClient::new(network as Arc<dyn Provider>);
        let nonces = NonceManager::new();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let mut guard = nonces.lock(sender).await;
            let nonce = guard.peek(&client, None).await.unwrap();
            guard.commit(nonce);
            seen.push(nonce);
        }
        assert_eq!(seen, vec![0, 1, 2]);

        let mut guard = nonces.lock(sender).await;
        assert_eq!(guard.peek(&client, Some(9)).await.unwrap(), 9);
    }
}
