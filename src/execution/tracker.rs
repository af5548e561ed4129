//! Transaction Tracker.
//!
//! Drives one on-chain interaction from "requested" to "confirmed": nonce
//! allocation, fees, sending, confirmation polling, fee bumps, drop detection
//! and recovery of transactions that were sent but never journaled.
//!
//! The loop is state driven. Every iteration rereads the interaction from the
//! deployment store and decides the next step from what was journaled, so the
//! same code resumes an interaction after a crash.

use super::fees;
use super::nonce::NonceManager;
use super::ExecutionError;
use crate::clock::Clock;
use crate::config::DeployConfig;
use crate::journal::JournalMessage;
use crate::provider::{
    BlockTag, Fees, JsonRpcClient, ProviderError, RawStaticCallResult, Transaction,
    TransactionReceipt, TransactionRequest,
};
use crate::state::{
    DeploymentStore, NetworkInteraction, OnchainInteraction, SentTransaction,
    StaticCallInteraction,
};
use alloy_primitives::{Address, Bytes};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How an on-chain interaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Mined with enough confirmations. The receipt may still be a revert.
    Confirmed(TransactionReceipt),
    /// Never sent: simulation showed it would revert with this return data.
    SimulationReverted(Bytes),
    /// Still unconfirmed after every allowed fee bump.
    TimedOut,
}

/// Where a sent interaction stands on the network.
enum SentStatus {
    Confirmed,
    AwaitingConfirmations,
    Pending,
    Dropped,
    Replaced,
}

/// Where a prepared but unsent interaction stands on the network.
enum Recovery {
    Adopted,
    Replaced,
    InMempool,
    Unused,
}

pub struct TransactionTracker {
    client: JsonRpcClient,
    store: Arc<DeploymentStore>,
    nonces: NonceManager,
    clock: Arc<dyn Clock>,
    config: Arc<DeployConfig>,
    automining: bool,
    cancel: CancellationToken,
}

impl TransactionTracker {
    pub fn new(
        client: JsonRpcClient,
        store: Arc<DeploymentStore>,
        clock: Arc<dyn Clock>,
        config: Arc<DeployConfig>,
        automining: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            store,
            nonces: NonceManager::new(),
            clock,
            config,
            automining,
            cancel,
        }
    }

    pub fn client(&self) -> &JsonRpcClient {
        &self.client
    }

    pub fn required_confirmations(&self) -> u64 {
        if self.automining {
            1
        } else {
            self.config.required_confirmations.max(1)
        }
    }

    /// Runs a journaled on-chain interaction until it is confirmed, reverts
    /// in simulation or times out.
    pub async fn run_onchain(
        &self,
        future_id: &str,
        interaction_id: u32,
    ) -> Result<InteractionOutcome, ExecutionError> {
        let mut last_send = self.clock.now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }
            let interaction = self.onchain(future_id, interaction_id);
            if let Some(receipt) = interaction.receipt {
                return Ok(InteractionOutcome::Confirmed(receipt));
            }

            if interaction.transactions.is_empty() {
                match interaction.nonce {
                    None => {
                        let request = request_for(&interaction);
                        let gas_limit = match self.client.estimate_gas(&request).await {
                            Ok(gas) => gas,
                            Err(err) => return self.simulation_failure(&request, err).await,
                        };
                        self.send_with_new_nonce(future_id, &interaction, gas_limit)
                            .await?;
                        last_send = self.clock.now();
                    }
                    Some(nonce) => match self.recover(future_id, &interaction, nonce).await? {
                        Recovery::Adopted | Recovery::Replaced => {}
                        Recovery::InMempool => {
                            self.sleep(self.config.block_polling_interval).await?
                        }
                        Recovery::Unused => {
                            let request = request_for(&interaction);
                            let gas_limit = match self.client.estimate_gas(&request).await {
                                Ok(gas) => gas,
                                Err(err) => return self.simulation_failure(&request, err).await,
                            };
                            let mut guard = self.nonces.lock(interaction.from).await;
                            guard.reserve(nonce);
                            let fees = self.initial_fees(future_id).await?;
                            self.send(future_id, &interaction, nonce, fees, gas_limit)
                                .await?;
                            last_send = self.clock.now();
                        }
                    },
                }
                continue;
            }

            match self.check_sent(future_id, &interaction).await? {
                SentStatus::Confirmed => continue,
                SentStatus::AwaitingConfirmations => {}
                SentStatus::Dropped => {
                    warn!(future_id, interaction_id, "transaction dropped, resending");
                    self.store.apply(JournalMessage::InteractionDropped {
                        future_id: future_id.to_string(),
                        interaction_id,
                    })?;
                    continue;
                }
                SentStatus::Replaced => {
                    warn!(
                        future_id,
                        interaction_id,
                        nonce = ?interaction.nonce,
                        "nonce used by another transaction, allocating a new one"
                    );
                    self.store.apply(JournalMessage::InteractionReplacedByUser {
                        future_id: future_id.to_string(),
                        interaction_id,
                    })?;
                    continue;
                }
                SentStatus::Pending if !self.automining => {
                    if self.clock.now().saturating_sub(last_send)
                        >= self.config.time_before_bumping_fees
                    {
                        if !self.bump_fees(future_id, &interaction).await? {
                            return Ok(InteractionOutcome::TimedOut);
                        }
                        last_send = self.clock.now();
                    }
                }
                SentStatus::Pending => {}
            }
            self.sleep(self.config.block_polling_interval).await?;
        }
    }

    /// Performs a journaled static call, or returns its recorded result.
    pub async fn run_static_call(
        &self,
        future_id: &str,
        interaction_id: u32,
    ) -> Result<RawStaticCallResult, ExecutionError> {
        let call = self.static_call(future_id, interaction_id);
        if let Some(result) = call.result {
            return Ok(result);
        }
        let request = TransactionRequest {
            from: call.from,
            to: Some(call.to),
            data: call.data.clone(),
            ..Default::default()
        };
        let result = self.client.call(&request, BlockTag::Latest).await?;
        self.store.apply(JournalMessage::StaticCallCompleted {
            future_id: future_id.to_string(),
            interaction_id,
            result: result.clone(),
        })?;
        Ok(result)
    }

    // ========================================================================
    // Sending
    // ========================================================================

    async fn send_with_new_nonce(
        &self,
        future_id: &str,
        interaction: &OnchainInteraction,
        gas_limit: u64,
    ) -> Result<(), ExecutionError> {
        let fees = self.initial_fees(future_id).await?;
        // Held until the transaction is handed to the network.
        let mut guard = self.nonces.lock(interaction.from).await;
        let floor = self
            .store
            .with_state(|state| state.max_nonce(interaction.from))
            .map(|n| n + 1);
        let nonce = guard.peek(&self.client, floor).await?;
        self.store.apply(JournalMessage::TransactionPrepared {
            future_id: future_id.to_string(),
            interaction_id: interaction.id,
            nonce,
        })?;
        guard.commit(nonce);
        self.send(future_id, interaction, nonce, fees, gas_limit)
            .await
    }

    async fn send(
        &self,
        future_id: &str,
        interaction: &OnchainInteraction,
        nonce: u64,
        fees: Fees,
        gas_limit: u64,
    ) -> Result<(), ExecutionError> {
        let request = TransactionRequest {
            nonce: Some(nonce),
            gas: Some(gas_limit),
            ..request_for(interaction)
        }
        .with_fees(fees);
        let hash = self.client.send_transaction(&request).await?;
        self.store.apply(JournalMessage::TransactionSent {
            future_id: future_id.to_string(),
            interaction_id: interaction.id,
            nonce,
            transaction: SentTransaction {
                hash,
                fees,
                gas_limit,
            },
        })?;
        info!(future_id, nonce, %hash, "transaction sent");
        Ok(())
    }

    async fn initial_fees(&self, future_id: &str) -> Result<Fees, ExecutionError> {
        let fees = fees::initial_fees(&self.client, &self.config).await?;
        if !fees::within_limit(&fees, &self.config) {
            return Err(ExecutionError::FeeLimitExceeded {
                future: future_id.to_string(),
                fees: fees.max_price(),
            });
        }
        Ok(fees)
    }

    /// Resends the pending transaction with higher fees. Returns false when
    /// no further bump is allowed.
    async fn bump_fees(
        &self,
        future_id: &str,
        interaction: &OnchainInteraction,
    ) -> Result<bool, ExecutionError> {
        if self.config.disable_fee_bumping || interaction.fee_bumps >= self.config.max_fee_bumps {
            warn!(
                future_id,
                fee_bumps = interaction.fee_bumps,
                "transaction still pending, giving up"
            );
            return Ok(false);
        }
        let (Some(nonce), Some(last)) = (interaction.nonce, interaction.last_transaction()) else {
            panic!(
                "fee bump for {future_id} interaction {} without a sent transaction",
                interaction.id
            );
        };

        let network = fees::initial_fees(&self.client, &self.config).await?;
        let bumped = fees::bump(&last.fees, &network);
        if !fees::within_limit(&bumped, &self.config) {
            warn!(future_id, fees = %bumped.max_price(), "bumped fees exceed the configured limit");
            return Ok(false);
        }

        self.store.apply(JournalMessage::FeeBump {
            future_id: future_id.to_string(),
            interaction_id: interaction.id,
        })?;
        info!(
            future_id,
            nonce,
            bump = interaction.fee_bumps + 1,
            "bumping fees"
        );
        self.send(future_id, interaction, nonce, bumped, last.gas_limit)
            .await?;
        Ok(true)
    }

    async fn simulation_failure(
        &self,
        request: &TransactionRequest,
        estimate_error: ProviderError,
    ) -> Result<InteractionOutcome, ExecutionError> {
        let simulated = self.client.call(request, BlockTag::Latest).await?;
        if !simulated.success {
            return Ok(InteractionOutcome::SimulationReverted(simulated.return_data));
        }
        if estimate_error.is_revert() {
            return Ok(InteractionOutcome::SimulationReverted(
                estimate_error.revert_data().unwrap_or_default(),
            ));
        }
        Err(estimate_error.into())
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    async fn check_sent(
        &self,
        future_id: &str,
        interaction: &OnchainInteraction,
    ) -> Result<SentStatus, ExecutionError> {
        let Some(nonce) = interaction.nonce else {
            panic!(
                "{future_id} interaction {} has transactions but no nonce",
                interaction.id
            );
        };
        // Read before the receipts: a transaction of ours mined before this
        // point always shows up below.
        let mined_count = self
            .client
            .transaction_count(interaction.from, BlockTag::Latest)
            .await?;

        for sent in interaction.transactions.iter().rev() {
            let Some(receipt) = self.client.receipt(sent.hash).await? else {
                continue;
            };
            let head = self.client.block_number().await?;
            let confirmations = head.saturating_sub(receipt.block_number) + 1;
            if confirmations < self.required_confirmations() {
                debug!(future_id, hash = %sent.hash, confirmations, "waiting for confirmations");
                return Ok(SentStatus::AwaitingConfirmations);
            }
            info!(future_id, hash = %sent.hash, block = receipt.block_number, "transaction confirmed");
            self.store.apply(JournalMessage::TransactionConfirmed {
                future_id: future_id.to_string(),
                interaction_id: interaction.id,
                receipt,
            })?;
            return Ok(SentStatus::Confirmed);
        }

        if mined_count > nonce {
            return Ok(SentStatus::Replaced);
        }
        for sent in &interaction.transactions {
            if self.client.transaction(sent.hash).await?.is_some() {
                return Ok(SentStatus::Pending);
            }
        }
        Ok(SentStatus::Dropped)
    }

    /// Settles an interaction whose nonce was journaled without a matching
    /// sent transaction.
    async fn recover(
        &self,
        future_id: &str,
        interaction: &OnchainInteraction,
        nonce: u64,
    ) -> Result<Recovery, ExecutionError> {
        let mined = self
            .client
            .transaction_count(interaction.from, BlockTag::Latest)
            .await?;
        if mined > nonce {
            let request = request_for(interaction);
            return match self.find_mined(interaction.from, nonce).await? {
                Some(tx) if tx.matches(&request) => {
                    info!(future_id, nonce, hash = %tx.hash, "adopting unrecorded transaction");
                    let fees = fees::initial_fees(&self.client, &self.config).await?;
                    self.store.apply(JournalMessage::TransactionSent {
                        future_id: future_id.to_string(),
                        interaction_id: interaction.id,
                        nonce,
                        transaction: SentTransaction {
                            hash: tx.hash,
                            fees,
                            // Already mined, so it is never resent.
                            gas_limit: 0,
                        },
                    })?;
                    Ok(Recovery::Adopted)
                }
                _ => {
                    warn!(future_id, nonce, "prepared nonce was used by another transaction");
                    self.store.apply(JournalMessage::InteractionReplacedByUser {
                        future_id: future_id.to_string(),
                        interaction_id: interaction.id,
                    })?;
                    Ok(Recovery::Replaced)
                }
            };
        }

        let pending = self
            .client
            .transaction_count(interaction.from, BlockTag::Pending)
            .await?;
        if pending > nonce {
            debug!(future_id, nonce, "prepared transaction is in the mempool");
            return Ok(Recovery::InMempool);
        }
        Ok(Recovery::Unused)
    }

    /// Scans recent blocks for `sender`'s transaction with `nonce`.
    async fn find_mined(
        &self,
        sender: Address,
        nonce: u64,
    ) -> Result<Option<Transaction>, ExecutionError> {
        let head = self.client.block_number().await?;
        let oldest = head.saturating_sub(self.config.block_scan_depth);
        for number in (oldest..=head).rev() {
            let Some(block) = self.client.block_with_transactions(number).await? else {
                continue;
            };
            if let Some(tx) = block
                .transactions
                .into_iter()
                .find(|tx| tx.from == sender && tx.nonce == nonce)
            {
                return Ok(Some(tx));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn sleep(&self, duration: Duration) -> Result<(), ExecutionError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionError::Cancelled),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }

    fn onchain(&self, future_id: &str, interaction_id: u32) -> OnchainInteraction {
        match self.interaction(future_id, interaction_id) {
            NetworkInteraction::Onchain(interaction) => interaction,
            NetworkInteraction::StaticCall(_) => {
                panic!("{future_id} interaction {interaction_id} is not an on-chain interaction")
            }
        }
    }

    fn static_call(&self, future_id: &str, interaction_id: u32) -> StaticCallInteraction {
        match self.interaction(future_id, interaction_id) {
            NetworkInteraction::StaticCall(call) => call,
            NetworkInteraction::Onchain(_) => {
                panic!("{future_id} interaction {interaction_id} is not a static call")
            }
        }
    }

    fn interaction(&self, future_id: &str, interaction_id: u32) -> NetworkInteraction {
        self.store
            .with_state(|state| {
                state
                    .get(future_id)
                    .and_then(|execution| execution.interaction(interaction_id))
                    .cloned()
            })
            .unwrap_or_else(|| {
                panic!("{future_id} has no recorded interaction {interaction_id}")
            })
    }
}

fn request_for(interaction: &OnchainInteraction) -> TransactionRequest {
    TransactionRequest {
        from: interaction.from,
        to: interaction.to,
        data: interaction.data.clone(),
        value: interaction.value,
        ..Default::default()
    }
}
