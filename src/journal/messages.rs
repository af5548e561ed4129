//! Journal message kinds.

use crate::config::StrategyConfig;
use crate::provider::{RawStaticCallResult, TransactionReceipt};
use crate::state::{ExecutionInputs, ExecutionResult, FailureReason, SentTransaction};
use alloy_primitives::{Address, Bytes, U256};
use ignition_graph::{FutureId, FutureType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FutureStartedMessage {
    pub future_id: FutureId,
    pub future_type: FutureType,
    pub strategy: StrategyConfig,
    pub dependencies: Vec<FutureId>,
    pub inputs: ExecutionInputs,
}

/// A network interaction a future is about to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InteractionRequest {
    Onchain {
        id: u32,
        to: Option<Address>,
        data: Bytes,
        value: U256,
        from: Address,
    },
    StaticCall {
        id: u32,
        to: Address,
        data: Bytes,
        from: Address,
    },
}

impl InteractionRequest {
    pub fn id(&self) -> u32 {
        match self {
            InteractionRequest::Onchain { id, .. } | InteractionRequest::StaticCall { id, .. } => *id,
        }
    }
}

/// One durable event in a deployment's history.
///
/// Messages are only ever appended. Replaying them in order through
/// [`crate::state::reduce`] reconstructs the deployment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum JournalMessage {
    RunStart {
        chain_id: u64,
    },
    FutureStarted(FutureStartedMessage),
    NetworkInteractionRequest {
        future_id: FutureId,
        interaction: InteractionRequest,
    },
    /// A nonce was assigned to an interaction; the transaction may or may not
    /// have reached the network.
    TransactionPrepared {
        future_id: FutureId,
        interaction_id: u32,
        nonce: u64,
    },
    TransactionSent {
        future_id: FutureId,
        interaction_id: u32,
        nonce: u64,
        transaction: SentTransaction,
    },
    TransactionConfirmed {
        future_id: FutureId,
        interaction_id: u32,
        receipt: TransactionReceipt,
    },
    StaticCallCompleted {
        future_id: FutureId,
        interaction_id: u32,
        result: RawStaticCallResult,
    },
    FeeBump {
        future_id: FutureId,
        interaction_id: u32,
    },
    /// Every transaction of the interaction vanished from the network; it
    /// will be resent with the same nonce.
    InteractionDropped {
        future_id: FutureId,
        interaction_id: u32,
    },
    /// The nonce was consumed by a transaction this engine did not send.
    InteractionReplacedByUser {
        future_id: FutureId,
        interaction_id: u32,
    },
    FutureSucceeded {
        future_id: FutureId,
        result: ExecutionResult,
    },
    FutureFailed {
        future_id: FutureId,
        failure: FailureReason,
    },
    FutureTimedOut {
        future_id: FutureId,
        interaction_id: u32,
    },
    Wipe {
        future_id: FutureId,
    },
}

impl JournalMessage {
    pub fn future_id(&self) -> Option<&str> {
        match self {
            JournalMessage::RunStart { .. } => None,
            JournalMessage::FutureStarted(m) => Some(&m.future_id),
            JournalMessage::NetworkInteractionRequest { future_id, .. }
            | JournalMessage::TransactionPrepared { future_id, .. }
            | JournalMessage::TransactionSent { future_id, .. }
            | JournalMessage::TransactionConfirmed { future_id, .. }
            | JournalMessage::StaticCallCompleted { future_id, .. }
            | JournalMessage::FeeBump { future_id, .. }
            | JournalMessage::InteractionDropped { future_id, .. }
            | JournalMessage::InteractionReplacedByUser { future_id, .. }
            | JournalMessage::FutureSucceeded { future_id, .. }
            | JournalMessage::FutureFailed { future_id, .. }
            | JournalMessage::FutureTimedOut { future_id, .. }
            | JournalMessage::Wipe { future_id } => Some(future_id),
        }
    }

    /// The message kind as written to the journal.
    pub fn kind(&self) -> &'static str {
        match self {
            JournalMessage::RunStart { .. } => "run-start",
            JournalMessage::FutureStarted(_) => "future-started",
            JournalMessage::NetworkInteractionRequest { .. } => "network-interaction-request",
            JournalMessage::TransactionPrepared { .. } => "transaction-prepared",
            JournalMessage::TransactionSent { .. } => "transaction-sent",
            JournalMessage::TransactionConfirmed { .. } => "transaction-confirmed",
            JournalMessage::StaticCallCompleted { .. } => "static-call-completed",
            JournalMessage::FeeBump { .. } => "fee-bump",
            JournalMessage::InteractionDropped { .. } => "interaction-dropped",
            JournalMessage::InteractionReplacedByUser { .. } => "interaction-replaced-by-user",
            JournalMessage::FutureSucceeded { .. } => "future-succeeded",
            JournalMessage::FutureFailed { .. } => "future-failed",
            JournalMessage::FutureTimedOut { .. } => "future-timed-out",
            JournalMessage::Wipe { .. } => "wipe",
        }
    }
}
