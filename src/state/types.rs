//! Execution state records.

use crate::abi::RevertReason;
use crate::config::StrategyConfig;
use crate::provider::{Fees, RawStaticCallResult, TransactionReceipt};
use alloy_primitives::{Address, Bytes, B256, U256};
use ignition_graph::{FutureId, FutureType, Literal, NameOrIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Started,
    Success,
    Failed,
    #[serde(rename = "TIMEOUT")]
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Started)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionStatus::Started => "STARTED",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::TimedOut => "TIMEOUT",
        })
    }
}

/// The resolved inputs a future was executed with.
///
/// These are what reconciliation compares against on resume, so every value
/// is fully resolved: no future references, accounts or parameters remain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExecutionInputs {
    Deployment {
        contract_name: String,
        constructor_args: Vec<Literal>,
        libraries: BTreeMap<String, Address>,
        value: U256,
        from: Address,
    },
    Call {
        contract_address: Address,
        function_name: String,
        args: Vec<Literal>,
        value: U256,
        from: Address,
    },
    StaticCall {
        contract_address: Address,
        function_name: String,
        args: Vec<Literal>,
        name_or_index: NameOrIndex,
        from: Address,
    },
    SendData {
        to: Address,
        data: Bytes,
        value: U256,
        from: Address,
    },
    EncodeFunctionCall {
        function_name: String,
        args: Vec<Literal>,
    },
    ContractAt {
        contract_name: String,
        /// Kept as given; an invalid address fails the future.
        address: String,
    },
    ReadEventArgument {
        emitter_address: Address,
        transaction_hash: B256,
        event_name: String,
        event_index: usize,
        name_or_index: NameOrIndex,
    },
}

impl ExecutionInputs {
    /// The account that sends this future's transactions, if it sends any.
    pub fn from(&self) -> Option<Address> {
        match self {
            ExecutionInputs::Deployment { from, .. }
            | ExecutionInputs::Call { from, .. }
            | ExecutionInputs::StaticCall { from, .. }
            | ExecutionInputs::SendData { from, .. } => Some(*from),
            _ => None,
        }
    }
}

/// A transaction sent for an on-chain interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentTransaction {
    pub hash: B256,
    pub fees: Fees,
    pub gas_limit: u64,
}

/// One logical transaction of a future, possibly sent several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnchainInteraction {
    pub id: u32,
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub from: Address,
    pub nonce: Option<u64>,
    pub transactions: Vec<SentTransaction>,
    pub fee_bumps: u32,
    pub receipt: Option<TransactionReceipt>,
}

impl OnchainInteraction {
    /// Returns true until a receipt has been confirmed.
    pub fn is_pending(&self) -> bool {
        self.receipt.is_none()
    }

    pub fn last_transaction(&self) -> Option<&SentTransaction> {
        self.transactions.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticCallInteraction {
    pub id: u32,
    pub to: Address,
    pub data: Bytes,
    pub from: Address,
    pub result: Option<RawStaticCallResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NetworkInteraction {
    Onchain(OnchainInteraction),
    StaticCall(StaticCallInteraction),
}

impl NetworkInteraction {
    pub fn id(&self) -> u32 {
        match self {
            NetworkInteraction::Onchain(i) => i.id,
            NetworkInteraction::StaticCall(i) => i.id,
        }
    }
}

/// What a successful future produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExecutionResult {
    Deployed { address: Address },
    Transaction { hash: B256 },
    StaticCall { value: Literal },
    Encoded { data: Bytes },
    ContractAt { address: Address },
    EventArgument { value: Literal },
}

impl ExecutionResult {
    /// The contract address, for results that denote one.
    pub fn address(&self) -> Option<Address> {
        match self {
            ExecutionResult::Deployed { address } | ExecutionResult::ContractAt { address } => {
                Some(*address)
            }
            _ => None,
        }
    }
}

/// Why a future failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FailureReason {
    /// The transaction was mined but reverted.
    Reverted { hash: B256, reason: RevertReason },
    /// Simulation before sending showed the transaction would revert.
    SimulationReverted { reason: RevertReason },
    StaticCallReverted { reason: RevertReason },
    /// Arguments could not be encoded for the contract ABI.
    InvalidArguments { message: String },
    /// A result could not be decoded with the contract ABI.
    Decoding { message: String },
    /// A deployment receipt carried no contract address.
    MissingContractAddress { hash: B256 },
    EventNotFound { message: String },
    InvalidAddress { value: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Reverted { hash, reason } => write!(f, "transaction {hash} {reason}"),
            FailureReason::SimulationReverted { reason } => write!(f, "simulation {reason}"),
            FailureReason::StaticCallReverted { reason } => write!(f, "static call {reason}"),
            FailureReason::InvalidArguments { message } => {
                write!(f, "could not encode arguments: {message}")
            }
            FailureReason::Decoding { message } => write!(f, "could not decode result: {message}"),
            FailureReason::MissingContractAddress { hash } => {
                write!(f, "deployment transaction {hash} created no contract")
            }
            FailureReason::EventNotFound { message } => f.write_str(message),
            FailureReason::InvalidAddress { value } => write!(f, "{value} is not a valid address"),
        }
    }
}

/// The recorded progress of one future.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub id: FutureId,
    pub future_type: FutureType,
    pub status: ExecutionStatus,
    pub strategy: StrategyConfig,
    pub dependencies: BTreeSet<FutureId>,
    pub inputs: ExecutionInputs,
    pub network_interactions: Vec<NetworkInteraction>,
    pub result: Option<ExecutionResult>,
    pub failure: Option<FailureReason>,
}

impl ExecutionState {
    pub fn onchain_interactions(&self) -> impl Iterator<Item = &OnchainInteraction> {
        self.network_interactions.iter().filter_map(|i| match i {
            NetworkInteraction::Onchain(onchain) => Some(onchain),
            NetworkInteraction::StaticCall(_) => None,
        })
    }

    /// The interaction currently awaiting confirmation, if any.
    pub fn pending_interaction(&self) -> Option<&OnchainInteraction> {
        self.onchain_interactions().find(|i| i.is_pending())
    }

    pub fn last_interaction(&self) -> Option<&NetworkInteraction> {
        self.network_interactions.last()
    }

    pub fn interaction(&self, id: u32) -> Option<&NetworkInteraction> {
        self.network_interactions.iter().find(|i| i.id() == id)
    }

    pub(crate) fn interaction_mut(&mut self, id: u32) -> Option<&mut NetworkInteraction> {
        self.network_interactions.iter_mut().find(|i| i.id() == id)
    }

    /// The confirmed transaction of the future's last on-chain interaction.
    pub fn confirmed_receipt(&self) -> Option<&TransactionReceipt> {
        self.onchain_interactions()
            .last()
            .and_then(|i| i.receipt.as_ref())
    }
}
