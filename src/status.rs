//! Read-only views of a deployment for operators.

use crate::state::{DeploymentState, ExecutionStatus, FailureReason};
use alloy_primitives::{Address, B256, U256};
use ignition_graph::{FutureId, FutureType};
use serde::Serialize;
use std::collections::BTreeMap;

/// Futures of a deployment partitioned by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub chain_id: Option<u64>,
    pub started: Vec<FutureId>,
    pub successful: Vec<FutureId>,
    pub failed: Vec<FailedFuture>,
    pub timed_out: Vec<FutureId>,
    /// Addresses of every deployed or attached contract.
    pub contracts: BTreeMap<FutureId, Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFuture {
    pub future_id: FutureId,
    pub reason: Option<FailureReason>,
}

impl DeploymentStatus {
    pub fn is_complete(&self) -> bool {
        self.started.is_empty() && self.failed.is_empty() && self.timed_out.is_empty()
    }
}

pub fn status(state: &DeploymentState) -> DeploymentStatus {
    let mut status = DeploymentStatus {
        chain_id: state.chain_id,
        ..Default::default()
    };
    for execution in state.execution_states.values() {
        let id = execution.id.clone();
        match execution.status {
            ExecutionStatus::Started => status.started.push(id),
            ExecutionStatus::Success => {
                if let Some(address) = execution.result.as_ref().and_then(|r| r.address()) {
                    status.contracts.insert(id.clone(), address);
                }
                status.successful.push(id);
            }
            ExecutionStatus::Failed => status.failed.push(FailedFuture {
                future_id: id,
                reason: execution.failure.clone(),
            }),
            ExecutionStatus::TimedOut => status.timed_out.push(id),
        }
    }
    status
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
    /// Sent and not yet confirmed. Every resend of an unconfirmed
    /// interaction is listed as pending.
    Pending,
    Success,
    Reverted,
}

/// One sent transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub future_id: FutureId,
    pub future_type: FutureType,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: Option<u64>,
    pub hash: B256,
    pub status: TransactionStatus,
}

/// Every transaction sent for the deployment, in future id then send order.
///
/// Of the transactions of a confirmed interaction only the one that was
/// mined is listed.
pub fn list_transactions(state: &DeploymentState) -> Vec<TransactionInfo> {
    let mut out = Vec::new();
    for execution in state.execution_states.values() {
        for interaction in execution.onchain_interactions() {
            let info = |hash: B256, status: TransactionStatus| TransactionInfo {
                future_id: execution.id.clone(),
                future_type: execution.future_type,
                from: interaction.from,
                to: interaction.to,
                value: interaction.value,
                nonce: interaction.nonce,
                hash,
                status,
            };
            match &interaction.receipt {
                Some(receipt) => {
                    let status = if receipt.is_success() {
                        TransactionStatus::Success
                    } else {
                        TransactionStatus::Reverted
                    };
                    out.push(info(receipt.transaction_hash, status));
                }
                None => out.extend(
                    interaction
                        .transactions
                        .iter()
                        .map(|sent| info(sent.hash, TransactionStatus::Pending)),
                ),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::journal::{FutureStartedMessage, InteractionRequest, JournalMessage};
    use crate::provider::{Fees, TransactionReceipt};
    use crate::state::{reduce, ExecutionInputs, ExecutionResult, SentTransaction};
    use alloy_primitives::Bytes;

    fn deployed(id: &str, from: Address) -> Vec<JournalMessage> {
        let hash = alloy_primitives::keccak256(id.as_bytes());
        vec![
            JournalMessage::FutureStarted(FutureStartedMessage {
                future_id: id.to_string(),
                future_type: FutureType::NamedArtifactContractDeployment,
                strategy: StrategyConfig::Basic,
                dependencies: vec![],
                inputs: ExecutionInputs::Deployment {
                    contract_name: "Counter".to_string(),
                    constructor_args: vec![],
                    libraries: Default::default(),
                    value: U256::ZERO,
                    from,
                },
            }),
            JournalMessage::NetworkInteractionRequest {
                future_id: id.to_string(),
                interaction: InteractionRequest::Onchain {
                    id: 1,
                    to: None,
                    data: Bytes::from_static(&[0x60]),
                    value: U256::ZERO,
                    from,
                },
            },
            JournalMessage::TransactionPrepared {
                future_id: id.to_string(),
                interaction_id: 1,
                nonce: 0,
            },
            JournalMessage::TransactionSent {
                future_id: id.to_string(),
                interaction_id: 1,
                nonce: 0,
                transaction: SentTransaction {
                    hash,
                    fees: Fees::Legacy {
                        gas_price: U256::from(1u64),
                    },
                    gas_limit: 100_000,
                },
            },
        ]
    }

    #[test]
    fn test_status_partitions_and_lists_transactions() {
        let from = Address::repeat_byte(1);
        let mut messages = deployed("M#A", from);
        let hash = match &messages[3] {
            JournalMessage::TransactionSent { transaction, .. } => transaction.hash,
            _ => unreachable!(),
        };
        messages.push(JournalMessage::TransactionConfirmed {
            future_id: "M#A".to_string(),
            interaction_id: 1,
            receipt: TransactionReceipt {
                transaction_hash: hash,
                block_hash: B256::ZERO,
                block_number: 1,
                status: 1,
                contract_address: Some(Address::repeat_byte(0xaa)),
                logs: vec![],
            },
        });
        messages.push(JournalMessage::FutureSucceeded {
            future_id: "M#A".to_string(),
            result: ExecutionResult::Deployed {
                address: Address::repeat_byte(0xaa),
            },
        });
        messages.extend(deployed("M#B", from));

        let state = messages.iter().fold(DeploymentState::default(), reduce);
        let status = status(&state);
        assert_eq!(status.successful, vec!["M#A".to_string()]);
        assert_eq!(status.started, vec!["M#B".to_string()]);
        assert_eq!(status.contracts["M#A"], Address::repeat_byte(0xaa));
        assert!(!status.is_complete());

        let transactions = list_transactions(&state);
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].status, TransactionStatus::Success);
        assert_eq!(transactions[1].future_id, "M#B");
        assert_eq!(transactions[1].status, TransactionStatus::Pending);
    }
}
