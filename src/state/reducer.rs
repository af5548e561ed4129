//! The pure deployment-state reducer.
//!
//! `reduce` is total over every message kind. A message that does not fit the
//! state it is applied to means the journal was written by buggy code, and
//! continuing could corrupt it further, so those cases panic.

use super::types::{
    ExecutionState, ExecutionStatus, NetworkInteraction, OnchainInteraction,
    StaticCallInteraction,
};
use super::DeploymentState;
use crate::journal::{InteractionRequest, JournalMessage};

/// Applies one journal message to a deployment state.
pub fn reduce(mut state: DeploymentState, message: &JournalMessage) -> DeploymentState {
    match message {
        JournalMessage::RunStart { chain_id } => {
            state.chain_id = Some(*chain_id);
        }
        JournalMessage::FutureStarted(started) => {
            if state.execution_states.contains_key(&started.future_id) {
                panic!(
                    "future-started for {}, which already has an execution state",
                    started.future_id
                );
            }
            state.execution_states.insert(
                started.future_id.clone(),
                ExecutionState {
                    id: started.future_id.clone(),
                    future_type: started.future_type,
                    status: ExecutionStatus::Started,
                    strategy: started.strategy.clone(),
                    dependencies: started.dependencies.iter().cloned().collect(),
                    inputs: started.inputs.clone(),
                    network_interactions: Vec::new(),
                    result: None,
                    failure: None,
                },
            );
        }
        JournalMessage::NetworkInteractionRequest {
            future_id,
            interaction,
        } => {
            let execution = started_state(&mut state, message, future_id);
            if execution.interaction(interaction.id()).is_some() {
                panic!(
                    "{}: interaction {} of {future_id} already exists",
                    message.kind(),
                    interaction.id()
                );
            }
            if execution.pending_interaction().is_some() {
                panic!(
                    "{}: {future_id} already has a pending interaction",
                    message.kind()
                );
            }
            execution.network_interactions.push(match interaction {
                InteractionRequest::Onchain {
                    id,
                    to,
                    data,
                    value,
                    from,
                } => NetworkInteraction::Onchain(OnchainInteraction {
                    id: *id,
                    to: *to,
                    data: data.clone(),
                    value: *value,
                    from: *from,
                    nonce: None,
                    transactions: Vec::new(),
                    fee_bumps: 0,
                    receipt: None,
                }),
                InteractionRequest::StaticCall { id, to, data, from } => {
                    NetworkInteraction::StaticCall(StaticCallInteraction {
                        id: *id,
                        to: *to,
                        data: data.clone(),
                        from: *from,
                        result: None,
                    })
                }
            });
        }
        JournalMessage::TransactionPrepared {
            future_id,
            interaction_id,
            nonce,
        } => {
            let interaction = onchain(&mut state, message, future_id, *interaction_id);
            if let Some(existing) = interaction.nonce {
                if existing != *nonce {
                    panic!(
                        "{}: {future_id} interaction {interaction_id} already holds nonce {existing}",
                        message.kind()
                    );
                }
            }
            interaction.nonce = Some(*nonce);
        }
        JournalMessage::TransactionSent {
            future_id,
            interaction_id,
            nonce,
            transaction,
        } => {
            let interaction = onchain(&mut state, message, future_id, *interaction_id);
            if interaction.nonce.is_some_and(|existing| existing != *nonce) {
                panic!(
                    "{}: {future_id} interaction {interaction_id} sent with nonce {nonce}, expected {:?}",
                    message.kind(),
                    interaction.nonce
                );
            }
            interaction.nonce = Some(*nonce);
            interaction.transactions.push(transaction.clone());
        }
        JournalMessage::TransactionConfirmed {
            future_id,
            interaction_id,
            receipt,
        } => {
            let interaction = onchain(&mut state, message, future_id, *interaction_id);
            if !interaction
                .transactions
                .iter()
                .any(|tx| tx.hash == receipt.transaction_hash)
            {
                panic!(
                    "{}: {future_id} confirmed transaction {} it never sent",
                    message.kind(),
                    receipt.transaction_hash
                );
            }
            interaction.receipt = Some(receipt.clone());
        }
        JournalMessage::StaticCallCompleted {
            future_id,
            interaction_id,
            result,
        } => {
            let execution = started_state(&mut state, message, future_id);
            match execution.interaction_mut(*interaction_id) {
                Some(NetworkInteraction::StaticCall(call)) => call.result = Some(result.clone()),
                _ => panic!(
                    "{}: {future_id} has no static call interaction {interaction_id}",
                    message.kind()
                ),
            }
        }
        JournalMessage::FeeBump {
            future_id,
            interaction_id,
        } => {
            onchain(&mut state, message, future_id, *interaction_id).fee_bumps += 1;
        }
        JournalMessage::InteractionDropped {
            future_id,
            interaction_id,
        } => {
            let interaction = onchain(&mut state, message, future_id, *interaction_id);
            interaction.transactions.clear();
        }
        JournalMessage::InteractionReplacedByUser {
            future_id,
            interaction_id,
        } => {
            let interaction = onchain(&mut state, message, future_id, *interaction_id);
            interaction.transactions.clear();
            interaction.nonce = None;
        }
        JournalMessage::FutureSucceeded { future_id, result } => {
            let execution = started_state(&mut state, message, future_id);
            execution.status = ExecutionStatus::Success;
            execution.result = Some(result.clone());
        }
        JournalMessage::FutureFailed { future_id, failure } => {
            let execution = started_state(&mut state, message, future_id);
            execution.status = ExecutionStatus::Failed;
            execution.failure = Some(failure.clone());
        }
        JournalMessage::FutureTimedOut { future_id, .. } => {
            let execution = started_state(&mut state, message, future_id);
            execution.status = ExecutionStatus::TimedOut;
        }
        JournalMessage::Wipe { future_id } => {
            if state.execution_states.remove(future_id).is_none() {
                panic!("wipe of {future_id}, which has no execution state");
            }
        }
    }
    state
}

/// The execution state of a future that must still be running.
fn started_state<'a>(
    state: &'a mut DeploymentState,
    message: &JournalMessage,
    future_id: &str,
) -> &'a mut ExecutionState {
    let Some(execution) = state.execution_states.get_mut(future_id) else {
        panic!("{} for {future_id}, which was never started", message.kind());
    };
    if execution.status.is_terminal() {
        panic!(
            "{} for {future_id}, which already finished with {}",
            message.kind(),
            execution.status
        );
    }
    execution
}

fn onchain<'a>(
    state: &'a mut DeploymentState,
    message: &JournalMessage,
    future_id: &str,
    interaction_id: u32,
) -> &'a mut OnchainInteraction {
    let execution = started_state(state, message, future_id);
    match execution.interaction_mut(interaction_id) {
        Some(NetworkInteraction::Onchain(interaction)) => interaction,
        _ => panic!(
            "{} for {future_id}: no on-chain interaction {interaction_id}",
            message.kind()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::journal::FutureStartedMessage;
    use crate::provider::{Fees, TransactionReceipt};
    use crate::state::{ExecutionInputs, ExecutionResult, SentTransaction};
    use alloy_primitives::{Address, Bytes, B256, U256};
    use ignition_graph::FutureType;

    fn started(id: &str) -> JournalMessage {
        JournalMessage::FutureStarted(FutureStartedMessage {
            future_id: id.to_string(),
            future_type: FutureType::SendData,
            strategy: StrategyConfig::Basic,
            dependencies: Vec::new(),
            inputs: ExecutionInputs::SendData {
                to: Address::ZERO,
                data: Bytes::new(),
                value: U256::ZERO,
                from: Address::repeat_byte(1),
            },
        })
    }

    fn request(id: &str) -> JournalMessage {
        JournalMessage::NetworkInteractionRequest {
            future_id: id.to_string(),
            interaction: InteractionRequest::Onchain {
                id: 1,
                to: Some(Address::ZERO),
                data: Bytes::new(),
                value: U256::ZERO,
                from: Address::repeat_byte(1),
            },
        }
    }

    fn sent(id: &str, nonce: u64, hash: u8) -> JournalMessage {
        JournalMessage::TransactionSent {
            future_id: id.to_string(),
            interaction_id: 1,
            nonce,
            transaction: SentTransaction {
                hash: B256::repeat_byte(hash),
                fees: Fees::Legacy {
                    gas_price: U256::from(1u64),
                },
                gas_limit: 21_000,
            },
        }
    }

    fn confirmed(id: &str, hash: u8) -> JournalMessage {
        JournalMessage::TransactionConfirmed {
            future_id: id.to_string(),
            interaction_id: 1,
            receipt: TransactionReceipt {
                transaction_hash: B256::repeat_byte(hash),
                block_hash: B256::ZERO,
                block_number: 1,
                status: 1,
                contract_address: None,
                logs: Vec::new(),
            },
        }
    }

    fn replay(messages: &[JournalMessage]) -> DeploymentState {
        messages.iter().fold(DeploymentState::default(), reduce)
    }

    #[test]
    fn test_full_lifecycle() {
        let state = replay(&[
            JournalMessage::RunStart { chain_id: 1 },
            started("M#send"),
            request("M#send"),
            JournalMessage::TransactionPrepared {
                future_id: "M#send".to_string(),
                interaction_id: 1,
                nonce: 0,
            },
            sent("M#send", 0, 0xaa),
            JournalMessage::FeeBump {
                future_id: "M#send".to_string(),
                interaction_id: 1,
            },
            sent("M#send", 0, 0xbb),
            confirmed("M#send", 0xbb),
            JournalMessage::FutureSucceeded {
                future_id: "M#send".to_string(),
                result: ExecutionResult::Transaction {
                    hash: B256::repeat_byte(0xbb),
                },
            },
        ]);

        assert_eq!(state.chain_id, Some(1));
        let execution = &state.execution_states["M#send"];
        assert_eq!(execution.status, ExecutionStatus::Success);
        let interaction = execution.onchain_interactions().next().unwrap();
        assert_eq!(interaction.transactions.len(), 2);
        assert_eq!(interaction.fee_bumps, 1);
        assert!(!interaction.is_pending());
    }

    #[test]
    fn test_replay_is_deterministic() {
        let messages = vec![started("M#a"), request("M#a"), started("M#b")];
        assert_eq!(replay(&messages), replay(&messages));
    }

    #[test]
    fn test_replaced_by_user_clears_nonce() {
        let state = replay(&[
            started("M#a"),
            request("M#a"),
            JournalMessage::TransactionPrepared {
                future_id: "M#a".to_string(),
                interaction_id: 1,
                nonce: 4,
            },
            JournalMessage::InteractionReplacedByUser {
                future_id: "M#a".to_string(),
                interaction_id: 1,
            },
        ]);
        let interaction = state.execution_states["M#a"]
            .onchain_interactions()
            .next()
            .unwrap()
            .clone();
        assert_eq!(interaction.nonce, None);
        assert!(interaction.transactions.is_empty());
    }

    #[test]
    fn test_wipe_removes_state() {
        let state = replay(&[
            started("M#a"),
            JournalMessage::FutureTimedOut {
                future_id: "M#a".to_string(),
                interaction_id: 1,
            },
            JournalMessage::Wipe {
                future_id: "M#a".to_string(),
            },
        ]);
        assert!(state.execution_states.is_empty());
    }

    #[test]
    #[should_panic(expected = "already finished")]
    fn test_transition_after_terminal_state_panics() {
        replay(&[
            started("M#a"),
            JournalMessage::FutureTimedOut {
                future_id: "M#a".to_string(),
                interaction_id: 1,
            },
            request("M#a"),
        ]);
    }

    #[test]
    #[should_panic(expected = "never started")]
    fn test_message_for_unknown_future_panics() {
        replay(&[sent("M#ghost", 0, 1)]);
    }
}
