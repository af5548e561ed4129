//! Execution Engine.
//!
//! Runs batches in order and the futures of a batch concurrently. A future is
//! started by journaling its resolved inputs, then advanced by the step that
//! matches those inputs until it reaches a terminal status. A resumed future
//! continues from the inputs and interactions that were journaled, never from
//! freshly resolved ones.

use super::strategy::strategy_for;
use super::tracker::{InteractionOutcome, TransactionTracker};
use super::ExecutionError;
use crate::abi::{self, AbiError};
use crate::artifacts::{link_bytecode, ArtifactStore};
use crate::config::DeployConfig;
use crate::journal::{FutureStartedMessage, InteractionRequest, JournalMessage};
use crate::provider::TransactionReceipt;
use crate::resolve::{DeploymentParameters, ResolveContext};
use crate::state::{
    DeploymentState, DeploymentStore, ExecutionInputs, ExecutionResult, ExecutionState,
    ExecutionStatus, FailureReason, NetworkInteraction,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use futures::future::join_all;
use ignition_graph::{Artifact, Future, FutureGraph, FutureId, Literal, NameOrIndex};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a future ended in this run.
#[derive(Debug)]
enum Completion {
    Success(ExecutionResult),
    Failure(FailureReason),
    TimedOut { interaction_id: u32 },
}

fn invalid_arguments(err: AbiError) -> Completion {
    Completion::Failure(FailureReason::InvalidArguments {
        message: err.to_string(),
    })
}

pub struct ExecutionEngine {
    graph: Arc<FutureGraph>,
    artifacts: Arc<ArtifactStore>,
    store: Arc<DeploymentStore>,
    tracker: TransactionTracker,
    accounts: Vec<Address>,
    parameters: DeploymentParameters,
    config: Arc<DeployConfig>,
}

impl ExecutionEngine {
    pub fn new(
        graph: Arc<FutureGraph>,
        artifacts: Arc<ArtifactStore>,
        store: Arc<DeploymentStore>,
        tracker: TransactionTracker,
        accounts: Vec<Address>,
        parameters: DeploymentParameters,
        config: Arc<DeployConfig>,
    ) -> Self {
        Self {
            graph,
            artifacts,
            store,
            tracker,
            accounts,
            parameters,
            config,
        }
    }

    /// Executes `batches` in order.
    ///
    /// Stops after the first batch in which a future failed or timed out;
    /// later batches may depend on it. Errors abort the run once every
    /// future of the current batch has stopped.
    pub async fn execute(&self, batches: &[Vec<FutureId>]) -> Result<(), ExecutionError> {
        for (index, batch) in batches.iter().enumerate() {
            info!(
                batch = index + 1,
                batches = batches.len(),
                futures = ?batch,
                "executing batch"
            );
            let results = join_all(batch.iter().map(|id| self.execute_future(id))).await;
            results.into_iter().collect::<Result<Vec<()>, _>>()?;

            let stopped = self.store.with_state(|state| {
                batch.iter().any(|id| {
                    matches!(
                        state.status(id),
                        Some(ExecutionStatus::Failed | ExecutionStatus::TimedOut)
                    )
                })
            });
            if stopped {
                warn!(batch = index + 1, "batch had failures, not executing further batches");
                break;
            }
        }
        Ok(())
    }

    async fn execute_future(&self, future_id: &str) -> Result<(), ExecutionError> {
        let Some(future) = self.graph.get(future_id) else {
            panic!("batched future {future_id} is not in the graph");
        };
        let execution = match self.store.with_state(|state| state.get(future_id).cloned()) {
            Some(execution) if execution.status.is_terminal() => return Ok(()),
            Some(execution) => {
                debug!(future_id, "resuming future");
                execution
            }
            None => self.start(future)?,
        };

        let completion = self.advance(future, &execution).await?;
        self.complete(future_id, completion)
    }

    fn start(&self, future: &Future) -> Result<ExecutionState, ExecutionError> {
        let future_id = future.id();
        let inputs = self
            .store
            .with_state(|state| self.context(state).inputs(future))
            .map_err(|source| ExecutionError::Resolve {
                future: future_id.to_string(),
                source,
            })?;
        self.store
            .apply(JournalMessage::FutureStarted(FutureStartedMessage {
                future_id: future_id.to_string(),
                future_type: future.future_type(),
                strategy: self.config.strategy.clone(),
                dependencies: future.dependencies().into_iter().map(str::to_string).collect(),
                inputs,
            }))?;
        info!(future_id, future_type = %future.future_type(), "future started");
        Ok(self.execution(future_id))
    }

    fn complete(&self, future_id: &str, completion: Completion) -> Result<(), ExecutionError> {
        let message = match completion {
            Completion::Success(result) => {
                info!(future_id, ?result, "future succeeded");
                JournalMessage::FutureSucceeded {
                    future_id: future_id.to_string(),
                    result,
                }
            }
            Completion::Failure(failure) => {
                warn!(future_id, %failure, "future failed");
                JournalMessage::FutureFailed {
                    future_id: future_id.to_string(),
                    failure,
                }
            }
            Completion::TimedOut { interaction_id } => {
                warn!(future_id, interaction_id, "future timed out");
                JournalMessage::FutureTimedOut {
                    future_id: future_id.to_string(),
                    interaction_id,
                }
            }
        };
        self.store.apply(message)?;
        Ok(())
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn advance(
        &self,
        future: &Future,
        execution: &ExecutionState,
    ) -> Result<Completion, ExecutionError> {
        match &execution.inputs {
            ExecutionInputs::Deployment {
                constructor_args,
                libraries,
                value,
                from,
                ..
            } => {
                let artifact = self.artifact(future)?;
                let bytecode = link_bytecode(artifact, libraries)?;
                let init_code = match abi::encode_deployment(artifact, &bytecode, constructor_args)
                {
                    Ok(code) => code,
                    Err(err) => return Ok(invalid_arguments(err)),
                };
                let strategy = strategy_for(&execution.strategy);
                let request = match strategy.deployment_request(init_code) {
                    Ok(request) => request,
                    Err(err) => return Ok(invalid_arguments(err)),
                };
                let (id, outcome) = self
                    .onchain(execution, request.to, request.data, *value, *from)
                    .await?;
                Ok(match outcome {
                    InteractionOutcome::Confirmed(receipt) if receipt.is_success() => {
                        match strategy.deployed_address(&receipt) {
                            Ok(address) => Completion::Success(ExecutionResult::Deployed { address }),
                            Err(failure) => Completion::Failure(failure),
                        }
                    }
                    outcome => unsuccessful(id, outcome, Some(artifact)),
                })
            }
            ExecutionInputs::Call {
                contract_address,
                function_name,
                args,
                value,
                from,
            } => {
                let artifact = self.artifact(future)?;
                let data = match abi::find_function(artifact, function_name)
                    .and_then(|function| abi::encode_function_call(function, args))
                {
                    Ok(data) => data,
                    Err(err) => return Ok(invalid_arguments(err)),
                };
                let (id, outcome) = self
                    .onchain(execution, Some(*contract_address), data, *value, *from)
                    .await?;
                Ok(transaction_result(id, outcome, Some(artifact)))
            }
            ExecutionInputs::SendData {
                to,
                data,
                value,
                from,
            } => {
                let (id, outcome) = self
                    .onchain(execution, Some(*to), data.clone(), *value, *from)
                    .await?;
                Ok(transaction_result(id, outcome, None))
            }
            ExecutionInputs::StaticCall {
                contract_address,
                function_name,
                args,
                name_or_index,
                from,
            } => {
                let artifact = self.artifact(future)?;
                let function = match abi::find_function(artifact, function_name) {
                    Ok(function) => function,
                    Err(err) => return Ok(invalid_arguments(err)),
                };
                let data = match abi::encode_function_call(function, args) {
                    Ok(data) => data,
                    Err(err) => return Ok(invalid_arguments(err)),
                };
                let id = self.static_call(execution, *contract_address, data, *from)?;
                let result = self.tracker.run_static_call(&execution.id, id).await?;
                if !result.success {
                    return Ok(Completion::Failure(FailureReason::StaticCallReverted {
                        reason: abi::decode_revert(&result.return_data, Some(artifact)),
                    }));
                }
                Ok(
                    match abi::decode_function_result(function, &result.return_data)
                        .and_then(|values| abi::select_value(&function.outputs, values, name_or_index))
                    {
                        Ok(value) => Completion::Success(ExecutionResult::StaticCall { value }),
                        Err(err) => Completion::Failure(FailureReason::Decoding {
                            message: err.to_string(),
                        }),
                    },
                )
            }
            ExecutionInputs::EncodeFunctionCall {
                function_name,
                args,
            } => {
                let artifact = self.artifact(future)?;
                Ok(
                    match abi::find_function(artifact, function_name)
                        .and_then(|function| abi::encode_function_call(function, args))
                    {
                        Ok(data) => Completion::Success(ExecutionResult::Encoded { data }),
                        Err(err) => invalid_arguments(err),
                    },
                )
            }
            ExecutionInputs::ContractAt { address, .. } => Ok(match address.parse::<Address>() {
                Ok(address) => Completion::Success(ExecutionResult::ContractAt { address }),
                Err(_) => Completion::Failure(FailureReason::InvalidAddress {
                    value: address.clone(),
                }),
            }),
            ExecutionInputs::ReadEventArgument {
                emitter_address,
                transaction_hash,
                event_name,
                event_index,
                name_or_index,
            } => {
                let artifact = self.artifact(future)?;
                let Some(receipt) = self.event_receipt(future, *transaction_hash).await? else {
                    return Ok(Completion::Failure(FailureReason::EventNotFound {
                        message: format!("transaction {transaction_hash} has no receipt"),
                    }));
                };
                Ok(
                    match read_event(
                        artifact,
                        &receipt,
                        *emitter_address,
                        event_name,
                        *event_index,
                        name_or_index,
                    ) {
                        Ok(value) => Completion::Success(ExecutionResult::EventArgument { value }),
                        Err(failure) => Completion::Failure(failure),
                    },
                )
            }
        }
    }

    /// Runs the future's on-chain interaction, requesting it first unless an
    /// earlier run already did.
    async fn onchain(
        &self,
        execution: &ExecutionState,
        to: Option<Address>,
        data: Bytes,
        value: U256,
        from: Address,
    ) -> Result<(u32, InteractionOutcome), ExecutionError> {
        let id = match execution.onchain_interactions().last() {
            Some(interaction) => interaction.id,
            None => {
                let id = next_interaction_id(execution);
                self.store.apply(JournalMessage::NetworkInteractionRequest {
                    future_id: execution.id.clone(),
                    interaction: InteractionRequest::Onchain {
                        id,
                        to,
                        data,
                        value,
                        from,
                    },
                })?;
                id
            }
        };
        let outcome = self.tracker.run_onchain(&execution.id, id).await?;
        Ok((id, outcome))
    }

    fn static_call(
        &self,
        execution: &ExecutionState,
        to: Address,
        data: Bytes,
        from: Address,
    ) -> Result<u32, ExecutionError> {
        if let Some(NetworkInteraction::StaticCall(call)) = execution.last_interaction() {
            return Ok(call.id);
        }
        let id = next_interaction_id(execution);
        self.store.apply(JournalMessage::NetworkInteractionRequest {
            future_id: execution.id.clone(),
            interaction: InteractionRequest::StaticCall { id, to, data, from },
        })?;
        Ok(id)
    }

    /// The receipt holding the logs an event read looks at. The transaction
    /// normally belongs to a future of this deployment.
    async fn event_receipt(
        &self,
        future: &Future,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, ExecutionError> {
        if let Future::ReadEventArgument(read) = future {
            let recorded = self.store.with_state(|state| {
                state
                    .get(&read.future_to_read_from)
                    .and_then(ExecutionState::confirmed_receipt)
                    .filter(|receipt| receipt.transaction_hash == hash)
                    .cloned()
            });
            if recorded.is_some() {
                return Ok(recorded);
            }
        }
        Ok(self.tracker.client().receipt(hash).await?)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn context<'a>(&'a self, state: &'a DeploymentState) -> ResolveContext<'a> {
        ResolveContext {
            accounts: &self.accounts,
            parameters: &self.parameters,
            state,
            default_sender: self.config.default_sender,
        }
    }

    fn artifact(&self, future: &Future) -> Result<&Artifact, ExecutionError> {
        self.artifacts
            .contract_artifact(future)
            .ok_or_else(|| ExecutionError::MissingArtifact(future.id().to_string()))
    }

    fn execution(&self, future_id: &str) -> ExecutionState {
        self.store
            .with_state(|state| state.get(future_id).cloned())
            .unwrap_or_else(|| panic!("{future_id} has no execution state after starting"))
    }
}

fn next_interaction_id(execution: &ExecutionState) -> u32 {
    execution.network_interactions.len() as u32 + 1
}

fn transaction_result(
    interaction_id: u32,
    outcome: InteractionOutcome,
    artifact: Option<&Artifact>,
) -> Completion {
    match outcome {
        InteractionOutcome::Confirmed(receipt) if receipt.is_success() => {
            Completion::Success(ExecutionResult::Transaction {
                hash: receipt.transaction_hash,
            })
        }
        outcome => unsuccessful(interaction_id, outcome, artifact),
    }
}

fn unsuccessful(
    interaction_id: u32,
    outcome: InteractionOutcome,
    artifact: Option<&Artifact>,
) -> Completion {
    match outcome {
        InteractionOutcome::Confirmed(receipt) => Completion::Failure(FailureReason::Reverted {
            hash: receipt.transaction_hash,
            reason: abi::RevertReason::Empty,
        }),
        InteractionOutcome::SimulationReverted(data) => {
            Completion::Failure(FailureReason::SimulationReverted {
                reason: abi::decode_revert(&data, artifact),
            })
        }
        InteractionOutcome::TimedOut => Completion::TimedOut { interaction_id },
    }
}

/// Reads one argument of the `event_index`-th `event_name` log emitted by
/// `emitter` in `receipt`.
fn read_event(
    artifact: &Artifact,
    receipt: &TransactionReceipt,
    emitter: Address,
    event_name: &str,
    event_index: usize,
    name_or_index: &NameOrIndex,
) -> Result<Literal, FailureReason> {
    let decoding = |err: AbiError| FailureReason::Decoding {
        message: err.to_string(),
    };
    let event = abi::find_event(artifact, event_name).map_err(decoding)?;
    let topic = abi::event_topic(event).map_err(decoding)?;
    let log = receipt
        .logs
        .iter()
        .filter(|log| log.address == emitter && log.topics.first() == Some(&topic))
        .nth(event_index)
        .ok_or_else(|| FailureReason::EventNotFound {
            message: format!(
                "event {event_name} #{event_index} was not emitted by {emitter} in transaction {}",
                receipt.transaction_hash
            ),
        })?;
    let values = abi::decode_event(event, &log.topics, &log.data).map_err(decoding)?;
    abi::select_value(&event.inputs, values, name_or_index).map_err(decoding)
}
