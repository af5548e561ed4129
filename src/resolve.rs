//! Late resolution of runtime values.
//!
//! Arguments may reference accounts, module parameters and other futures'
//! results. All of them are resolved here, in one pass over a future, against
//! the current accounts, parameters and deployment state. Reconciliation and
//! execution both consume the output of this pass and never resolve inline.

use crate::state::{DeploymentState, ExecutionInputs, ExecutionResult, ExecutionStatus};
use alloy_primitives::{hex, Address, Bytes, U256};
use ignition_graph::{Argument, Future, FutureId, Literal, ModuleId, Sender};
use std::collections::BTreeMap;
use thiserror::Error;

/// Module id -> parameter name -> value.
pub type DeploymentParameters = BTreeMap<ModuleId, BTreeMap<String, Literal>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("account index {index} is out of range; the network has {available} accounts")]
    AccountOutOfRange { index: usize, available: usize },
    #[error("parameter {module_id}.{name} was not provided and has no default")]
    MissingParameter { module_id: ModuleId, name: String },
    #[error("future {0} has not completed successfully")]
    FutureNotExecuted(FutureId),
    #[error("the result of future {0} cannot be used as a value")]
    NotAValue(FutureId),
    #[error("future {0} did not produce a contract address")]
    NotAContract(FutureId),
    #[error("future {0} has no confirmed transaction")]
    NoTransaction(FutureId),
    #[error("{value} is not a valid {expected}")]
    InvalidValue { expected: &'static str, value: String },
}

/// Everything runtime values are resolved against.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub accounts: &'a [Address],
    pub parameters: &'a DeploymentParameters,
    pub state: &'a DeploymentState,
    /// Account index used for futures that do not declare a sender.
    pub default_sender: usize,
}

impl<'a> ResolveContext<'a> {
    pub fn account(&self, index: usize) -> Result<Address, ResolveError> {
        self.accounts
            .get(index)
            .copied()
            .ok_or(ResolveError::AccountOutOfRange {
                index,
                available: self.accounts.len(),
            })
    }

    pub fn sender(&self, sender: Option<&Sender>) -> Result<Address, ResolveError> {
        match sender {
            Some(Sender::Account { index }) => self.account(*index),
            Some(Sender::Address { address }) => Ok(*address),
            None => self.account(self.default_sender),
        }
    }

    /// The result of a dependency, which must have succeeded.
    pub fn result_of(&self, future_id: &str) -> Result<&'a ExecutionResult, ResolveError> {
        self.state
            .get(future_id)
            .filter(|s| s.status == ExecutionStatus::Success)
            .and_then(|s| s.result.as_ref())
            .ok_or_else(|| ResolveError::FutureNotExecuted(future_id.to_string()))
    }

    pub fn contract_address(&self, future_id: &str) -> Result<Address, ResolveError> {
        self.result_of(future_id)?
            .address()
            .ok_or_else(|| ResolveError::NotAContract(future_id.to_string()))
    }

    pub fn argument(&self, argument: &Argument) -> Result<Literal, ResolveError> {
        match argument {
            Argument::Literal { value } => Ok(value.clone()),
            Argument::Account { index } => self.account(*index).map(Literal::from),
            Argument::Parameter {
                module_id,
                name,
                default,
            } => self
                .parameters
                .get(module_id)
                .and_then(|params| params.get(name))
                .or(default.as_ref())
                .cloned()
                .ok_or_else(|| ResolveError::MissingParameter {
                    module_id: module_id.clone(),
                    name: name.clone(),
                }),
            Argument::Future { id } => match self.result_of(id)? {
                ExecutionResult::Deployed { address } | ExecutionResult::ContractAt { address } => {
                    Ok(Literal::from(*address))
                }
                ExecutionResult::StaticCall { value } | ExecutionResult::EventArgument { value } => {
                    Ok(value.clone())
                }
                ExecutionResult::Encoded { data } => Ok(Literal::String(hex::encode_prefixed(data))),
                ExecutionResult::Transaction { .. } => Err(ResolveError::NotAValue(id.clone())),
            },
            Argument::Array { items } => items
                .iter()
                .map(|item| self.argument(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Literal::Array),
            Argument::Struct { fields } => fields
                .iter()
                .map(|(name, field)| Ok((name.clone(), self.argument(field)?)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Literal::Struct),
        }
    }

    pub fn arguments(&self, arguments: &[Argument]) -> Result<Vec<Literal>, ResolveError> {
        arguments.iter().map(|arg| self.argument(arg)).collect()
    }

    pub fn address(&self, argument: &Argument) -> Result<Address, ResolveError> {
        let value = self.argument(argument)?;
        value.as_address().ok_or_else(|| ResolveError::InvalidValue {
            expected: "address",
            value: value.to_string(),
        })
    }

    /// Wei amount; absent means zero.
    pub fn value(&self, argument: Option<&Argument>) -> Result<U256, ResolveError> {
        let Some(argument) = argument else {
            return Ok(U256::ZERO);
        };
        let value = self.argument(argument)?;
        value.as_uint().ok_or_else(|| ResolveError::InvalidValue {
            expected: "amount of wei",
            value: value.to_string(),
        })
    }

    /// Resolves every runtime value of `future` into the inputs it executes with.
    pub fn inputs(&self, future: &Future) -> Result<ExecutionInputs, ResolveError> {
        Ok(match future {
            Future::ContractDeployment(f) => ExecutionInputs::Deployment {
                contract_name: f.contract_name.clone(),
                constructor_args: self.arguments(&f.constructor_args)?,
                libraries: self.libraries(&f.libraries)?,
                value: self.value(f.value.as_ref())?,
                from: self.sender(f.from.as_ref())?,
            },
            Future::LibraryDeployment(f) => ExecutionInputs::Deployment {
                contract_name: f.contract_name.clone(),
                constructor_args: Vec::new(),
                libraries: self.libraries(&f.libraries)?,
                value: U256::ZERO,
                from: self.sender(f.from.as_ref())?,
            },
            Future::ContractCall(f) => ExecutionInputs::Call {
                contract_address: self.contract_address(&f.contract)?,
                function_name: f.function_name.clone(),
                args: self.arguments(&f.args)?,
                value: self.value(f.value.as_ref())?,
                from: self.sender(f.from.as_ref())?,
            },
            Future::StaticCall(f) => ExecutionInputs::StaticCall {
                contract_address: self.contract_address(&f.contract)?,
                function_name: f.function_name.clone(),
                args: self.arguments(&f.args)?,
                name_or_index: f.name_or_index.clone(),
                from: self.sender(f.from.as_ref())?,
            },
            Future::EncodeFunctionCall(f) => ExecutionInputs::EncodeFunctionCall {
                function_name: f.function_name.clone(),
                args: self.arguments(&f.args)?,
            },
            Future::ContractAt(f) => {
                let address = match self.argument(&f.address)? {
                    Literal::String(address) => address,
                    other => other.to_string(),
                };
                ExecutionInputs::ContractAt {
                    contract_name: f.contract_name.clone(),
                    address,
                }
            }
            Future::ReadEventArgument(f) => ExecutionInputs::ReadEventArgument {
                emitter_address: self.contract_address(&f.emitter)?,
                transaction_hash: self
                    .state
                    .get(&f.future_to_read_from)
                    .and_then(|s| s.confirmed_receipt())
                    .map(|receipt| receipt.transaction_hash)
                    .ok_or_else(|| ResolveError::NoTransaction(f.future_to_read_from.clone()))?,
                event_name: f.event_name.clone(),
                event_index: f.event_index,
                name_or_index: f.name_or_index.clone(),
            },
            Future::SendData(f) => ExecutionInputs::SendData {
                to: self.address(&f.to)?,
                data: f.data.clone().unwrap_or_else(Bytes::new),
                value: self.value(f.value.as_ref())?,
                from: self.sender(f.from.as_ref())?,
            },
        })
    }

    fn libraries(
        &self,
        libraries: &BTreeMap<String, FutureId>,
    ) -> Result<BTreeMap<String, Address>, ResolveError> {
        libraries
            .iter()
            .map(|(name, id)| Ok((name.clone(), self.contract_address(id)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::state::ExecutionState;
    use ignition_graph::{FutureType, SendData};

    fn succeeded(state: &mut DeploymentState, id: &str, result: ExecutionResult) {
        state.execution_states.insert(
            id.to_string(),
            ExecutionState {
                id: id.to_string(),
                future_type: FutureType::NamedArtifactContractDeployment,
                status: ExecutionStatus::Success,
                strategy: StrategyConfig::Basic,
                dependencies: Default::default(),
                inputs: ExecutionInputs::EncodeFunctionCall {
                    function_name: "f".to_string(),
                    args: Vec::new(),
                },
                network_interactions: Vec::new(),
                result: Some(result),
                failure: None,
            },
        );
    }

    #[test]
    fn test_runtime_values_resolve_against_current_context() {
        let accounts = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let mut parameters = DeploymentParameters::new();
        parameters
            .entry("M".to_string())
            .or_default()
            .insert("supply".to_string(), Literal::from(1000u64));
        let mut state = DeploymentState::default();
        succeeded(
            &mut state,
            "M#Token",
            ExecutionResult::Deployed {
                address: Address::repeat_byte(9),
            },
        );
        let ctx = ResolveContext {
            accounts: &accounts,
            parameters: &parameters,
            state: &state,
            default_sender: 0,
        };

        let resolved = ctx
            .arguments(&[
                Argument::account(1),
                Argument::parameter("M", "supply"),
                Argument::future("M#Token"),
                Argument::Parameter {
                    module_id: "M".to_string(),
                    name: "missing".to_string(),
                    default: Some(Literal::Bool(true)),
                },
            ])
            .unwrap();
        assert_eq!(
            resolved,
            vec![
                Literal::from(Address::repeat_byte(2)),
                Literal::from(1000u64),
                Literal::from(Address::repeat_byte(9)),
                Literal::Bool(true),
            ]
        );
    }

    #[test]
    fn test_unresolvable_values_are_errors() {
        let accounts = [Address::repeat_byte(1)];
        let parameters = DeploymentParameters::new();
        let state = DeploymentState::default();
        let ctx = ResolveContext {
            accounts: &accounts,
            parameters: &parameters,
            state: &state,
            default_sender: 0,
        };

        assert_eq!(
            ctx.argument(&Argument::account(3)),
            Err(ResolveError::AccountOutOfRange {
                index: 3,
                available: 1
            })
        );
        assert!(matches!(
            ctx.argument(&Argument::parameter("M", "x")),
            Err(ResolveError::MissingParameter { .. })
        ));
        assert_eq!(
            ctx.argument(&Argument::future("M#A")),
            Err(ResolveError::FutureNotExecuted("M#A".to_string()))
        );
    }

    #[test]
    fn test_send_data_inputs_use_default_sender() {
        let accounts = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let parameters = DeploymentParameters::new();
        let state = DeploymentState::default();
        let ctx = ResolveContext {
            accounts: &accounts,
            parameters: &parameters,
            state: &state,
            default_sender: 1,
        };
        let future = Future::SendData(SendData {
            id: "M#send".to_string(),
            module_id: "M".to_string(),
            to: Argument::account(0),
            data: None,
            value: Some(Argument::literal(5u64)),
            from: None,
            dependencies: Vec::new(),
        });
        assert_eq!(
            ctx.inputs(&future).unwrap(),
            ExecutionInputs::SendData {
                to: Address::repeat_byte(1),
                data: Bytes::new(),
                value: U256::from(5u64),
                from: Address::repeat_byte(2),
            }
        );
    }
}
