//! Structural checks for futures that have not executed yet.
//!
//! Futures with recorded history are covered by reconciliation; the rest are
//! checked here before anything is sent, so that an obviously broken module
//! fails fast instead of halfway through a deployment.

use crate::abi::{self, AbiError, SolType};
use crate::artifacts::ArtifactStore;
use crate::resolve::DeploymentParameters;
use crate::state::DeploymentState;
use alloy_primitives::Address;
use ignition_graph::{AbiParam, Argument, Future, FutureGraph, FutureId, NameOrIndex, Sender};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{future}: no artifact loaded for {contract}")]
    MissingArtifact { future: FutureId, contract: String },
    #[error("{future}: {name} is not a valid function name")]
    InvalidFunctionName { future: FutureId, name: String },
    #[error("{future}: {source}")]
    Abi {
        future: FutureId,
        #[source]
        source: AbiError,
    },
    #[error("{future}: function {function} is not view or pure and cannot be called statically")]
    NotReadOnly { future: FutureId, function: String },
    #[error("{future}: function {function} is not payable but a value is sent")]
    NotPayable { future: FutureId, function: String },
    #[error("{future}: {function} has no output {output}")]
    UnknownOutput {
        future: FutureId,
        function: String,
        output: NameOrIndex,
    },
    #[error("{future}: event {event} has no argument {argument}")]
    UnknownEventArgument {
        future: FutureId,
        event: String,
        argument: NameOrIndex,
    },
    #[error("{future}: account index {index} is out of range; the network has {available} accounts")]
    AccountOutOfRange {
        future: FutureId,
        index: usize,
        available: usize,
    },
    #[error("{future}: parameter {module_id}.{name} was not provided and has no default")]
    MissingParameter {
        future: FutureId,
        module_id: String,
        name: String,
    },
    #[error("{future}: library {library} is not linked by {contract}")]
    UnusedLibrary {
        future: FutureId,
        contract: String,
        library: String,
    },
    #[error("{future}: {contract} needs library {library}, which is not provided")]
    MissingLibrary {
        future: FutureId,
        contract: String,
        library: String,
    },
}

/// Validates every future of `graph` that has no execution state.
pub fn validate(
    graph: &FutureGraph,
    state: &DeploymentState,
    artifacts: &ArtifactStore,
    parameters: &DeploymentParameters,
    accounts: &[Address],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for future in graph.iter().filter(|f| state.get(f.id()).is_none()) {
        let checker = Checker {
            future,
            artifacts,
            parameters,
            accounts,
        };
        if let Err(err) = checker.check() {
            errors.push(err);
        }
    }
    errors
}

struct Checker<'a> {
    future: &'a Future,
    artifacts: &'a ArtifactStore,
    parameters: &'a DeploymentParameters,
    accounts: &'a [Address],
}

impl Checker<'_> {
    fn id(&self) -> FutureId {
        self.future.id().to_string()
    }

    fn check(&self) -> Result<(), ValidationError> {
        if let Some(Sender::Account { index }) = self.future.from() {
            self.account(*index)?;
        }
        for argument in self.future.arguments() {
            self.runtime_values(argument)?;
        }

        match self.future {
            Future::ContractDeployment(f) => {
                let artifact = self.artifact()?;
                let inputs = artifact
                    .constructor()
                    .map(|c| c.inputs.as_slice())
                    .unwrap_or_default();
                self.argument_count(inputs, f.constructor_args.len())?;
                let payable = artifact
                    .constructor()
                    .is_some_and(|c| c.state_mutability == "payable");
                if f.value.is_some() && !payable {
                    return Err(ValidationError::NotPayable {
                        future: self.id(),
                        function: "constructor".to_string(),
                    });
                }
                self.libraries(&f.contract_name, f.libraries.keys())
            }
            Future::LibraryDeployment(f) => {
                self.artifact()?;
                self.libraries(&f.contract_name, f.libraries.keys())
            }
            Future::ContractCall(f) => {
                let function = self.function(&f.function_name)?;
                self.argument_count(&function.inputs, f.args.len())?;
                if f.value.is_some() && !function.is_payable() {
                    return Err(ValidationError::NotPayable {
                        future: self.id(),
                        function: f.function_name.clone(),
                    });
                }
                Ok(())
            }
            Future::StaticCall(f) => {
                let function = self.function(&f.function_name)?;
                self.argument_count(&function.inputs, f.args.len())?;
                if !function.is_read_only() {
                    return Err(ValidationError::NotReadOnly {
                        future: self.id(),
                        function: f.function_name.clone(),
                    });
                }
                if !selects(&function.outputs, &f.name_or_index) {
                    return Err(ValidationError::UnknownOutput {
                        future: self.id(),
                        function: f.function_name.clone(),
                        output: f.name_or_index.clone(),
                    });
                }
                Ok(())
            }
            Future::EncodeFunctionCall(f) => {
                let function = self.function(&f.function_name)?;
                self.argument_count(&function.inputs, f.args.len())
            }
            Future::ContractAt(_) => self.artifact().map(|_| ()),
            Future::ReadEventArgument(f) => {
                let artifact = self.artifact()?;
                let event = abi::find_event(artifact, &f.event_name).map_err(|source| {
                    ValidationError::Abi {
                        future: self.id(),
                        source,
                    }
                })?;
                if !selects(&event.inputs, &f.name_or_index) {
                    return Err(ValidationError::UnknownEventArgument {
                        future: self.id(),
                        event: f.event_name.clone(),
                        argument: f.name_or_index.clone(),
                    });
                }
                Ok(())
            }
            Future::SendData(_) => Ok(()),
        }
    }

    fn artifact(&self) -> Result<&ignition_graph::Artifact, ValidationError> {
        self.artifacts
            .contract_artifact(self.future)
            .ok_or_else(|| ValidationError::MissingArtifact {
                future: self.id(),
                contract: match self.future.artifact_source() {
                    Some((name, _)) => name.to_string(),
                    None => "its contract".to_string(),
                },
            })
    }

    fn function(&self, name: &str) -> Result<&ignition_graph::AbiFunction, ValidationError> {
        if !abi::is_valid_function_name(name) {
            return Err(ValidationError::InvalidFunctionName {
                future: self.id(),
                name: name.to_string(),
            });
        }
        abi::find_function(self.artifact()?, name).map_err(|source| ValidationError::Abi {
            future: self.id(),
            source,
        })
    }

    fn argument_count(&self, params: &[AbiParam], actual: usize) -> Result<(), ValidationError> {
        if params.len() != actual {
            return Err(ValidationError::Abi {
                future: self.id(),
                source: AbiError::ArgumentCount {
                    expected: params.len(),
                    actual,
                },
            });
        }
        for param in params {
            SolType::parse(param).map_err(|source| ValidationError::Abi {
                future: self.id(),
                source,
            })?;
        }
        Ok(())
    }

    fn libraries<'k>(
        &self,
        contract: &str,
        provided: impl Iterator<Item = &'k String>,
    ) -> Result<(), ValidationError> {
        let artifact = self.artifact()?;
        let required = artifact.required_libraries();
        let provided: Vec<&String> = provided.collect();
        let matches = |name: &str, source: &str, lib: &str| {
            name == lib || name == format!("{source}:{lib}")
        };
        if let Some(extra) = provided
            .iter()
            .find(|name| !required.iter().any(|&(s, l)| matches(name.as_str(), s, l)))
        {
            return Err(ValidationError::UnusedLibrary {
                future: self.id(),
                contract: contract.to_string(),
                library: extra.to_string(),
            });
        }
        if let Some(&(_, missing)) = required
            .iter()
            .find(|&&(s, l)| !provided.iter().any(|name| matches(name.as_str(), s, l)))
        {
            return Err(ValidationError::MissingLibrary {
                future: self.id(),
                contract: contract.to_string(),
                library: missing.to_string(),
            });
        }
        Ok(())
    }

    fn account(&self, index: usize) -> Result<(), ValidationError> {
        if index < self.accounts.len() {
            Ok(())
        } else {
            Err(ValidationError::AccountOutOfRange {
                future: self.id(),
                index,
                available: self.accounts.len(),
            })
        }
    }

    /// Accounts and parameters can be checked now; future references only
    /// resolve once their futures have run.
    fn runtime_values(&self, argument: &Argument) -> Result<(), ValidationError> {
        match argument {
            Argument::Account { index } => self.account(*index),
            Argument::Parameter {
                module_id,
                name,
                default,
            } => {
                let provided = self
                    .parameters
                    .get(module_id)
                    .is_some_and(|params| params.contains_key(name));
                if provided || default.is_some() {
                    Ok(())
                } else {
                    Err(ValidationError::MissingParameter {
                        future: self.id(),
                        module_id: module_id.clone(),
                        name: name.clone(),
                    })
                }
            }
            Argument::Array { items } => items.iter().try_for_each(|i| self.runtime_values(i)),
            Argument::Struct { fields } => {
                fields.values().try_for_each(|f| self.runtime_values(f))
            }
            Argument::Literal { .. } | Argument::Future { .. } => Ok(()),
        }
    }
}

fn selects(params: &[AbiParam], selector: &NameOrIndex) -> bool {
    match selector {
        NameOrIndex::Index(i) => *i < params.len(),
        NameOrIndex::Name(name) => params.iter().any(|p| &p.name == name),
    }
}
