//! The future kinds a deployment graph is made of.

use crate::artifact::Artifact;
use crate::types::{Argument, FutureId, FutureType, ModuleId, NameOrIndex, Sender};
use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the artifact of a contract future comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum ArtifactSource {
    /// Resolved by contract name (plain or fully qualified) at deploy time.
    Named,
    /// Supplied inline by the module author.
    Provided { artifact: Box<Artifact> },
}

impl Default for ArtifactSource {
    fn default() -> Self {
        ArtifactSource::Named
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDeployment {
    pub id: FutureId,
    pub module_id: ModuleId,
    pub contract_name: String,
    #[serde(default)]
    pub artifact: ArtifactSource,
    #[serde(default)]
    pub constructor_args: Vec<Argument>,
    /// Library name -> id of the library deployment future to link against.
    #[serde(default)]
    pub libraries: BTreeMap<String, FutureId>,
    #[serde(default)]
    pub value: Option<Argument>,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDeployment {
    pub id: FutureId,
    pub module_id: ModuleId,
    pub contract_name: String,
    #[serde(default)]
    pub artifact: ArtifactSource,
    #[serde(default)]
    pub libraries: BTreeMap<String, FutureId>,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    pub id: FutureId,
    pub module_id: ModuleId,
    /// The contract future whose address and ABI are used.
    pub contract: FutureId,
    pub function_name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub value: Option<Argument>,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticCall {
    pub id: FutureId,
    pub module_id: ModuleId,
    pub contract: FutureId,
    pub function_name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub name_or_index: NameOrIndex,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeFunctionCall {
    pub id: FutureId,
    pub module_id: ModuleId,
    pub contract: FutureId,
    pub function_name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAt {
    pub id: FutureId,
    pub module_id: ModuleId,
    pub contract_name: String,
    #[serde(default)]
    pub artifact: ArtifactSource,
    pub address: Argument,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadEventArgument {
    pub id: FutureId,
    pub module_id: ModuleId,
    /// Contract future whose ABI describes the event and whose address emitted it.
    pub emitter: FutureId,
    /// Deployment, call or send-data future whose transaction holds the log.
    pub future_to_read_from: FutureId,
    pub event_name: String,
    #[serde(default)]
    pub name_or_index: NameOrIndex,
    /// Which occurrence of the event to read when it is emitted several times.
    #[serde(default)]
    pub event_index: usize,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendData {
    pub id: FutureId,
    pub module_id: ModuleId,
    pub to: Argument,
    #[serde(default)]
    pub data: Option<Bytes>,
    #[serde(default)]
    pub value: Option<Argument>,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub dependencies: Vec<FutureId>,
}

/// A single planned deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Future {
    ContractDeployment(ContractDeployment),
    LibraryDeployment(LibraryDeployment),
    ContractCall(ContractCall),
    StaticCall(StaticCall),
    EncodeFunctionCall(EncodeFunctionCall),
    ContractAt(ContractAt),
    ReadEventArgument(ReadEventArgument),
    SendData(SendData),
}

impl Future {
    pub fn id(&self) -> &str {
        match self {
            Future::ContractDeployment(f) => &f.id,
            Future::LibraryDeployment(f) => &f.id,
            Future::ContractCall(f) => &f.id,
            Future::StaticCall(f) => &f.id,
            Future::EncodeFunctionCall(f) => &f.id,
            Future::ContractAt(f) => &f.id,
            Future::ReadEventArgument(f) => &f.id,
            Future::SendData(f) => &f.id,
        }
    }

    pub fn module_id(&self) -> &str {
        match self {
            Future::ContractDeployment(f) => &f.module_id,
            Future::LibraryDeployment(f) => &f.module_id,
            Future::ContractCall(f) => &f.module_id,
            Future::StaticCall(f) => &f.module_id,
            Future::EncodeFunctionCall(f) => &f.module_id,
            Future::ContractAt(f) => &f.module_id,
            Future::ReadEventArgument(f) => &f.module_id,
            Future::SendData(f) => &f.module_id,
        }
    }

    pub fn future_type(&self) -> FutureType {
        match self {
            Future::ContractDeployment(f) => match f.artifact {
                ArtifactSource::Named => FutureType::NamedArtifactContractDeployment,
                ArtifactSource::Provided { .. } => FutureType::ContractDeployment,
            },
            Future::LibraryDeployment(f) => match f.artifact {
                ArtifactSource::Named => FutureType::NamedArtifactLibraryDeployment,
                ArtifactSource::Provided { .. } => FutureType::LibraryDeployment,
            },
            Future::ContractCall(_) => FutureType::ContractCall,
            Future::StaticCall(_) => FutureType::StaticCall,
            Future::EncodeFunctionCall(_) => FutureType::EncodeFunctionCall,
            Future::ContractAt(f) => match f.artifact {
                ArtifactSource::Named => FutureType::NamedArtifactContractAt,
                ArtifactSource::Provided { .. } => FutureType::ContractAt,
            },
            Future::ReadEventArgument(_) => FutureType::ReadEventArgument,
            Future::SendData(_) => FutureType::SendData,
        }
    }

    /// The explicitly declared sender, if any.
    pub fn from(&self) -> Option<&Sender> {
        match self {
            Future::ContractDeployment(f) => f.from.as_ref(),
            Future::LibraryDeployment(f) => f.from.as_ref(),
            Future::ContractCall(f) => f.from.as_ref(),
            Future::StaticCall(f) => f.from.as_ref(),
            Future::SendData(f) => f.from.as_ref(),
            Future::EncodeFunctionCall(_) | Future::ContractAt(_) | Future::ReadEventArgument(_) => {
                None
            }
        }
    }

    /// The contract name and artifact source, for futures that carry their own artifact.
    pub fn artifact_source(&self) -> Option<(&str, &ArtifactSource)> {
        match self {
            Future::ContractDeployment(f) => Some((&f.contract_name, &f.artifact)),
            Future::LibraryDeployment(f) => Some((&f.contract_name, &f.artifact)),
            Future::ContractAt(f) => Some((&f.contract_name, &f.artifact)),
            _ => None,
        }
    }

    /// Every argument of the future, in declaration order.
    pub fn arguments(&self) -> Vec<&Argument> {
        match self {
            Future::ContractDeployment(f) => {
                f.constructor_args.iter().chain(f.value.as_ref()).collect()
            }
            Future::LibraryDeployment(_) => Vec::new(),
            Future::ContractCall(f) => f.args.iter().chain(f.value.as_ref()).collect(),
            Future::StaticCall(f) => f.args.iter().collect(),
            Future::EncodeFunctionCall(f) => f.args.iter().collect(),
            Future::ContractAt(f) => vec![&f.address],
            Future::ReadEventArgument(_) => Vec::new(),
            Future::SendData(f) => std::iter::once(&f.to).chain(f.value.as_ref()).collect(),
        }
    }

    /// Explicit and implicit dependencies, deduplicated, in declaration order.
    ///
    /// Implicit dependencies are the contract a call targets, linked libraries,
    /// the emitter and transaction source of an event read, and every future
    /// referenced from an argument.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        match self {
            Future::ContractDeployment(f) => {
                deps.extend(f.libraries.values().map(String::as_str));
                deps.extend(f.dependencies.iter().map(String::as_str));
            }
            Future::LibraryDeployment(f) => {
                deps.extend(f.libraries.values().map(String::as_str));
                deps.extend(f.dependencies.iter().map(String::as_str));
            }
            Future::ContractCall(f) => {
                deps.push(&f.contract);
                deps.extend(f.dependencies.iter().map(String::as_str));
            }
            Future::StaticCall(f) => {
                deps.push(&f.contract);
                deps.extend(f.dependencies.iter().map(String::as_str));
            }
            Future::EncodeFunctionCall(f) => {
                deps.push(&f.contract);
                deps.extend(f.dependencies.iter().map(String::as_str));
            }
            Future::ContractAt(f) => deps.extend(f.dependencies.iter().map(String::as_str)),
            Future::ReadEventArgument(f) => {
                deps.push(&f.emitter);
                deps.push(&f.future_to_read_from);
                deps.extend(f.dependencies.iter().map(String::as_str));
            }
            Future::SendData(f) => deps.extend(f.dependencies.iter().map(String::as_str)),
        }
        for arg in self.arguments() {
            arg.referenced_futures(&mut deps);
        }

        let mut seen = std::collections::HashSet::new();
        deps.retain(|id| seen.insert(*id));
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Literal;

    fn call(id: &str, contract: &str, args: Vec<Argument>) -> Future {
        Future::ContractCall(ContractCall {
            id: id.to_string(),
            module_id: "M".to_string(),
            contract: contract.to_string(),
            function_name: "set".to_string(),
            args,
            value: None,
            from: None,
            dependencies: Vec::new(),
        })
    }

    #[test]
    fn test_dependencies_include_implicit_references() {
        let future = call(
            "M#set",
            "M#Store",
            vec![Argument::future("M#Token"), Argument::future("M#Store")],
        );
        assert_eq!(future.dependencies(), vec!["M#Store", "M#Token"]);
    }

    #[test]
    fn test_future_type_follows_artifact_source() {
        let named = Future::ContractAt(ContractAt {
            id: "M#At".to_string(),
            module_id: "M".to_string(),
            contract_name: "Token".to_string(),
            artifact: ArtifactSource::Named,
            address: Argument::literal(Literal::from("0x0000000000000000000000000000000000000001")),
            dependencies: Vec::new(),
        });
        assert_eq!(named.future_type(), FutureType::NamedArtifactContractAt);
        assert!(named.future_type().is_contract());
    }

    #[test]
    fn test_future_json_shape() {
        let json = r#"{
            "type": "sendData",
            "id": "M#fund",
            "moduleId": "M",
            "to": {"kind": "account", "index": 1},
            "value": {"kind": "literal", "value": {"kind": "uint", "value": "0x2a"}}
        }"#;
        let future: Future = serde_json::from_str(json).unwrap();
        assert_eq!(future.id(), "M#fund");
        assert_eq!(future.future_type(), FutureType::SendData);
        assert!(future.dependencies().is_empty());
    }
}
