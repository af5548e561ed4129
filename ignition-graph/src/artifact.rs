//! Compiled contract artifacts, in the shape build tools emit them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A compiled contract: its ABI and (possibly unlinked) creation bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    #[serde(default)]
    pub source_name: String,
    pub abi: Vec<AbiItem>,
    /// Hex-encoded creation bytecode. Unlinked library slots are marked with
    /// `__$...$__` placeholders located by `link_references`.
    pub bytecode: String,
    /// source name -> library name -> byte ranges to patch with the library address.
    #[serde(default)]
    pub link_references: BTreeMap<String, BTreeMap<String, Vec<LinkReference>>>,
}

/// A byte range in the creation bytecode that must hold a library address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    pub start: usize,
    pub length: usize,
}

/// One entry of a JSON ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AbiItem {
    Function(AbiFunction),
    Constructor(AbiConstructor),
    Event(AbiEvent),
    Error(AbiError),
    Fallback(AbiSpecial),
    Receive(AbiSpecial),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiParam>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub indexed: bool,
}

impl AbiParam {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            components: Vec::new(),
            indexed: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiFunction {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    #[serde(default = "default_mutability")]
    pub state_mutability: String,
}

impl AbiFunction {
    /// Returns true if calling the function cannot change state.
    pub fn is_read_only(&self) -> bool {
        matches!(self.state_mutability.as_str(), "view" | "pure")
    }

    pub fn is_payable(&self) -> bool {
        self.state_mutability == "payable"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiConstructor {
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default = "default_mutability")]
    pub state_mutability: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEvent {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiError {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiSpecial {
    #[serde(default = "default_mutability")]
    pub state_mutability: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_mutability() -> String {
    "nonpayable".to_string()
}

impl Artifact {
    /// Functions with the given bare name (overloads included).
    pub fn functions_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a AbiFunction> {
        self.functions().filter(move |f| f.name == name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &AbiFunction> {
        self.abi.iter().filter_map(|item| match item {
            AbiItem::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &AbiEvent> {
        self.abi.iter().filter_map(|item| match item {
            AbiItem::Event(e) => Some(e),
            _ => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &AbiError> {
        self.abi.iter().filter_map(|item| match item {
            AbiItem::Error(e) => Some(e),
            _ => None,
        })
    }

    pub fn constructor(&self) -> Option<&AbiConstructor> {
        self.abi.iter().find_map(|item| match item {
            AbiItem::Constructor(c) => Some(c),
            _ => None,
        })
    }

    /// Names of every library the bytecode must be linked against, as
    /// `(source name, library name)` pairs.
    pub fn required_libraries(&self) -> Vec<(&str, &str)> {
        self.link_references
            .iter()
            .flat_map(|(source, libs)| libs.keys().map(move |lib| (source.as_str(), lib.as_str())))
            .collect()
    }

    /// Returns the fully qualified name `source:Contract`, when the source is known.
    pub fn fully_qualified_name(&self) -> String {
        if self.source_name.is_empty() {
            self.contract_name.clone()
        } else {
            format!("{}:{}", self.source_name, self.contract_name)
        }
    }
}
