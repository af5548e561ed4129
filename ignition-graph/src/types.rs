//! Core value types shared by futures, execution states and the journal.

use alloy_primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier of a future within a deployment (e.g. `Token#Token`).
pub type FutureId = String;

/// Identifier of the module a future was declared in.
pub type ModuleId = String;

/// Type tag of a future. Mirrored by the execution state recorded for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FutureType {
    NamedArtifactContractDeployment,
    ContractDeployment,
    NamedArtifactLibraryDeployment,
    LibraryDeployment,
    ContractCall,
    StaticCall,
    EncodeFunctionCall,
    NamedArtifactContractAt,
    ContractAt,
    ReadEventArgument,
    SendData,
}

impl FutureType {
    /// Returns true if the future deploys new bytecode.
    pub fn is_deployment(&self) -> bool {
        matches!(
            self,
            FutureType::NamedArtifactContractDeployment
                | FutureType::ContractDeployment
                | FutureType::NamedArtifactLibraryDeployment
                | FutureType::LibraryDeployment
        )
    }

    /// Returns true if the future's result is a contract address with an ABI.
    pub fn is_contract(&self) -> bool {
        self.is_deployment()
            || matches!(
                self,
                FutureType::NamedArtifactContractAt | FutureType::ContractAt
            )
    }

    /// Returns true if the future sends a transaction whose receipt can be read.
    pub fn has_transaction(&self) -> bool {
        self.is_deployment() || matches!(self, FutureType::ContractCall | FutureType::SendData)
    }
}

impl fmt::Display for FutureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FutureType::NamedArtifactContractDeployment => "named artifact contract deployment",
            FutureType::ContractDeployment => "contract deployment",
            FutureType::NamedArtifactLibraryDeployment => "named artifact library deployment",
            FutureType::LibraryDeployment => "library deployment",
            FutureType::ContractCall => "contract call",
            FutureType::StaticCall => "static call",
            FutureType::EncodeFunctionCall => "encode function call",
            FutureType::NamedArtifactContractAt => "named artifact contract at",
            FutureType::ContractAt => "contract at",
            FutureType::ReadEventArgument => "read event argument",
            FutureType::SendData => "send data",
        };
        f.write_str(name)
    }
}

/// A concrete Solidity-compatible value.
///
/// Integers are arbitrary precision (256 bit) so wei amounts survive
/// serialization exactly. Addresses, `bytes` and `bytesN` are carried as
/// hex strings and coerced by the ABI encoder according to the parameter type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Literal {
    Bool(bool),
    Uint(U256),
    Int(I256),
    String(String),
    Array(Vec<Literal>),
    Struct(BTreeMap<String, Literal>),
}

impl Literal {
    /// Returns the string payload, if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer, if it is representable as one.
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Literal::Uint(v) => Some(*v),
            Literal::Int(v) if !v.is_negative() => Some(v.into_raw()),
            Literal::String(s) => s.parse::<U256>().ok(),
            _ => None,
        }
    }

    /// Returns the value as an address, if it is a well-formed address string.
    pub fn as_address(&self) -> Option<Address> {
        self.as_str().and_then(|s| s.parse::<Address>().ok())
    }

    /// Compares two literals, treating address and hex strings case-insensitively.
    pub fn loosely_equals(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::String(a), Literal::String(b)) => {
                a == b || (a.starts_with("0x") && a.eq_ignore_ascii_case(b))
            }
            (Literal::Array(a), Literal::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (Literal::Struct(a), Literal::Struct(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loosely_equals(vb))
            }
            (Literal::Uint(a), Literal::Int(b)) | (Literal::Int(b), Literal::Uint(a)) => {
                !b.is_negative() && b.into_raw() == *a
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Uint(v) => write!(f, "{v}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::String(s) => write!(f, "\"{s}\""),
            Literal::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Literal::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<u64> for Literal {
    fn from(value: u64) -> Self {
        Literal::Uint(U256::from(value))
    }
}

impl From<U256> for Literal {
    fn from(value: U256) -> Self {
        Literal::Uint(value)
    }
}

impl From<I256> for Literal {
    fn from(value: I256) -> Self {
        Literal::Int(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<Address> for Literal {
    fn from(value: Address) -> Self {
        Literal::String(value.to_checksum(None))
    }
}

/// An argument as declared in the graph.
///
/// Runtime values (accounts and module parameters) and references to other
/// futures' results are resolved late, in a single pass, right before
/// reconciliation or execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Argument {
    /// A value known at declaration time.
    Literal { value: Literal },
    /// The result of another future (an address, a static call value, an
    /// event argument or encoded call data).
    Future { id: FutureId },
    /// The address of the account at this index.
    Account { index: usize },
    /// A module parameter supplied at deploy time.
    #[serde(rename_all = "camelCase")]
    Parameter {
        module_id: ModuleId,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Literal>,
    },
    /// An array whose items may themselves be runtime values.
    Array { items: Vec<Argument> },
    /// A struct whose fields may themselves be runtime values.
    Struct { fields: BTreeMap<String, Argument> },
}

impl Argument {
    pub fn literal(value: impl Into<Literal>) -> Self {
        Argument::Literal {
            value: value.into(),
        }
    }

    pub fn future(id: impl Into<FutureId>) -> Self {
        Argument::Future { id: id.into() }
    }

    pub fn account(index: usize) -> Self {
        Argument::Account { index }
    }

    pub fn parameter(module_id: impl Into<ModuleId>, name: impl Into<String>) -> Self {
        Argument::Parameter {
            module_id: module_id.into(),
            name: name.into(),
            default: None,
        }
    }

    /// Collects the ids of every future referenced by this argument.
    pub fn referenced_futures<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Argument::Future { id } => out.push(id),
            Argument::Array { items } => items.iter().for_each(|item| item.referenced_futures(out)),
            Argument::Struct { fields } => {
                fields.values().for_each(|field| field.referenced_futures(out))
            }
            Argument::Literal { .. } | Argument::Account { .. } | Argument::Parameter { .. } => {}
        }
    }
}

impl From<Literal> for Argument {
    fn from(value: Literal) -> Self {
        Argument::Literal { value }
    }
}

/// Which account sends the transactions of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Sender {
    Account { index: usize },
    Address { address: Address },
}

/// Selects one value out of a function's outputs or an event's arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameOrIndex {
    Index(usize),
    Name(String),
}

impl Default for NameOrIndex {
    fn default() -> Self {
        NameOrIndex::Index(0)
    }
}

impl fmt::Display for NameOrIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameOrIndex::Index(i) => write!(f, "#{i}"),
            NameOrIndex::Name(name) => f.write_str(name),
        }
    }
}
