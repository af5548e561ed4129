//! Solidity ABI codec.
//!
//! Covers what the engine needs to talk to contracts: function selectors,
//! call and constructor encoding from [`Literal`] values, result and event
//! decoding back into literals, and revert reason decoding.

use alloy_primitives::{hex, keccak256, Address, Bytes, I256, U256};
use ignition_graph::{AbiEvent, AbiFunction, AbiParam, Artifact, Literal, NameOrIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Selector of `Error(string)`.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of `Panic(uint256)`.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("function {0} not found in the contract ABI")]
    FunctionNotFound(String),
    #[error("function {name} is overloaded; use one of {candidates:?}")]
    AmbiguousFunction { name: String, candidates: Vec<String> },
    #[error("event {0} not found in the contract ABI")]
    EventNotFound(String),
    #[error("event {name} is overloaded; use one of {candidates:?}")]
    AmbiguousEvent { name: String, candidates: Vec<String> },
    #[error("expected {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("value {value} is not a valid {expected}")]
    TypeMismatch { expected: String, value: String },
    #[error("unsupported ABI type {0}")]
    UnsupportedType(String),
    #[error("malformed ABI data: {0}")]
    Decode(String),
    #[error("no output or argument named {0}")]
    OutputNotFound(String),
}

/// A parsed Solidity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolType {
    Address,
    Bool,
    Uint(usize),
    Int(usize),
    FixedBytes(usize),
    Bytes,
    String,
    Array(Box<SolType>),
    FixedArray(Box<SolType>, usize),
    Tuple(Vec<(String, SolType)>),
}

impl SolType {
    pub fn parse(param: &AbiParam) -> Result<Self, AbiError> {
        Self::parse_str(&param.ty, &param.components)
    }

    fn parse_str(ty: &str, components: &[AbiParam]) -> Result<Self, AbiError> {
        if let Some(stripped) = ty.strip_suffix(']') {
            let open = stripped
                .rfind('[')
                .ok_or_else(|| AbiError::UnsupportedType(ty.to_string()))?;
            let inner = Box::new(Self::parse_str(&stripped[..open], components)?);
            let size = &stripped[open + 1..];
            if size.is_empty() {
                return Ok(SolType::Array(inner));
            }
            let size = size
                .parse()
                .map_err(|_| AbiError::UnsupportedType(ty.to_string()))?;
            return Ok(SolType::FixedArray(inner, size));
        }

        let unsupported = || AbiError::UnsupportedType(ty.to_string());
        match ty {
            "address" => Ok(SolType::Address),
            "bool" => Ok(SolType::Bool),
            "string" => Ok(SolType::String),
            "bytes" => Ok(SolType::Bytes),
            "uint" => Ok(SolType::Uint(256)),
            "int" => Ok(SolType::Int(256)),
            "tuple" => components
                .iter()
                .map(|c| Ok((c.name.clone(), Self::parse(c)?)))
                .collect::<Result<Vec<_>, _>>()
                .map(SolType::Tuple),
            _ => {
                if let Some(bits) = ty.strip_prefix("uint") {
                    let bits = parse_bits(bits).ok_or_else(unsupported)?;
                    Ok(SolType::Uint(bits))
                } else if let Some(bits) = ty.strip_prefix("int") {
                    let bits = parse_bits(bits).ok_or_else(unsupported)?;
                    Ok(SolType::Int(bits))
                } else if let Some(len) = ty.strip_prefix("bytes") {
                    match len.parse::<usize>() {
                        Ok(n) if (1..=32).contains(&n) => Ok(SolType::FixedBytes(n)),
                        _ => Err(unsupported()),
                    }
                } else {
                    Err(unsupported())
                }
            }
        }
    }

    /// Canonical type name as used in signatures.
    pub fn canonical(&self) -> String {
        match self {
            SolType::Address => "address".to_string(),
            SolType::Bool => "bool".to_string(),
            SolType::Uint(bits) => format!("uint{bits}"),
            SolType::Int(bits) => format!("int{bits}"),
            SolType::FixedBytes(n) => format!("bytes{n}"),
            SolType::Bytes => "bytes".to_string(),
            SolType::String => "string".to_string(),
            SolType::Array(inner) => format!("{}[]", inner.canonical()),
            SolType::FixedArray(inner, n) => format!("{}[{n}]", inner.canonical()),
            SolType::Tuple(fields) => {
                let inner: Vec<String> = fields.iter().map(|(_, t)| t.canonical()).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            SolType::Bytes | SolType::String | SolType::Array(_) => true,
            SolType::FixedArray(inner, _) => inner.is_dynamic(),
            SolType::Tuple(fields) => fields.iter().any(|(_, t)| t.is_dynamic()),
            _ => false,
        }
    }

    /// Size of the type's slot in the head of an enclosing tuple.
    fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return 32;
        }
        match self {
            SolType::FixedArray(inner, n) => inner.head_size() * n,
            SolType::Tuple(fields) => fields.iter().map(|(_, t)| t.head_size()).sum(),
            _ => 32,
        }
    }
}

fn parse_bits(s: &str) -> Option<usize> {
    let bits: usize = s.parse().ok()?;
    (bits > 0 && bits <= 256 && bits % 8 == 0).then_some(bits)
}

fn parse_params(params: &[AbiParam]) -> Result<Vec<SolType>, AbiError> {
    params.iter().map(SolType::parse).collect()
}

/// Canonical signature, e.g. `transfer(address,uint256)`.
pub fn signature(name: &str, inputs: &[AbiParam]) -> Result<String, AbiError> {
    let types: Vec<String> = parse_params(inputs)?.iter().map(SolType::canonical).collect();
    Ok(format!("{name}({})", types.join(",")))
}

pub fn selector(function: &AbiFunction) -> Result<[u8; 4], AbiError> {
    let sig = signature(&function.name, &function.inputs)?;
    let hash = keccak256(sig.as_bytes());
    Ok([hash[0], hash[1], hash[2], hash[3]])
}

/// Topic 0 of a non-anonymous event.
pub fn event_topic(event: &AbiEvent) -> Result<alloy_primitives::B256, AbiError> {
    Ok(keccak256(signature(&event.name, &event.inputs)?.as_bytes()))
}

/// Finds a function by bare name or by full signature.
///
/// A bare name that matches several overloads is an error; the caller must
/// then use the signature form.
pub fn find_function<'a>(artifact: &'a Artifact, name: &str) -> Result<&'a AbiFunction, AbiError> {
    let by_signature = name.contains('(');
    let matches: Vec<&AbiFunction> = artifact
        .functions()
        .filter(|f| {
            if by_signature {
                signature(&f.name, &f.inputs).is_ok_and(|sig| sig == name)
            } else {
                f.name == name
            }
        })
        .collect();
    match matches.as_slice() {
        [] => Err(AbiError::FunctionNotFound(name.to_string())),
        [function] => Ok(*function),
        _ => Err(AbiError::AmbiguousFunction {
            name: name.to_string(),
            candidates: matches
                .iter()
                .filter_map(|f| signature(&f.name, &f.inputs).ok())
                .collect(),
        }),
    }
}

/// Finds an event by bare name or by full signature.
pub fn find_event<'a>(artifact: &'a Artifact, name: &str) -> Result<&'a AbiEvent, AbiError> {
    let by_signature = name.contains('(');
    let matches: Vec<&AbiEvent> = artifact
        .events()
        .filter(|e| {
            if by_signature {
                signature(&e.name, &e.inputs).is_ok_and(|sig| sig == name)
            } else {
                e.name == name
            }
        })
        .collect();
    match matches.as_slice() {
        [] => Err(AbiError::EventNotFound(name.to_string())),
        [event] => Ok(*event),
        _ => Err(AbiError::AmbiguousEvent {
            name: name.to_string(),
            candidates: matches
                .iter()
                .filter_map(|e| signature(&e.name, &e.inputs).ok())
                .collect(),
        }),
    }
}

/// Returns true if `name` is an identifier, optionally followed by a
/// parenthesized parameter type list.
pub fn is_valid_function_name(name: &str) -> bool {
    let (ident, rest) = match name.find('(') {
        Some(i) => (&name[..i], Some(&name[i..])),
        None => (name, None),
    };
    let ident_ok = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    match rest {
        None => ident_ok,
        Some(rest) => {
            ident_ok
                && rest.ends_with(')')
                && rest
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "(),[]".contains(c))
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// ABI-encodes `values` as the tuple described by `params`.
pub fn encode_params(params: &[AbiParam], values: &[Literal]) -> Result<Vec<u8>, AbiError> {
    if params.len() != values.len() {
        return Err(AbiError::ArgumentCount {
            expected: params.len(),
            actual: values.len(),
        });
    }
    let types = parse_params(params)?;
    let types: Vec<&SolType> = types.iter().collect();
    let values: Vec<&Literal> = values.iter().collect();
    encode_sequence(&types, &values)
}

/// Selector followed by the encoded arguments.
pub fn encode_function_call(function: &AbiFunction, args: &[Literal]) -> Result<Bytes, AbiError> {
    let mut data = selector(function)?.to_vec();
    data.extend(encode_params(&function.inputs, args)?);
    Ok(data.into())
}

/// Creation bytecode followed by the encoded constructor arguments.
pub fn encode_deployment(
    artifact: &Artifact,
    bytecode: &[u8],
    args: &[Literal],
) -> Result<Bytes, AbiError> {
    let inputs = artifact
        .constructor()
        .map(|c| c.inputs.as_slice())
        .unwrap_or_default();
    let mut data = bytecode.to_vec();
    data.extend(encode_params(inputs, args)?);
    Ok(data.into())
}

fn encode_sequence(types: &[&SolType], values: &[&Literal]) -> Result<Vec<u8>, AbiError> {
    let head_len: usize = types.iter().map(|t| t.head_size()).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for (ty, value) in types.iter().zip(values) {
        if ty.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(encode_value(ty, value)?);
        } else {
            head.extend(encode_value(ty, value)?);
        }
    }
    head.extend(tail);
    Ok(head)
}

fn encode_value(ty: &SolType, value: &Literal) -> Result<Vec<u8>, AbiError> {
    let mismatch = || AbiError::TypeMismatch {
        expected: ty.canonical(),
        value: value.to_string(),
    };
    match ty {
        SolType::Address => {
            let address = value.as_address().ok_or_else(mismatch)?;
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address.as_slice());
            Ok(word.to_vec())
        }
        SolType::Bool => match value {
            Literal::Bool(b) => Ok(usize_word(*b as usize).to_vec()),
            _ => Err(mismatch()),
        },
        SolType::Uint(bits) => {
            let v = value.as_uint().ok_or_else(mismatch)?;
            if *bits < 256 && v.bit_len() > *bits {
                return Err(mismatch());
            }
            Ok(v.to_be_bytes::<32>().to_vec())
        }
        SolType::Int(bits) => {
            let v = coerce_int(value).ok_or_else(mismatch)?;
            if *bits < 256 {
                let sign = v.asr(bits - 1);
                if sign != I256::ZERO && sign != I256::MINUS_ONE {
                    return Err(mismatch());
                }
            }
            Ok(v.into_raw().to_be_bytes::<32>().to_vec())
        }
        SolType::FixedBytes(n) => {
            let bytes = coerce_bytes(value).ok_or_else(mismatch)?;
            if bytes.len() != *n {
                return Err(mismatch());
            }
            Ok(pad_right(&bytes))
        }
        SolType::Bytes => {
            let bytes = coerce_bytes(value).ok_or_else(mismatch)?;
            let mut out = usize_word(bytes.len()).to_vec();
            out.extend(pad_right(&bytes));
            Ok(out)
        }
        SolType::String => {
            let s = value.as_str().ok_or_else(mismatch)?;
            let mut out = usize_word(s.len()).to_vec();
            out.extend(pad_right(s.as_bytes()));
            Ok(out)
        }
        SolType::Array(inner) => {
            let Literal::Array(items) = value else {
                return Err(mismatch());
            };
            let types = vec![inner.as_ref(); items.len()];
            let values: Vec<&Literal> = items.iter().collect();
            let mut out = usize_word(items.len()).to_vec();
            out.extend(encode_sequence(&types, &values)?);
            Ok(out)
        }
        SolType::FixedArray(inner, n) => {
            let Literal::Array(items) = value else {
                return Err(mismatch());
            };
            if items.len() != *n {
                return Err(mismatch());
            }
            let types = vec![inner.as_ref(); *n];
            let values: Vec<&Literal> = items.iter().collect();
            encode_sequence(&types, &values)
        }
        SolType::Tuple(fields) => {
            let values: Vec<&Literal> = match value {
                Literal::Array(items) if items.len() == fields.len() => items.iter().collect(),
                Literal::Struct(map) if map.len() == fields.len() => fields
                    .iter()
                    .map(|(name, _)| map.get(name).ok_or_else(mismatch))
                    .collect::<Result<_, _>>()?,
                _ => return Err(mismatch()),
            };
            let types: Vec<&SolType> = fields.iter().map(|(_, t)| t).collect();
            encode_sequence(&types, &values)
        }
    }
}

fn coerce_int(value: &Literal) -> Option<I256> {
    match value {
        Literal::Int(v) => Some(*v),
        Literal::Uint(v) => I256::try_from(*v).ok(),
        Literal::String(s) => I256::from_dec_str(s).ok(),
        _ => None,
    }
}

fn coerce_bytes(value: &Literal) -> Option<Vec<u8>> {
    let s = value.as_str()?;
    if !s.starts_with("0x") {
        return None;
    }
    hex::decode(s).ok()
}

fn usize_word(value: usize) -> [u8; 32] {
    U256::from(value).to_be_bytes::<32>()
}

fn pad_right(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.resize(bytes.len().div_ceil(32) * 32, 0);
    out
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes ABI data laid out as the tuple described by `params`.
pub fn decode_params(params: &[AbiParam], data: &[u8]) -> Result<Vec<Literal>, AbiError> {
    let types = parse_params(params)?;
    let types: Vec<&SolType> = types.iter().collect();
    decode_sequence(&types, data)
}

/// Decodes the return data of a function call.
pub fn decode_function_result(
    function: &AbiFunction,
    data: &[u8],
) -> Result<Vec<Literal>, AbiError> {
    decode_params(&function.outputs, data)
}

/// Picks one value out of decoded outputs by position or parameter name.
pub fn select_value(
    params: &[AbiParam],
    values: Vec<Literal>,
    selector: &NameOrIndex,
) -> Result<Literal, AbiError> {
    let index = match selector {
        NameOrIndex::Index(i) => *i,
        NameOrIndex::Name(name) => params
            .iter()
            .position(|p| &p.name == name)
            .ok_or_else(|| AbiError::OutputNotFound(name.clone()))?,
    };
    values
        .into_iter()
        .nth(index)
        .ok_or_else(|| AbiError::OutputNotFound(selector.to_string()))
}

/// Decodes a log emitted by `event` into its arguments, in declaration order.
///
/// Indexed dynamic values are only available as their hash and are returned
/// as the raw topic.
pub fn decode_event(
    event: &AbiEvent,
    topics: &[alloy_primitives::B256],
    data: &[u8],
) -> Result<Vec<Literal>, AbiError> {
    let skip = if event.anonymous { 0 } else { 1 };
    let mut indexed_topics = topics.iter().skip(skip);

    let non_indexed: Vec<AbiParam> = event.inputs.iter().filter(|p| !p.indexed).cloned().collect();
    let mut unindexed_values = decode_params(&non_indexed, data)?.into_iter();

    let mut out = Vec::with_capacity(event.inputs.len());
    for param in &event.inputs {
        if param.indexed {
            let topic = indexed_topics
                .next()
                .ok_or_else(|| AbiError::Decode(format!("missing topic for {}", param.name)))?;
            let ty = SolType::parse(param)?;
            if ty.is_dynamic() || matches!(ty, SolType::Tuple(_) | SolType::FixedArray(..)) {
                out.push(Literal::String(hex::encode_prefixed(topic)));
            } else {
                out.push(decode_value(&ty, topic.as_slice())?);
            }
        } else {
            out.push(
                unindexed_values
                    .next()
                    .ok_or_else(|| AbiError::Decode("too few values in log data".to_string()))?,
            );
        }
    }
    Ok(out)
}

fn decode_sequence(types: &[&SolType], data: &[u8]) -> Result<Vec<Literal>, AbiError> {
    let mut pos = 0;
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, pos)?;
            let sub = data
                .get(offset..)
                .ok_or_else(|| AbiError::Decode(format!("offset {offset} out of bounds")))?;
            out.push(decode_value(ty, sub)?);
        } else {
            let sub = data
                .get(pos..)
                .ok_or_else(|| AbiError::Decode("data too short".to_string()))?;
            out.push(decode_value(ty, sub)?);
        }
        pos += ty.head_size();
    }
    Ok(out)
}

fn decode_value(ty: &SolType, data: &[u8]) -> Result<Literal, AbiError> {
    match ty {
        SolType::Address => {
            let word = read_word(data, 0)?;
            Ok(Address::from_slice(&word[12..]).into())
        }
        SolType::Bool => Ok(Literal::Bool(read_word(data, 0)?[31] != 0)),
        SolType::Uint(_) => Ok(Literal::Uint(U256::from_be_slice(read_word(data, 0)?))),
        SolType::Int(_) => Ok(Literal::Int(I256::from_raw(U256::from_be_slice(
            read_word(data, 0)?,
        )))),
        SolType::FixedBytes(n) => Ok(Literal::String(hex::encode_prefixed(
            &read_word(data, 0)?[..*n],
        ))),
        SolType::Bytes => Ok(Literal::String(hex::encode_prefixed(read_dynamic(data)?))),
        SolType::String => {
            let bytes = read_dynamic(data)?;
            String::from_utf8(bytes.to_vec())
                .map(Literal::String)
                .map_err(|_| AbiError::Decode("string is not valid UTF-8".to_string()))
        }
        SolType::Array(inner) => {
            let len = read_usize(data, 0)?;
            let types = vec![inner.as_ref(); len];
            decode_sequence(&types, &data[32..]).map(Literal::Array)
        }
        SolType::FixedArray(inner, n) => {
            let types = vec![inner.as_ref(); *n];
            decode_sequence(&types, data).map(Literal::Array)
        }
        SolType::Tuple(fields) => {
            let types: Vec<&SolType> = fields.iter().map(|(_, t)| t).collect();
            let values = decode_sequence(&types, data)?;
            if fields.iter().all(|(name, _)| !name.is_empty()) {
                Ok(Literal::Struct(
                    fields
                        .iter()
                        .map(|(name, _)| name.clone())
                        .zip(values)
                        .collect::<BTreeMap<_, _>>(),
                ))
            } else {
                Ok(Literal::Array(values))
            }
        }
    }
}

fn read_word(data: &[u8], pos: usize) -> Result<&[u8], AbiError> {
    data.get(pos..pos + 32)
        .ok_or_else(|| AbiError::Decode("data too short".to_string()))
}

fn read_usize(data: &[u8], pos: usize) -> Result<usize, AbiError> {
    let value = U256::from_be_slice(read_word(data, pos)?);
    usize::try_from(value)
        .ok()
        .filter(|v| *v <= data.len())
        .ok_or_else(|| AbiError::Decode(format!("length or offset {value} out of bounds")))
}

fn read_dynamic(data: &[u8]) -> Result<&[u8], AbiError> {
    let len = read_usize(data, 0)?;
    data.get(32..32 + len)
        .ok_or_else(|| AbiError::Decode("dynamic value out of bounds".to_string()))
}

// ============================================================================
// Revert reasons
// ============================================================================

/// Why a call or transaction reverted, decoded from its return data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RevertReason {
    Empty,
    Message { message: String },
    Panic { code: U256 },
    Custom { name: String, args: Vec<Literal> },
    Unrecognized { data: Bytes },
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertReason::Empty => f.write_str("reverted without a reason"),
            RevertReason::Message { message } => write!(f, "reverted with reason \"{message}\""),
            RevertReason::Panic { code } => {
                write!(f, "reverted with panic code {code:#x} ({})", panic_description(*code))
            }
            RevertReason::Custom { name, args } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "reverted with custom error {name}({})", args.join(", "))
            }
            RevertReason::Unrecognized { data } => {
                write!(f, "reverted with unrecognized return data {data}")
            }
        }
    }
}

fn panic_description(code: U256) -> &'static str {
    match u64::try_from(code).unwrap_or(u64::MAX) {
        0x00 => "generic compiler panic",
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum value",
        0x22 => "incorrectly encoded storage byte array",
        0x31 => "pop on an empty array",
        0x32 => "array index out of bounds",
        0x41 => "too much memory allocated",
        0x51 => "call to a zero-initialized function",
        _ => "unknown panic code",
    }
}

/// Decodes revert data, using the custom errors of `artifact` when given.
pub fn decode_revert(data: &[u8], artifact: Option<&Artifact>) -> RevertReason {
    if data.is_empty() {
        return RevertReason::Empty;
    }
    let unrecognized = || RevertReason::Unrecognized {
        data: Bytes::copy_from_slice(data),
    };
    if data.len() < 4 {
        return unrecognized();
    }
    let (sel, body) = data.split_at(4);

    if sel == ERROR_SELECTOR {
        return match decode_sequence(&[&SolType::String], body).as_deref() {
            Ok([Literal::String(message)]) => RevertReason::Message {
                message: message.clone(),
            },
            _ => unrecognized(),
        };
    }
    if sel == PANIC_SELECTOR {
        return match decode_sequence(&[&SolType::Uint(256)], body).as_deref() {
            Ok([Literal::Uint(code)]) => RevertReason::Panic { code: *code },
            _ => unrecognized(),
        };
    }
    let Some(artifact) = artifact else {
        return unrecognized();
    };
    for error in artifact.errors() {
        let Ok(sig) = signature(&error.name, &error.inputs) else {
            continue;
        };
        if keccak256(sig.as_bytes())[..4] != *sel {
            continue;
        }
        if let Ok(args) = decode_params(&error.inputs, body) {
            return RevertReason::Custom {
                name: error.name.clone(),
                args,
            };
        }
    }
    unrecognized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignition_graph::AbiItem;

    fn function(name: &str, inputs: &[(&str, &str)], outputs: &[(&str, &str)]) -> AbiFunction {
        AbiFunction {
            name: name.to_string(),
            inputs: inputs.iter().map(|(n, t)| AbiParam::new(*n, *t)).collect(),
            outputs: outputs.iter().map(|(n, t)| AbiParam::new(*n, *t)).collect(),
            state_mutability: "nonpayable".to_string(),
        }
    }

    fn artifact(abi: Vec<AbiItem>) -> Artifact {
        Artifact {
            contract_name: "Test".to_string(),
            source_name: String::new(),
            abi,
            bytecode: "0x".to_string(),
            link_references: Default::default(),
        }
    }

    #[test]
    fn test_known_selectors() {
        let transfer = function("transfer", &[("to", "address"), ("amount", "uint256")], &[]);
        assert_eq!(selector(&transfer).unwrap(), [0xa9, 0x05, 0x9c, 0xbb]);
        let balance_of = function("balanceOf", &[("who", "address")], &[]);
        assert_eq!(selector(&balance_of).unwrap(), [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn test_encode_static_arguments() {
        let transfer = function("transfer", &[("to", "address"), ("amount", "uint256")], &[]);
        let data = encode_function_call(
            &transfer,
            &[
                Literal::from("0x00000000000000000000000000000000000000ff"),
                Literal::from(1u64),
            ],
        )
        .unwrap();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(data[4 + 31], 0xff);
        assert_eq!(data[4 + 63], 1);
    }

    #[test]
    fn test_encode_dynamic_string_layout() {
        let data = encode_params(&[AbiParam::new("", "string")], &[Literal::from("hi")]).unwrap();
        assert_eq!(data.len(), 96);
        assert_eq!(data[31], 0x20);
        assert_eq!(data[63], 2);
        assert_eq!(&data[64..66], b"hi");
    }

    #[test]
    fn test_uint_overflow_is_rejected() {
        let err = encode_params(&[AbiParam::new("", "uint8")], &[Literal::from(256u64)]).unwrap_err();
        assert!(matches!(err, AbiError::TypeMismatch { .. }));
        let err = encode_params(&[AbiParam::new("", "int8")], &[Literal::Int(I256::try_from(-129i64).unwrap())])
            .unwrap_err();
        assert!(matches!(err, AbiError::TypeMismatch { .. }));
    }

    #[test]
    fn test_decode_mixed_outputs() {
        let params = vec![AbiParam::new("owner", "address"), AbiParam::new("label", "string")];
        let values = vec![
            Literal::from("0x000000000000000000000000000000000000dEaD"),
            Literal::from("vault"),
        ];
        let encoded = encode_params(&params, &values).unwrap();
        let decoded = decode_params(&params, &encoded).unwrap();
        assert!(decoded[0].loosely_equals(&values[0]));
        assert_eq!(
            select_value(&params, decoded, &NameOrIndex::Name("label".to_string())).unwrap(),
            Literal::from("vault")
        );
    }

    #[test]
    fn test_find_function_by_name_and_signature() {
        let art = artifact(vec![
            AbiItem::Function(function("set", &[("v", "uint256")], &[])),
            AbiItem::Function(function("set", &[("v", "string")], &[])),
            AbiItem::Function(function("get", &[], &[("", "uint256")])),
        ]);
        assert!(find_function(&art, "get").is_ok());
        assert!(matches!(
            find_function(&art, "set"),
            Err(AbiError::AmbiguousFunction { .. })
        ));
        assert_eq!(find_function(&art, "set(string)").unwrap().inputs[0].ty, "string");
        assert!(matches!(
            find_function(&art, "missing"),
            Err(AbiError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_function_name_syntax() {
        assert!(is_valid_function_name("transfer"));
        assert!(is_valid_function_name("transfer(address,uint256)"));
        assert!(!is_valid_function_name("1transfer"));
        assert!(!is_valid_function_name("trans fer"));
        assert!(!is_valid_function_name("transfer(address"));
    }

    #[test]
    fn test_transfer_event_topic_and_decoding() {
        let event = AbiEvent {
            name: "Transfer".to_string(),
            inputs: vec![
                AbiParam::new("from", "address").indexed(),
                AbiParam::new("to", "address").indexed(),
                AbiParam::new("value", "uint256"),
            ],
            anonymous: false,
        };
        let topic = event_topic(&event).unwrap();
        assert_eq!(
            hex::encode(topic),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );

        let mut to = [0u8; 32];
        to[31] = 0x02;
        let topics = vec![topic, alloy_primitives::B256::ZERO, alloy_primitives::B256::from(to)];
        let data = U256::from(500u64).to_be_bytes::<32>();
        let values = decode_event(&event, &topics, &data).unwrap();
        assert_eq!(values[2], Literal::from(500u64));
        assert_eq!(values[1].as_address().unwrap(), Address::with_last_byte(2));
    }

    #[test]
    fn test_decode_revert_reasons() {
        let mut error_data = ERROR_SELECTOR.to_vec();
        error_data.extend(encode_params(&[AbiParam::new("", "string")], &[Literal::from("Not owner")]).unwrap());
        assert_eq!(
            decode_revert(&error_data, None),
            RevertReason::Message {
                message: "Not owner".to_string()
            }
        );

        let mut panic_data = PANIC_SELECTOR.to_vec();
        panic_data.extend(U256::from(0x11).to_be_bytes::<32>());
        let reason = decode_revert(&panic_data, None);
        assert_eq!(reason, RevertReason::Panic { code: U256::from(0x11) });
        assert!(reason.to_string().contains("overflow"));

        assert_eq!(decode_revert(&[], None), RevertReason::Empty);
    }

    #[test]
    fn test_decode_custom_error() {
        let art = artifact(vec![AbiItem::Error(ignition_graph::artifact::AbiError {
            name: "Insufficient".to_string(),
            inputs: vec![AbiParam::new("needed", "uint256")],
        })]);
        let mut data = keccak256("Insufficient(uint256)".as_bytes())[..4].to_vec();
        data.extend(U256::from(7u64).to_be_bytes::<32>());
        assert_eq!(
            decode_revert(&data, Some(&art)),
            RevertReason::Custom {
                name: "Insufficient".to_string(),
                args: vec![Literal::from(7u64)],
            }
        );
    }
}
