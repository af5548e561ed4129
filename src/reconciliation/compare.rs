//! Field-by-field comparison of recorded and current inputs.
//!
//! Every check returns the first difference as a human-readable message.

use crate::state::ExecutionInputs;
use alloy_primitives::{Address, U256};
use ignition_graph::Literal;
use std::fmt::Display;

type Drift = Result<(), String>;

pub(super) fn inputs(
    recorded: &ExecutionInputs,
    current: &ExecutionInputs,
    sender_declared: bool,
    accounts: &[Address],
) -> Drift {
    use ExecutionInputs as I;

    match (recorded, current) {
        (
            I::Deployment {
                contract_name: name_a,
                constructor_args: args_a,
                libraries: libs_a,
                value: value_a,
                from: from_a,
            },
            I::Deployment {
                contract_name: name_b,
                constructor_args: args_b,
                libraries: libs_b,
                value: value_b,
                from: from_b,
            },
        ) => {
            field("contract name", name_a, name_b)?;
            arguments("constructor", args_a, args_b)?;
            if libs_a != libs_b {
                return Err(format!(
                    "libraries changed from {libs_a:?} to {libs_b:?}"
                ));
            }
            value(value_a, value_b)?;
            sender(from_a, from_b, sender_declared, accounts)
        }
        (
            I::Call {
                contract_address: to_a,
                function_name: fn_a,
                args: args_a,
                value: value_a,
                from: from_a,
            },
            I::Call {
                contract_address: to_b,
                function_name: fn_b,
                args: args_b,
                value: value_b,
                from: from_b,
            },
        ) => {
            field("contract address", to_a, to_b)?;
            field("function name", fn_a, fn_b)?;
            arguments("function", args_a, args_b)?;
            value(value_a, value_b)?;
            sender(from_a, from_b, sender_declared, accounts)
        }
        (
            I::StaticCall {
                contract_address: to_a,
                function_name: fn_a,
                args: args_a,
                name_or_index: out_a,
                from: from_a,
            },
            I::StaticCall {
                contract_address: to_b,
                function_name: fn_b,
                args: args_b,
                name_or_index: out_b,
                from: from_b,
            },
        ) => {
            field("contract address", to_a, to_b)?;
            field("function name", fn_a, fn_b)?;
            arguments("function", args_a, args_b)?;
            field("selected output", out_a, out_b)?;
            sender(from_a, from_b, sender_declared, accounts)
        }
        (
            I::SendData {
                to: to_a,
                data: data_a,
                value: value_a,
                from: from_a,
            },
            I::SendData {
                to: to_b,
                data: data_b,
                value: value_b,
                from: from_b,
            },
        ) => {
            field("recipient", to_a, to_b)?;
            field("data", data_a, data_b)?;
            value(value_a, value_b)?;
            sender(from_a, from_b, sender_declared, accounts)
        }
        (
            I::EncodeFunctionCall {
                function_name: fn_a,
                args: args_a,
            },
            I::EncodeFunctionCall {
                function_name: fn_b,
                args: args_b,
            },
        ) => {
            field("function name", fn_a, fn_b)?;
            arguments("function", args_a, args_b)
        }
        (
            I::ContractAt {
                contract_name: name_a,
                address: address_a,
            },
            I::ContractAt {
                contract_name: name_b,
                address: address_b,
            },
        ) => {
            field("contract name", name_a, name_b)?;
            if !address_a.eq_ignore_ascii_case(address_b) {
                return Err(format!("address changed from {address_a} to {address_b}"));
            }
            Ok(())
        }
        (
            I::ReadEventArgument {
                emitter_address: emitter_a,
                transaction_hash: hash_a,
                event_name: event_a,
                event_index: index_a,
                name_or_index: arg_a,
            },
            I::ReadEventArgument {
                emitter_address: emitter_b,
                transaction_hash: hash_b,
                event_name: event_b,
                event_index: index_b,
                name_or_index: arg_b,
            },
        ) => {
            field("emitter address", emitter_a, emitter_b)?;
            field("transaction hash", hash_a, hash_b)?;
            field("event name", event_a, event_b)?;
            field("event index", index_a, index_b)?;
            field("argument", arg_a, arg_b)
        }
        _ => Err("the kind of recorded inputs no longer matches the future".to_string()),
    }
}

fn field<T: PartialEq + Display>(what: &str, recorded: &T, current: &T) -> Drift {
    if recorded == current {
        Ok(())
    } else {
        Err(format!("{what} changed from {recorded} to {current}"))
    }
}

fn value(recorded: &U256, current: &U256) -> Drift {
    field("value", recorded, current)
}

fn arguments(what: &str, recorded: &[Literal], current: &[Literal]) -> Drift {
    if recorded.len() != current.len() {
        return Err(format!(
            "{what} argument count changed from {} to {}",
            recorded.len(),
            current.len()
        ));
    }
    for (i, (a, b)) in recorded.iter().zip(current).enumerate() {
        if !a.loosely_equals(b) {
            return Err(format!("{what} argument {i} changed from {a} to {b}"));
        }
    }
    Ok(())
}

/// A declared sender must be the one recorded. Without a declaration the
/// default sender may differ between runs, as long as the recorded one is
/// still one of the accounts.
fn sender(recorded: &Address, current: &Address, declared: bool, accounts: &[Address]) -> Drift {
    if declared {
        return field("from address", recorded, current);
    }
    if accounts.contains(recorded) {
        Ok(())
    } else {
        Err(format!(
            "from address {recorded} is no longer one of the available accounts"
        ))
    }
}
