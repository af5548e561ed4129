//! Deployment strategies.
//!
//! A strategy decides how a deployment reaches the chain and how its address
//! is read back. Calls and sends do not depend on the strategy.

use crate::abi;
use crate::config::StrategyConfig;
use crate::provider::TransactionReceipt;
use crate::state::FailureReason;
use alloy_primitives::{hex, keccak256, Address, Bytes};
use ignition_graph::{AbiFunction, AbiParam, Literal};

/// Where and what to send for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub to: Option<Address>,
    pub data: Bytes,
}

pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wraps contract init code (creation bytecode plus encoded constructor
    /// arguments) into the transaction that deploys it.
    fn deployment_request(&self, init_code: Bytes) -> Result<DeploymentRequest, abi::AbiError>;

    /// Reads the address of the deployed contract from a successful receipt.
    fn deployed_address(&self, receipt: &TransactionReceipt) -> Result<Address, FailureReason>;
}

/// Builds the strategy a run was configured with.
pub fn strategy_for(config: &StrategyConfig) -> Box<dyn ExecutionStrategy> {
    match config {
        StrategyConfig::Basic => Box::new(BasicStrategy),
        StrategyConfig::Create2 { salt, factory } => Box::new(Create2Strategy {
            salt: *salt,
            factory: *factory,
        }),
    }
}

/// Plain contract-creation transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicStrategy;

impl ExecutionStrategy for BasicStrategy {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn deployment_request(&self, init_code: Bytes) -> Result<DeploymentRequest, abi::AbiError> {
        Ok(DeploymentRequest {
            to: None,
            data: init_code,
        })
    }

    fn deployed_address(&self, receipt: &TransactionReceipt) -> Result<Address, FailureReason> {
        receipt
            .contract_address
            .ok_or(FailureReason::MissingContractAddress {
                hash: receipt.transaction_hash,
            })
    }
}

/// Deploys through a factory's `deployCreate2(bytes32,bytes)`, which makes
/// the address depend only on the salt and the init code.
#[derive(Debug, Clone, Copy)]
pub struct Create2Strategy {
    pub salt: alloy_primitives::B256,
    pub factory: Address,
}

impl Create2Strategy {
    fn deploy_function() -> AbiFunction {
        AbiFunction {
            name: "deployCreate2".to_string(),
            inputs: vec![
                AbiParam::new("salt", "bytes32"),
                AbiParam::new("initCode", "bytes"),
            ],
            outputs: vec![AbiParam::new("newContract", "address")],
            state_mutability: "payable".to_string(),
        }
    }

    /// Topic 0 of `ContractCreation(address indexed newContract, bytes32 indexed salt)`.
    fn creation_topic() -> alloy_primitives::B256 {
        keccak256("ContractCreation(address,bytes32)")
    }
}

impl ExecutionStrategy for Create2Strategy {
    fn name(&self) -> &'static str {
        "create2"
    }

    fn deployment_request(&self, init_code: Bytes) -> Result<DeploymentRequest, abi::AbiError> {
        let data = abi::encode_function_call(
            &Self::deploy_function(),
            &[
                Literal::String(hex::encode_prefixed(self.salt)),
                Literal::String(hex::encode_prefixed(&init_code)),
            ],
        )?;
        Ok(DeploymentRequest {
            to: Some(self.factory),
            data,
        })
    }

    fn deployed_address(&self, receipt: &TransactionReceipt) -> Result<Address, FailureReason> {
        let topic = Self::creation_topic();
        receipt
            .logs
            .iter()
            .filter(|log| log.address == self.factory)
            .find(|log| log.topics.first() == Some(&topic))
            .and_then(|log| log.topics.get(1))
            .map(|word| Address::from_word(*word))
            .ok_or(FailureReason::MissingContractAddress {
                hash: receipt.transaction_hash,
            })
    }
}
