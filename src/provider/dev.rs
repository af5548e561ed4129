//! In-process development network.
//!
//! An automining chain backed by revm: every accepted transaction is executed
//! and committed immediately in its own block. Accounts are derived
//! deterministically from seeds and prefunded, and `eth_sendTransaction` is
//! accepted for any of them without signatures.

use super::types::{quantity, Log, Transaction, TransactionReceipt, TransactionRequest};
use super::{Provider, ProviderError, EXECUTION_REVERTED};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use k256::ecdsa::{SigningKey, VerifyingKey};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use revm::{
    context::TxEnv,
    database::{CacheDB, EmptyDB},
    primitives::TxKind,
    state::AccountInfo,
    Context, Database, ExecuteCommitEvm, MainBuilder, MainContext,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

const CHAIN_ID: u64 = 31337;
const TX_GAS_LIMIT: u64 = 10_000_000;
const GAS_PRICE: u64 = 1;

/// A development account, identified by the address of its key.
#[derive(Debug, Clone, Copy)]
pub struct DevAccount {
    pub address: Address,
}

impl DevAccount {
    pub fn from_signing_key(signing_key: &SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(signing_key);
        Self {
            address: public_key_to_address(&verifying_key),
        }
    }

    /// Derives a deterministic account from a seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        loop {
            let mut key_bytes = [0u8; 32];
            rng.fill(&mut key_bytes);
            if let Ok(signing_key) = SigningKey::from_bytes(&key_bytes.into()) {
                return Self::from_signing_key(&signing_key);
            }
        }
    }
}

fn public_key_to_address(verifying_key: &VerifyingKey) -> Address {
    let public_key_bytes = verifying_key.to_encoded_point(false);
    // Skip the 0x04 prefix byte, hash the rest.
    let hash = keccak256(&public_key_bytes.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

struct DevBlock {
    number: u64,
    hash: B256,
    transactions: Vec<B256>,
}

struct DevChain {
    db: CacheDB<EmptyDB>,
    blocks: Vec<DevBlock>,
    transactions: HashMap<B256, Transaction>,
    receipts: HashMap<B256, TransactionReceipt>,
}

/// Outcome of executing a request against the chain state.
struct Execution {
    success: bool,
    output: Bytes,
    gas_used: u64,
    logs: Vec<Log>,
}

pub struct DevNetwork {
    accounts: Vec<DevAccount>,
    chain: Mutex<DevChain>,
}

impl std::fmt::Debug for DevNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevNetwork")
            .field("accounts", &self.accounts.len())
            .finish_non_exhaustive()
    }
}

impl DevNetwork {
    /// Creates a network with `num_accounts` funded accounts.
    pub fn new(num_accounts: usize, seed: u64) -> Self {
        let accounts: Vec<DevAccount> = (0..num_accounts)
            .map(|i| DevAccount::from_seed(seed.wrapping_add(i as u64)))
            .collect();

        let mut db = CacheDB::new(EmptyDB::default());
        let initial_balance = U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64));
        for account in &accounts {
            db.insert_account_info(
                account.address,
                AccountInfo {
                    balance: initial_balance,
                    ..Default::default()
                },
            );
        }

        let genesis = DevBlock {
            number: 0,
            hash: block_hash(0),
            transactions: Vec::new(),
        };
        Self {
            accounts,
            chain: Mutex::new(DevChain {
                db,
                blocks: vec![genesis],
                transactions: HashMap::new(),
                receipts: HashMap::new(),
            }),
        }
    }

    pub fn accounts(&self) -> &[DevAccount] {
        &self.accounts
    }

    fn dispatch(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        match method {
            "eth_chainId" => Ok(json!(format!("{CHAIN_ID:#x}"))),
            "eth_accounts" => Ok(json!(self
                .accounts
                .iter()
                .map(|a| a.address)
                .collect::<Vec<_>>())),
            "eth_blockNumber" => {
                let chain = self.chain.lock();
                Ok(json!(format!("{:#x}", chain.head())))
            }
            "eth_gasPrice" => Ok(json!(format!("{GAS_PRICE:#x}"))),
            "hardhat_getAutomine" => Ok(json!(true)),
            "eth_getTransactionCount" => {
                let address: Address = param(method, params, 0)?;
                let mut chain = self.chain.lock();
                Ok(json!(format!("{:#x}", chain.nonce(address))))
            }
            "eth_getBlockByNumber" => {
                let tag: String = param(method, params, 0)?;
                let full: bool = param(method, params, 1).unwrap_or(false);
                let chain = self.chain.lock();
                let number = match tag.as_str() {
                    "latest" | "pending" => chain.head(),
                    "earliest" => 0,
                    other => quantity::parse(other).map_err(|message| {
                        ProviderError::InvalidResponse {
                            method: method.to_string(),
                            message,
                        }
                    })?,
                };
                Ok(chain.block_json(number, full))
            }
            "eth_getTransactionByHash" => {
                let hash: B256 = param(method, params, 0)?;
                let chain = self.chain.lock();
                Ok(json!(chain.transactions.get(&hash)))
            }
            "eth_getTransactionReceipt" => {
                let hash: B256 = param(method, params, 0)?;
                let chain = self.chain.lock();
                Ok(json!(chain.receipts.get(&hash)))
            }
            "eth_call" => {
                let request: TransactionRequest = param(method, params, 0)?;
                let execution = self.chain.lock().simulate(&request)?;
                if execution.success {
                    Ok(json!(execution.output))
                } else {
                    Err(revert_error(execution.output))
                }
            }
            "eth_estimateGas" => {
                let request: TransactionRequest = param(method, params, 0)?;
                let execution = self.chain.lock().simulate(&request)?;
                if !execution.success {
                    return Err(revert_error(execution.output));
                }
                // Refunds are applied after execution, so pad the measured usage.
                let padded = (execution.gas_used + execution.gas_used / 4).min(TX_GAS_LIMIT);
                Ok(json!(format!("{padded:#x}")))
            }
            "eth_sendTransaction" => {
                let request: TransactionRequest = param(method, params, 0)?;
                if !self.accounts.iter().any(|a| a.address == request.from) {
                    return Err(rpc_error(format!("unknown account {}", request.from)));
                }
                let hash = self.chain.lock().send(request)?;
                Ok(json!(hash))
            }
            _ => Err(ProviderError::UnsupportedMethod(method.to_string())),
        }
    }
}

#[async_trait]
impl Provider for DevNetwork {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.dispatch(method, &params)
    }
}

impl DevChain {
    fn head(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    fn nonce(&mut self, address: Address) -> u64 {
        self.db
            .basic(address)
            .ok()
            .flatten()
            .map(|info| info.nonce)
            .unwrap_or_default()
    }

    fn tx_env(&self, request: &TransactionRequest, nonce: u64) -> TxEnv {
        let gas_price = request
            .gas_price
            .or(request.max_fee_per_gas)
            .unwrap_or(U256::from(GAS_PRICE));
        TxEnv {
            caller: request.from,
            kind: match request.to {
                Some(to) => TxKind::Call(to),
                None => TxKind::Create,
            },
            value: request.value,
            data: request.data.clone(),
            gas_limit: request.gas.unwrap_or(TX_GAS_LIMIT),
            gas_price: u128::try_from(gas_price).unwrap_or(u128::MAX),
            nonce,
            // Unsigned dev transactions carry no replay protection.
            chain_id: None,
            ..Default::default()
        }
    }

    /// Executes `tx` and commits its effects to `db`.
    fn execute(db: CacheDB<EmptyDB>, tx: TxEnv) -> (CacheDB<EmptyDB>, Result<Execution, ProviderError>) {
        let mut evm = Context::mainnet().with_db(db).build_mainnet();
        let outcome = evm
            .transact_commit(tx)
            .map(|result| Execution {
                success: result.is_success(),
                output: result.output().cloned().unwrap_or_default(),
                gas_used: result.gas_used(),
                logs: result
                    .logs()
                    .iter()
                    .map(|log| Log {
                        address: log.address,
                        topics: log.topics().to_vec(),
                        data: log.data.data.clone(),
                        log_index: None,
                    })
                    .collect(),
            })
            .map_err(|err| rpc_error(err.to_string()));
        (evm.ctx.journaled_state.database, outcome)
    }

    /// Runs a request against a scratch copy of the state.
    fn simulate(&mut self, request: &TransactionRequest) -> Result<Execution, ProviderError> {
        let nonce = self.nonce(request.from);
        let tx = self.tx_env(request, nonce);
        let (_, outcome) = Self::execute(self.db.clone(), tx);
        outcome
    }

    fn send(&mut self, request: TransactionRequest) -> Result<B256, ProviderError> {
        let current = self.nonce(request.from);
        let nonce = request.nonce.unwrap_or(current);
        if nonce < current {
            return Err(rpc_error(format!(
                "nonce too low: expected {current}, got {nonce}"
            )));
        }
        if nonce > current {
            return Err(rpc_error(format!(
                "nonce too high: expected {current}, got {nonce}"
            )));
        }

        let tx = self.tx_env(&request, nonce);
        let hash = transaction_hash(&request, nonce);
        let db = std::mem::replace(&mut self.db, CacheDB::new(EmptyDB::default()));
        let (db, outcome) = Self::execute(db, tx);
        self.db = db;
        let execution = outcome?;

        let number = self.blocks.len() as u64;
        let block = block_hash(number);
        let contract_address = match request.to {
            None if execution.success => Some(request.from.create(nonce)),
            _ => None,
        };
        let logs = execution
            .logs
            .into_iter()
            .enumerate()
            .map(|(i, log)| Log {
                log_index: Some(i as u64),
                ..log
            })
            .collect();

        debug!(%hash, block = number, success = execution.success, "mined transaction");
        self.transactions.insert(
            hash,
            Transaction {
                hash,
                from: request.from,
                to: request.to,
                nonce,
                input: request.data.clone(),
                value: request.value,
                block_number: Some(number),
            },
        );
        self.receipts.insert(
            hash,
            TransactionReceipt {
                transaction_hash: hash,
                block_hash: block,
                block_number: number,
                status: execution.success as u64,
                contract_address,
                logs,
            },
        );
        self.blocks.push(DevBlock {
            number,
            hash: block,
            transactions: vec![hash],
        });
        Ok(hash)
    }

    fn block_json(&self, number: u64, full: bool) -> Value {
        let Some(block) = self.blocks.get(number as usize) else {
            return Value::Null;
        };
        let transactions: Vec<Value> = block
            .transactions
            .iter()
            .map(|hash| {
                if full {
                    json!(self.transactions.get(hash))
                } else {
                    json!(hash)
                }
            })
            .collect();
        json!({
            "number": format!("{:#x}", block.number),
            "hash": block.hash,
            "transactions": transactions,
        })
    }
}

fn param<T: DeserializeOwned>(method: &str, params: &Value, index: usize) -> Result<T, ProviderError> {
    let value = params.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|err| ProviderError::Rpc {
        code: -32602,
        message: format!("invalid params for {method}: {err}"),
        data: None,
    })
}

fn rpc_error(message: String) -> ProviderError {
    ProviderError::Rpc {
        code: -32000,
        message,
        data: None,
    }
}

fn revert_error(output: Bytes) -> ProviderError {
    ProviderError::Rpc {
        code: EXECUTION_REVERTED,
        message: "execution reverted".to_string(),
        data: Some(json!(output)),
    }
}

fn block_hash(number: u64) -> B256 {
    keccak256(number.to_be_bytes())
}

/// Computes a transaction hash over the fields that identify it.
fn transaction_hash(request: &TransactionRequest, nonce: u64) -> B256 {
    let mut data = Vec::with_capacity(20 + 20 + 32 + 8 + 8 + request.data.len());
    data.extend_from_slice(request.from.as_slice());
    data.extend_from_slice(request.to.unwrap_or_default().as_slice());
    data.extend_from_slice(&request.value.to_be_bytes::<32>());
    data.extend_from_slice(&nonce.to_be_bytes());
    data.extend_from_slice(&CHAIN_ID.to_be_bytes());
    data.extend_from_slice(&request.data);
    keccak256(&data)
}
