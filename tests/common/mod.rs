//! Shared fixtures: a scripted JSON-RPC chain and a small contract.
#![allow(dead_code)]

use alloy_primitives::{hex, keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use ignition_engine::abi;
use ignition_engine::provider::{
    Block, FullBlock, Log, Provider, ProviderError, Transaction, TransactionReceipt,
    TransactionRequest, EXECUTION_REVERTED,
};
use ignition_graph::{
    AbiConstructor, AbiEvent, AbiFunction, AbiItem, AbiParam, Argument, Artifact, ArtifactSource,
    ContractCall, ContractDeployment, Future, Literal, NameOrIndex, ReadEventArgument,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const CHAIN_ID: u64 = 31337;
pub const GWEI: u64 = 1_000_000_000;

/// A chain whose mining, reverts, return values and logs are scripted by
/// the test.
///
/// Contracts have no code: calls succeed with empty output unless a revert,
/// a return value or logs were registered for their selector.
pub struct MockChain {
    inner: Mutex<Inner>,
}

struct Inner {
    accounts: Vec<Address>,
    automine: bool,
    base_fee: U256,
    priority_fee: U256,
    mined_nonces: HashMap<Address, u64>,
    mempool: Vec<B256>,
    transactions: HashMap<B256, Transaction>,
    requests: HashMap<B256, TransactionRequest>,
    receipts: HashMap<B256, TransactionReceipt>,
    blocks: Vec<Vec<B256>>,
    reverts: HashMap<[u8; 4], Bytes>,
    responses: HashMap<[u8; 4], Bytes>,
    events: HashMap<[u8; 4], Vec<(Vec<B256>, Bytes)>>,
    sent: Vec<TransactionRequest>,
    next_hash: u64,
}

impl MockChain {
    pub fn new(num_accounts: usize) -> Self {
        let accounts = (1..=num_accounts)
            .map(|i| Address::with_last_byte(i as u8))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                accounts,
                automine: true,
                base_fee: U256::from(GWEI),
                priority_fee: U256::from(GWEI),
                mined_nonces: HashMap::new(),
                mempool: Vec::new(),
                transactions: HashMap::new(),
                requests: HashMap::new(),
                receipts: HashMap::new(),
                blocks: vec![Vec::new()],
                reverts: HashMap::new(),
                responses: HashMap::new(),
                events: HashMap::new(),
                sent: Vec::new(),
                next_hash: 0,
            }),
        }
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.inner.lock().accounts.clone()
    }

    pub fn set_automine(&self, automine: bool) {
        self.inner.lock().automine = automine;
    }

    /// Every `eth_sendTransaction` request received, in order.
    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent.len()
    }

    pub fn block_number(&self) -> u64 {
        self.inner.lock().head()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().mempool.len()
    }

    /// Calls with `selector` revert with `Error(message)`.
    pub fn revert_on(&self, selector: [u8; 4], message: &str) {
        let mut data = hex!("08c379a0").to_vec();
        data.extend(
            abi::encode_params(
                &[AbiParam::new("message", "string")],
                &[Literal::String(message.to_string())],
            )
            .unwrap(),
        );
        self.inner.lock().reverts.insert(selector, data.into());
    }

    pub fn clear_reverts(&self) {
        self.inner.lock().reverts.clear();
    }

    /// Calls with `selector` return `data`.
    pub fn respond(&self, selector: [u8; 4], data: Bytes) {
        self.inner.lock().responses.insert(selector, data);
    }

    /// Mined calls with `selector` emit a log from the called contract.
    pub fn emit_on(&self, selector: [u8; 4], topics: Vec<B256>, data: Bytes) {
        self.inner
            .lock()
            .events
            .entry(selector)
            .or_default()
            .push((topics, data));
    }

    /// Mines every pending transaction that is next in its sender's sequence
    /// into one block.
    pub fn mine(&self) -> u64 {
        self.inner.lock().mine()
    }

    /// Forgets every pending transaction, as a node evicting its mempool.
    pub fn drop_pending(&self) {
        let mut inner = self.inner.lock();
        for hash in std::mem::take(&mut inner.mempool) {
            inner.transactions.remove(&hash);
            inner.requests.remove(&hash);
        }
    }

    /// Sends and mines a transaction that did not come from the engine.
    /// Pending engine transactions with the same nonce are replaced.
    pub fn send_external(&self, request: TransactionRequest) -> B256 {
        let mut inner = self.inner.lock();
        let hash = inner.submit(request).unwrap();
        inner.mine();
        hash
    }
}

impl Inner {
    fn head(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    fn mined_nonce(&self, address: Address) -> u64 {
        self.mined_nonces.get(&address).copied().unwrap_or_default()
    }

    fn pending_nonce(&self, address: Address) -> u64 {
        self.mempool
            .iter()
            .filter_map(|hash| self.transactions.get(hash))
            .filter(|tx| tx.from == address)
            .map(|tx| tx.nonce + 1)
            .max()
            .unwrap_or_default()
            .max(self.mined_nonce(address))
    }

    fn revert_data(&self, data: &[u8]) -> Option<Bytes> {
        selector(data).and_then(|sel| self.reverts.get(&sel).cloned())
    }

    fn submit(&mut self, request: TransactionRequest) -> Result<B256, ProviderError> {
        let nonce = request
            .nonce
            .unwrap_or_else(|| self.pending_nonce(request.from));
        if nonce < self.mined_nonce(request.from) {
            return Err(rpc_error(-32000, "nonce too low"));
        }
        if let Some(pos) = self.mempool.iter().position(|hash| {
            self.transactions
                .get(hash)
                .is_some_and(|tx| tx.from == request.from && tx.nonce == nonce)
        }) {
            let replaced = self.mempool.remove(pos);
            self.transactions.remove(&replaced);
            self.requests.remove(&replaced);
        }

        self.next_hash += 1;
        let hash = keccak256(self.next_hash.to_be_bytes());
        self.transactions.insert(
            hash,
            Transaction {
                hash,
                from: request.from,
                to: request.to,
                nonce,
                input: request.data.clone(),
                value: request.value,
                block_number: None,
            },
        );
        self.requests.insert(hash, request);
        self.mempool.push(hash);
        Ok(hash)
    }

    fn mine(&mut self) -> u64 {
        let number = self.blocks.len() as u64;
        let mut included = Vec::new();
        loop {
            let next = self.mempool.iter().position(|hash| {
                let tx = &self.transactions[hash];
                tx.nonce == self.mined_nonce(tx.from)
            });
            let Some(pos) = next else { break };
            let hash = self.mempool.remove(pos);
            let tx = self.transactions.get_mut(&hash).map(|tx| {
                tx.block_number = Some(number);
                tx.clone()
            });
            let Some(tx) = tx else { break };
            self.mined_nonces.insert(tx.from, tx.nonce + 1);

            let reverted = self.revert_data(&tx.input).is_some();
            let logs = match (tx.to, selector(&tx.input)) {
                (Some(to), Some(sel)) if !reverted => self
                    .events
                    .get(&sel)
                    .into_iter()
                    .flatten()
                    .map(|(topics, data)| Log {
                        address: to,
                        topics: topics.clone(),
                        data: data.clone(),
                        log_index: None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            self.receipts.insert(
                hash,
                TransactionReceipt {
                    transaction_hash: hash,
                    block_hash: block_hash(number),
                    block_number: number,
                    status: if reverted { 0 } else { 1 },
                    contract_address: match tx.to {
                        None if !reverted => Some(tx.from.create(tx.nonce)),
                        _ => None,
                    },
                    logs,
                },
            );
            included.push(hash);
        }
        self.blocks.push(included);
        number
    }
}

#[async_trait]
impl Provider for MockChain {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let mut inner = self.inner.lock();
        match method {
            "eth_chainId" => Ok(json!(format!("{CHAIN_ID:#x}"))),
            "eth_accounts" => Ok(json!(inner.accounts)),
            "eth_blockNumber" => Ok(json!(format!("{:#x}", inner.head()))),
            "eth_gasPrice" => Ok(json!(inner.base_fee)),
            "eth_maxPriorityFeePerGas" => Ok(json!(inner.priority_fee)),
            "hardhat_getAutomine" => Ok(json!(inner.automine)),
            "eth_getTransactionCount" => {
                let address: Address = param(&params, 0)?;
                let tag: String = param(&params, 1)?;
                let count = match tag.as_str() {
                    "pending" => inner.pending_nonce(address),
                    _ => inner.mined_nonce(address),
                };
                Ok(json!(format!("{count:#x}")))
            }
            "eth_getBlockByNumber" => {
                let tag: String = param(&params, 0)?;
                let full: bool = param(&params, 1)?;
                let number = match tag.as_str() {
                    "latest" | "pending" => inner.head(),
                    other => u64::from_str_radix(other.trim_start_matches("0x"), 16)
                        .map_err(|err| rpc_error(-32602, &err.to_string()))?,
                };
                let Some(hashes) = inner.blocks.get(number as usize) else {
                    return Ok(Value::Null);
                };
                if full {
                    Ok(json!(FullBlock {
                        number,
                        hash: block_hash(number),
                        transactions: hashes
                            .iter()
                            .filter_map(|hash| inner.transactions.get(hash).cloned())
                            .collect(),
                    }))
                } else {
                    Ok(json!(Block {
                        number,
                        hash: block_hash(number),
                        base_fee_per_gas: Some(inner.base_fee),
                    }))
                }
            }
            "eth_estimateGas" => {
                let request: TransactionRequest = param(&params, 0)?;
                match inner.revert_data(&request.data) {
                    Some(data) => Err(revert_error(&data)),
                    None => Ok(json!("0x186a0")),
                }
            }
            "eth_call" => {
                let request: TransactionRequest = param(&params, 0)?;
                if let Some(data) = inner.revert_data(&request.data) {
                    return Err(revert_error(&data));
                }
                let output = selector(&request.data)
                    .and_then(|sel| inner.responses.get(&sel).cloned())
                    .unwrap_or_default();
                Ok(json!(output))
            }
            "eth_sendTransaction" => {
                let request: TransactionRequest = param(&params, 0)?;
                inner.sent.push(request.clone());
                let hash = inner.submit(request)?;
                if inner.automine {
                    inner.mine();
                }
                Ok(json!(hash))
            }
            "eth_getTransactionByHash" => {
                let hash: B256 = param(&params, 0)?;
                Ok(json!(inner.transactions.get(&hash)))
            }
            "eth_getTransactionReceipt" => {
                let hash: B256 = param(&params, 0)?;
                Ok(json!(inner.receipts.get(&hash)))
            }
            _ => Err(ProviderError::UnsupportedMethod(method.to_string())),
        }
    }
}

fn param<T: serde::de::DeserializeOwned>(params: &Value, index: usize) -> Result<T, ProviderError> {
    serde_json::from_value(params.get(index).cloned().unwrap_or(Value::Null))
        .map_err(|err| rpc_error(-32602, &err.to_string()))
}

fn rpc_error(code: i64, message: &str) -> ProviderError {
    ProviderError::Rpc {
        code,
        message: message.to_string(),
        data: None,
    }
}

fn revert_error(data: &Bytes) -> ProviderError {
    ProviderError::Rpc {
        code: EXECUTION_REVERTED,
        message: "execution reverted".to_string(),
        data: Some(json!(data)),
    }
}

fn selector(data: &[u8]) -> Option<[u8; 4]> {
    data.get(..4).and_then(|s| s.try_into().ok())
}

fn block_hash(number: u64) -> B256 {
    keccak256(format!("block {number}"))
}

// ============================================================================
// Contract fixture
// ============================================================================

pub const MODULE: &str = "CounterModule";

/// `Counter(uint256 start)` with `increment(uint256)`, `count()` and
/// `Incremented(address indexed by, uint256 amount)`.
pub fn counter_artifact() -> Artifact {
    Artifact {
        contract_name: "Counter".to_string(),
        source_name: "contracts/Counter.sol".to_string(),
        abi: vec![
            AbiItem::Constructor(AbiConstructor {
                inputs: vec![AbiParam::new("start", "uint256")],
                state_mutability: "nonpayable".to_string(),
            }),
            AbiItem::Function(increment_function()),
            AbiItem::Function(AbiFunction {
                name: "count".to_string(),
                inputs: vec![],
                outputs: vec![AbiParam::new("", "uint256")],
                state_mutability: "view".to_string(),
            }),
            AbiItem::Event(incremented_event()),
        ],
        bytecode: "0x6080604052".to_string(),
        link_references: Default::default(),
    }
}

pub fn increment_function() -> AbiFunction {
    AbiFunction {
        name: "increment".to_string(),
        inputs: vec![AbiParam::new("amount", "uint256")],
        outputs: vec![],
        state_mutability: "nonpayable".to_string(),
    }
}

pub fn incremented_event() -> AbiEvent {
    AbiEvent {
        name: "Incremented".to_string(),
        inputs: vec![
            AbiParam::new("by", "address").indexed(),
            AbiParam::new("amount", "uint256"),
        ],
        anonymous: false,
    }
}

pub fn increment_selector() -> [u8; 4] {
    abi::selector(&increment_function()).unwrap()
}

/// Makes every mined `increment` call emit `Incremented(by, amount)`.
pub fn emit_incremented(chain: &MockChain, by: Address, amount: u64) {
    chain.emit_on(
        increment_selector(),
        vec![
            abi::event_topic(&incremented_event()).unwrap(),
            by.into_word(),
        ],
        U256::from(amount).to_be_bytes::<32>().to_vec().into(),
    );
}

pub fn id(name: &str) -> String {
    format!("{MODULE}#{name}")
}

pub fn deploy_counter(name: &str, start: u64) -> Future {
    Future::ContractDeployment(ContractDeployment {
        id: id(name),
        module_id: MODULE.to_string(),
        contract_name: "Counter".to_string(),
        artifact: ArtifactSource::Named,
        constructor_args: vec![Argument::literal(start)],
        libraries: Default::default(),
        value: None,
        from: None,
        dependencies: vec![],
    })
}

pub fn increment(name: &str, contract: &str, amount: u64) -> Future {
    Future::ContractCall(ContractCall {
        id: id(name),
        module_id: MODULE.to_string(),
        contract: id(contract),
        function_name: "increment".to_string(),
        args: vec![Argument::literal(amount)],
        value: None,
        from: None,
        dependencies: vec![],
    })
}

pub fn read_amount(name: &str, emitter: &str, call: &str) -> Future {
    Future::ReadEventArgument(ReadEventArgument {
        id: id(name),
        module_id: MODULE.to_string(),
        emitter: id(emitter),
        future_to_read_from: id(call),
        event_name: "Incremented".to_string(),
        name_or_index: NameOrIndex::Name("amount".to_string()),
        event_index: 0,
        dependencies: vec![],
    })
}
