//! Shared mocks for integration tests: an in-memory chain node, a connector
//! that hands out connections to it, and a signer that encodes calls as JSON.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::{SolCall, SolEvent, SolValue};
use async_trait::async_trait;

use crosschain_engine::blockchain::{
    BlockchainError, BlockchainResult, CallRequest, ChainRpc, ChainTransaction, PendingCall,
    RpcConnector, TransactionSigner, TxReceipt,
};
use crosschain_engine::bridge::contract::IBridge;
use crosschain_engine::bridge::{BridgeError, BridgeResult, LocalValidator, ValidatorSigner};
use crosschain_engine::config::{ChainConfig, ChainStatus, EngineConfig};
use crosschain_engine::lifecycle::{build_runtime_with, Runtime};

pub const GWEI: u128 = 1_000_000_000;

/// Anvil account #0; used as the validator key.
pub const VALIDATOR_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn user() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn recipient() -> Address {
    Address::repeat_byte(0xb2)
}

pub fn relayer() -> Address {
    Address::repeat_byte(0xc3)
}

pub fn bridge_address(chain_id: u64) -> Address {
    Address::with_last_byte(chain_id as u8)
}

#[derive(Default)]
struct ChainState {
    head: u64,
    gas_price: u128,
    base_fee: Option<u128>,
    priority_fee: u128,
    pending_counts: HashMap<Address, u64>,
    estimate: Option<u64>,
    reject_broadcast: Option<String>,
    time_out_after_accept: bool,
    auto_mine: Option<bool>,
    bridge_nonce: U256,
    sent: Vec<(TxHash, PendingCall)>,
    transactions: HashMap<TxHash, ChainTransaction>,
    receipts: HashMap<TxHash, TxReceipt>,
    receipt_error: Option<String>,
    logs: Vec<Log>,
    log_failures: u32,
    log_queries: Vec<(u64, u64)>,
}

/// In-memory node for one chain.
pub struct MockChain {
    pub chain_id: u64,
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            state: Mutex::new(ChainState {
                head: 1_000,
                gas_price: GWEI,
                base_fee: Some(30 * GWEI),
                priority_fee: 2 * GWEI,
                estimate: Some(100_000),
                ..Default::default()
            }),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_head(&self, head: u64) {
        self.with(|s| s.head = head);
    }

    pub fn set_gas_price(&self, wei: u128) {
        self.with(|s| s.gas_price = wei);
    }

    pub fn set_pending_count(&self, address: Address, count: u64) {
        self.with(|s| {
            s.pending_counts.insert(address, count);
        });
    }

    /// `None` makes estimation fail as if the call reverts.
    pub fn set_estimate(&self, gas: Option<u64>) {
        self.with(|s| s.estimate = gas);
    }

    pub fn reject_broadcasts(&self, reason: Option<&str>) {
        self.with(|s| s.reject_broadcast = reason.map(str::to_string));
    }

    /// Accept broadcasts but report a client-side timeout to the caller.
    pub fn time_out_broadcasts(&self, enabled: bool) {
        self.with(|s| s.time_out_after_accept = enabled);
    }

    /// Mine every broadcast immediately with the given success flag.
    pub fn auto_mine(&self, success: Option<bool>) {
        self.with(|s| s.auto_mine = success);
    }

    pub fn set_bridge_nonce(&self, nonce: u64) {
        self.with(|s| s.bridge_nonce = U256::from(nonce));
    }

    pub fn fail_receipts(&self, reason: Option<&str>) {
        self.with(|s| s.receipt_error = reason.map(str::to_string));
    }

    pub fn fail_next_log_queries(&self, count: u32) {
        self.with(|s| s.log_failures = count);
    }

    pub fn push_log(&self, log: Log) {
        self.with(|s| s.logs.push(log));
    }

    pub fn sent(&self) -> Vec<(TxHash, PendingCall)> {
        self.with(|s| s.sent.clone())
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.with(|s| s.log_queries.clone())
    }

    pub fn mine(&self, hash: TxHash, block: u64, success: bool) {
        self.with(|s| mine_locked(s, hash, block, success));
    }
}

fn mine_locked(state: &mut ChainState, hash: TxHash, block: u64, success: bool) {
    if let Some(tx) = state.transactions.get_mut(&hash) {
        tx.block_number = Some(block);
    }
    state.receipts.insert(
        hash,
        TxReceipt {
            tx_hash: hash,
            block_number: Some(block),
            success,
            gas_used: 21_000,
        },
    );
}

/// Connection to a [`MockChain`].
pub struct MockRpc {
    chain: Arc<MockChain>,
    url: String,
}

#[async_trait]
impl ChainRpc for MockRpc {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn chain_id(&self) -> BlockchainResult<u64> {
        Ok(self.chain.chain_id)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        Ok(self.chain.with(|s| s.head))
    }

    async fn pending_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        Ok(self
            .chain
            .with(|s| s.pending_counts.get(&address).copied().unwrap_or_default()))
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        Ok(self.chain.with(|s| s.gas_price))
    }

    async fn max_priority_fee(&self) -> BlockchainResult<u128> {
        Ok(self.chain.with(|s| s.priority_fee))
    }

    async fn latest_base_fee(&self) -> BlockchainResult<Option<u128>> {
        Ok(self.chain.with(|s| s.base_fee))
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> BlockchainResult<u64> {
        self.chain
            .with(|s| s.estimate)
            .ok_or_else(|| BlockchainError::Estimation("execution reverted".into()))
    }

    async fn call(&self, call: &CallRequest) -> BlockchainResult<Bytes> {
        if call.data.starts_with(&IBridge::nonceCall::SELECTOR) {
            let nonce = self.chain.with(|s| s.bridge_nonce);
            return Ok(Bytes::from(nonce.abi_encode()));
        }
        Ok(Bytes::new())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> BlockchainResult<TxHash> {
        let call: PendingCall = serde_json::from_slice(&raw)
            .map_err(|e| BlockchainError::Broadcast(format!("undecodable tx: {}", e)))?;
        if call.chain_id != self.chain.chain_id {
            return Err(BlockchainError::Broadcast("wrong chain id".into()));
        }
        let hash = keccak256(&raw);

        self.chain.with(|s| {
            if let Some(reason) = &s.reject_broadcast {
                return Err(BlockchainError::Broadcast(reason.clone()));
            }
            s.transactions.insert(
                hash,
                ChainTransaction {
                    hash,
                    from: call.from,
                    to: Some(call.to),
                    value: call.value,
                    data: call.data.clone(),
                    nonce: call.nonce,
                    fee_per_gas: call.fee_per_gas,
                    gas_limit: call.gas_limit,
                    block_number: None,
                },
            );
            s.sent.push((hash, call));
            if let Some(success) = s.auto_mine {
                let block = s.head;
                mine_locked(s, hash, block, success);
            }
            if s.time_out_after_accept {
                return Err(BlockchainError::Timeout(10));
            }
            Ok(hash)
        })
    }

    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> BlockchainResult<Option<ChainTransaction>> {
        Ok(self.chain.with(|s| s.transactions.get(&hash).cloned()))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        self.chain.with(|s| match &s.receipt_error {
            Some(reason) => Err(BlockchainError::Rpc(reason.clone())),
            None => Ok(s.receipts.get(&hash).cloned()),
        })
    }

    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> BlockchainResult<Vec<Log>> {
        self.chain.with(|s| {
            s.log_queries.push((from_block, to_block));
            if s.log_failures > 0 {
                s.log_failures -= 1;
                return Err(BlockchainError::Rpc("query timeout".into()));
            }
            Ok(s.logs
                .iter()
                .filter(|log| log.inner.address == address)
                .filter(|log| {
                    log.block_number
                        .is_some_and(|b| b >= from_block && b <= to_block)
                })
                .cloned()
                .collect())
        })
    }
}

/// Hands out [`MockRpc`] connections and counts connection attempts.
#[derive(Default)]
pub struct MockConnector {
    chains: Mutex<HashMap<u64, Arc<MockChain>>>,
    failing_urls: Mutex<HashSet<String>>,
    pub attempts: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockConnector {
    pub fn new(chains: &[Arc<MockChain>]) -> Arc<Self> {
        let connector = Self::default();
        {
            let mut map = connector.chains.lock().unwrap();
            for chain in chains {
                map.insert(chain.chain_id, chain.clone());
            }
        }
        Arc::new(connector)
    }

    pub fn fail_url(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn heal_url(&self, url: &str) {
        self.failing_urls.lock().unwrap().remove(url);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcConnector for MockConnector {
    async fn connect(&self, chain: &ChainConfig, url: &str) -> BlockchainResult<Arc<dyn ChainRpc>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_urls.lock().unwrap().contains(url) {
            return Err(BlockchainError::Rpc(format!("connection refused: {}", url)));
        }
        let node = self
            .chains
            .lock()
            .unwrap()
            .get(&chain.chain_id)
            .cloned()
            .ok_or_else(|| BlockchainError::Rpc(format!("no node behind {}", url)))?;
        Ok(Arc::new(MockRpc {
            chain: node,
            url: url.to_string(),
        }))
    }
}

/// Signer whose "signed transaction" is the JSON of the call, so the mock node
/// can read it back.
pub struct RecordingSigner {
    accounts: HashSet<Address>,
}

impl RecordingSigner {
    pub fn new(accounts: &[Address]) -> Arc<Self> {
        Arc::new(Self {
            accounts: accounts.iter().copied().collect(),
        })
    }
}

#[async_trait]
impl TransactionSigner for RecordingSigner {
    fn has_account(&self, address: Address) -> bool {
        self.accounts.contains(&address)
    }

    async fn sign_transaction(&self, call: &PendingCall) -> BlockchainResult<Bytes> {
        if !self.has_account(call.from) {
            return Err(BlockchainError::AccountNotFound(call.from));
        }
        let raw = serde_json::to_vec(call).map_err(|e| BlockchainError::Wallet(e.to_string()))?;
        Ok(Bytes::from(raw))
    }
}

/// Validator that refuses the first `failures` requests.
pub struct FlakyValidator {
    inner: LocalValidator,
    failures_left: AtomicU32,
}

impl FlakyValidator {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalValidator::from_private_key(VALIDATOR_KEY).unwrap(),
            failures_left: AtomicU32::new(failures),
        })
    }
}

#[async_trait]
impl ValidatorSigner for FlakyValidator {
    async fn sign_release(&self, digest: B256) -> BridgeResult<Bytes> {
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BridgeError::Authorization("validator offline".into()));
        }
        self.inner.sign_release(digest).await
    }
}

pub fn chain_config(chain_id: u64, urls: &[&str]) -> ChainConfig {
    ChainConfig {
        chain_id,
        name: format!("chain-{}", chain_id),
        symbol: "ETH".into(),
        decimals: 18,
        explorer_url: String::new(),
        rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
        bridge_address: Some(bridge_address(chain_id)),
        deploy_height: 100,
        status: ChainStatus::Active,
    }
}

pub fn engine_config(chain_ids: &[u64]) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.chains = chain_ids
        .iter()
        .map(|id| chain_config(*id, &[&format!("http://node-{}.test", id)]))
        .collect();
    config.bridge.relayer_address = relayer();
    config.bridge.approval_timeout_secs = 2;
    config.transactions.receipt_poll_interval_ms = 10;
    config.watcher.poll_interval_secs = 1;
    config
}

/// Two bridged chains (1 and 56) behind mock nodes.
pub struct Harness {
    pub source: Arc<MockChain>,
    pub destination: Arc<MockChain>,
    pub connector: Arc<MockConnector>,
    pub runtime: Runtime,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_validator(FlakyValidator::new(0))
    }

    pub fn with_validator(validator: Arc<dyn ValidatorSigner>) -> Self {
        Self::with_config(engine_config(&[1, 56]), validator)
    }

    pub fn with_config(config: EngineConfig, validator: Arc<dyn ValidatorSigner>) -> Self {
        let source = MockChain::new(1);
        let destination = MockChain::new(56);
        let connector = MockConnector::new(&[source.clone(), destination.clone()]);
        let signer = RecordingSigner::new(&[user(), relayer()]);
        let runtime = build_runtime_with(config, connector.clone(), signer, validator).unwrap();
        Self {
            source,
            destination,
            connector,
            runtime,
        }
    }
}

pub fn event_log<E: SolEvent>(
    contract: Address,
    event: &E,
    block: u64,
    index: u64,
    tx_hash: TxHash,
) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: contract,
            data: event.encode_log_data(),
        },
        block_number: Some(block),
        transaction_hash: Some(tx_hash),
        log_index: Some(index),
        ..Default::default()
    }
}

pub fn lock_log(source_chain: u64, to_chain: u64, amount: U256, nonce: u64, block: u64) -> Log {
    let event = IBridge::Lock {
        token: Address::ZERO,
        from: user(),
        amount,
        toChainId: U256::from(to_chain),
        toAddress: recipient(),
        nonce: U256::from(nonce),
    };
    event_log(
        bridge_address(source_chain),
        &event,
        block,
        0,
        TxHash::with_last_byte(block as u8),
    )
}

pub fn unlock_log(dest_chain: u64, from_chain: u64, amount: U256, nonce: u64, block: u64) -> Log {
    let event = IBridge::Unlock {
        token: Address::ZERO,
        to: recipient(),
        amount,
        fromChainId: U256::from(from_chain),
        nonce: U256::from(nonce),
    };
    event_log(
        bridge_address(dest_chain),
        &event,
        block,
        0,
        TxHash::repeat_byte(0xee),
    )
}

pub fn one_ether() -> U256 {
    U256::from(1_000_000_000_000_000_000u128)
}
