//! Blockchain RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Define the `ChainRpc` capability every other component talks to
//! - Implement it over an alloy HTTP provider
//! - Classify node errors into the engine's error taxonomy
//! - Establish connections (`RpcConnector`) and verify their chain id

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::Transaction as _;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;

use crate::blockchain::types::{
    BlockchainError, BlockchainResult, CallRequest, ChainTransaction, TxReceipt,
};
use crate::config::schema::ChainConfig;
use crate::resilience::with_timeout;

/// Read and write access to one chain's JSON-RPC endpoint.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Endpoint this connection talks to, for logging.
    fn endpoint(&self) -> &str;

    async fn chain_id(&self) -> BlockchainResult<u64>;

    async fn block_number(&self) -> BlockchainResult<u64>;

    /// Transaction count including the mempool (`pending` tag).
    async fn pending_transaction_count(&self, address: Address) -> BlockchainResult<u64>;

    /// Network suggested legacy gas price in wei.
    async fn gas_price(&self) -> BlockchainResult<u128>;

    async fn max_priority_fee(&self) -> BlockchainResult<u128>;

    /// Base fee of the latest block; `None` on pre-London chains.
    async fn latest_base_fee(&self) -> BlockchainResult<Option<u128>>;

    /// Simulate a call and return its gas usage. Failures map to `Estimation`.
    async fn estimate_gas(&self, call: &CallRequest) -> BlockchainResult<u64>;

    /// Read-only contract call.
    async fn call(&self, call: &CallRequest) -> BlockchainResult<Bytes>;

    /// Broadcast a signed transaction. Rejections map to `Broadcast`.
    async fn send_raw_transaction(&self, raw: Bytes) -> BlockchainResult<TxHash>;

    async fn transaction_by_hash(&self, hash: TxHash)
        -> BlockchainResult<Option<ChainTransaction>>;

    /// `Ok(None)` while the transaction is unknown or unmined.
    async fn transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>>;

    /// Logs emitted by `address` in `[from_block, to_block]`.
    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> BlockchainResult<Vec<Log>>;
}

/// Establishes `ChainRpc` connections for the client pool.
#[async_trait]
pub trait RpcConnector: Send + Sync {
    async fn connect(&self, chain: &ChainConfig, url: &str) -> BlockchainResult<Arc<dyn ChainRpc>>;
}

/// Alloy-backed RPC client.
pub struct AlloyRpc {
    provider: Arc<dyn Provider + Send + Sync>,
    url: String,
    timeout_duration: Duration,
}

impl AlloyRpc {
    /// Create a client for an HTTP endpoint. No request is made.
    pub fn connect_http(url: &str, timeout_duration: Duration) -> BlockchainResult<Self> {
        let parsed: url::Url = url
            .parse()
            .map_err(|e| BlockchainError::Rpc(format!("invalid RPC URL '{}': {}", url, e)))?;
        let provider = ProviderBuilder::new().connect_http(parsed);

        Ok(Self {
            provider: Arc::new(provider),
            url: url.to_string(),
            timeout_duration,
        })
    }

    fn request(&self, call: &CallRequest) -> TransactionRequest {
        let request = TransactionRequest::default()
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone());
        match call.from {
            Some(from) => request.with_from(from),
            None => request,
        }
    }
}

fn rpc_err(e: impl std::fmt::Display) -> BlockchainError {
    BlockchainError::Rpc(e.to_string())
}

#[async_trait]
impl ChainRpc for AlloyRpc {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn chain_id(&self) -> BlockchainResult<u64> {
        with_timeout(self.timeout_duration, async {
            self.provider.get_chain_id().await.map_err(rpc_err)
        })
        .await
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        with_timeout(self.timeout_duration, async {
            self.provider.get_block_number().await.map_err(rpc_err)
        })
        .await
    }

    async fn pending_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        with_timeout(self.timeout_duration, async {
            self.provider
                .get_transaction_count(address)
                .pending()
                .await
                .map_err(rpc_err)
        })
        .await
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        with_timeout(self.timeout_duration, async {
            self.provider.get_gas_price().await.map_err(rpc_err)
        })
        .await
    }

    async fn max_priority_fee(&self) -> BlockchainResult<u128> {
        with_timeout(self.timeout_duration, async {
            self.provider
                .get_max_priority_fee_per_gas()
                .await
                .map_err(rpc_err)
        })
        .await
    }

    async fn latest_base_fee(&self) -> BlockchainResult<Option<u128>> {
        with_timeout(self.timeout_duration, async {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Latest)
                .await
                .map_err(rpc_err)?
                .ok_or_else(|| BlockchainError::Rpc("latest block unavailable".to_string()))?;
            Ok(block.header.base_fee_per_gas.map(u128::from))
        })
        .await
    }

    async fn estimate_gas(&self, call: &CallRequest) -> BlockchainResult<u64> {
        let request = self.request(call);
        with_timeout(self.timeout_duration, async {
            self.provider
                .estimate_gas(request)
                .await
                .map_err(|e| BlockchainError::Estimation(e.to_string()))
        })
        .await
    }

    async fn call(&self, call: &CallRequest) -> BlockchainResult<Bytes> {
        let request = self.request(call);
        with_timeout(self.timeout_duration, async {
            self.provider.call(request).await.map_err(rpc_err)
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> BlockchainResult<TxHash> {
        with_timeout(self.timeout_duration, async {
            let pending = self
                .provider
                .send_raw_transaction(&raw)
                .await
                .map_err(|e| BlockchainError::Broadcast(e.to_string()))?;
            Ok(*pending.tx_hash())
        })
        .await
    }

    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> BlockchainResult<Option<ChainTransaction>> {
        with_timeout(self.timeout_duration, async {
            let tx = self
                .provider
                .get_transaction_by_hash(hash)
                .await
                .map_err(rpc_err)?;
            Ok(tx.map(|tx| ChainTransaction {
                hash,
                from: tx.inner.signer(),
                to: tx.to(),
                value: tx.value(),
                data: tx.input().clone(),
                nonce: tx.nonce(),
                fee_per_gas: tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas()),
                gas_limit: tx.gas_limit(),
                block_number: tx.block_number,
            }))
        })
        .await
    }

    async fn transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        with_timeout(self.timeout_duration, async {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(rpc_err)?;
            Ok(receipt.map(|r| TxReceipt {
                tx_hash: r.transaction_hash,
                block_number: r.block_number,
                success: r.status(),
                gas_used: r.gas_used,
            }))
        })
        .await
    }

    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> BlockchainResult<Vec<Log>> {
        let filter = Filter::new()
            .address(address)
            .from_block(from_block)
            .to_block(to_block);
        with_timeout(self.timeout_duration, async {
            self.provider.get_logs(&filter).await.map_err(rpc_err)
        })
        .await
    }
}

impl std::fmt::Debug for AlloyRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyRpc")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}

/// Connects over HTTP and verifies the endpoint serves the expected chain.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout_duration: Duration,
}

impl HttpConnector {
    pub fn new(timeout_duration: Duration) -> Self {
        Self { timeout_duration }
    }
}

#[async_trait]
impl RpcConnector for HttpConnector {
    async fn connect(&self, chain: &ChainConfig, url: &str) -> BlockchainResult<Arc<dyn ChainRpc>> {
        let client = AlloyRpc::connect_http(url, self.timeout_duration)?;

        let actual = client.chain_id().await?;
        if actual != chain.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: chain.chain_id,
                actual,
            });
        }

        Ok(Arc::new(client))
    }
}
