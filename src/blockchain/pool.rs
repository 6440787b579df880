//! Per-chain connection cache.
//!
//! One connection per chain id, established lazily from the registry's RPC
//! URLs (first reachable wins). Lookups take a shared lock; inserts and
//! teardown take the exclusive lock. No lock is held while connecting.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::blockchain::client::{ChainRpc, RpcConnector};
use crate::blockchain::registry::ChainRegistry;
use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::observability::metrics;

/// Injectable pool of chain connections.
pub struct ClientPool {
    registry: Arc<ChainRegistry>,
    connector: Arc<dyn RpcConnector>,
    clients: RwLock<HashMap<u64, Arc<dyn ChainRpc>>>,
}

impl ClientPool {
    pub fn new(registry: Arc<ChainRegistry>, connector: Arc<dyn RpcConnector>) -> Self {
        Self {
            registry,
            connector,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached connection for `chain_id`, establishing it on first use.
    pub async fn get_client(&self, chain_id: u64) -> BlockchainResult<Arc<dyn ChainRpc>> {
        if let Some(client) = self.cached(chain_id) {
            return Ok(client);
        }

        let chain = self.registry.get(chain_id)?;
        let mut last_error = String::from("no RPC URLs configured");
        let mut connected = None;

        for (i, url) in chain.rpc_urls.iter().enumerate() {
            match self.connector.connect(&chain, url).await {
                Ok(client) => {
                    connected = Some(client);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        chain_id,
                        url_idx = i,
                        error = %e,
                        "RPC endpoint unreachable, trying next"
                    );
                    last_error = e.to_string();
                }
            }
        }

        let client = connected.ok_or(BlockchainError::Connectivity {
            chain_id,
            reason: last_error,
        })?;

        let mut clients = self
            .clients
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another caller may have connected while we were probing; keep theirs.
        let stored = clients.entry(chain_id).or_insert_with(|| client.clone()).clone();
        metrics::record_client_pool_size(clients.len());
        drop(clients);

        if Arc::ptr_eq(&stored, &client) {
            tracing::info!(chain_id, endpoint = %stored.endpoint(), "Chain client connected");
        }
        Ok(stored)
    }

    fn cached(&self, chain_id: u64) -> Option<Arc<dyn ChainRpc>> {
        self.clients
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&chain_id)
            .cloned()
    }

    /// Drop a single cached connection, e.g. after its endpoint misbehaved.
    pub fn evict(&self, chain_id: u64) -> bool {
        let mut clients = self
            .clients
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = clients.remove(&chain_id).is_some();
        metrics::record_client_pool_size(clients.len());
        removed
    }

    /// Tear down every cached connection. Returns how many were dropped.
    pub fn close_all(&self) -> usize {
        let mut clients = self
            .clients
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = clients.len();
        clients.clear();
        metrics::record_client_pool_size(0);
        tracing::info!(closed = count, "Closed all chain clients");
        count
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }
}
