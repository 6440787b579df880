//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated `EngineConfig` into the runtime object graph
//! - Load key material from the environment
//! - Restore the transfer store snapshot
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - No connection is opened here; the pool connects lazily

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::blockchain::{
    BlockchainError, ChainRegistry, ClientPool, HttpConnector, Keystore, RpcConnector,
    TransactionSigner, TransactionSubmitter,
};
use crate::bridge::{
    BridgeEngine, LocalValidator, MemoryTransferStore, UnavailableValidator, ValidatorSigner,
};
use crate::config::{ChainConfig, EngineConfig};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load account keys: {0}")]
    Keys(#[from] BlockchainError),

    #[error("failed to load transfer store: {0}")]
    Store(#[from] std::io::Error),
}

/// Everything the commands operate on.
pub struct Runtime {
    pub config: EngineConfig,
    pub registry: Arc<ChainRegistry>,
    pub pool: Arc<ClientPool>,
    pub submitter: Arc<TransactionSubmitter>,
    pub store: Arc<MemoryTransferStore>,
    pub engine: Arc<BridgeEngine>,
}

/// Build the runtime with HTTP connections and keys from the environment.
pub fn build_runtime(config: EngineConfig) -> Result<Runtime, StartupError> {
    let connector = Arc::new(HttpConnector::new(Duration::from_secs(config.rpc.timeout_secs)));
    let keystore = Keystore::from_env()?;
    let validator: Arc<dyn ValidatorSigner> = match LocalValidator::from_env() {
        Ok(validator) => Arc::new(validator),
        Err(e) => {
            tracing::warn!(error = %e, "Releases disabled until a validator key is configured");
            Arc::new(UnavailableValidator)
        }
    };
    build_runtime_with(config, connector, Arc::new(keystore), validator)
}

/// Build the runtime around caller-supplied capabilities.
pub fn build_runtime_with(
    config: EngineConfig,
    connector: Arc<dyn RpcConnector>,
    signer: Arc<dyn TransactionSigner>,
    validator: Arc<dyn ValidatorSigner>,
) -> Result<Runtime, StartupError> {
    let registry = Arc::new(ChainRegistry::new(config.chains.clone()));
    let pool = Arc::new(ClientPool::new(registry.clone(), connector));
    let submitter = Arc::new(TransactionSubmitter::new(
        pool.clone(),
        signer,
        config.transactions.clone(),
    ));

    let store = match &config.store.path {
        Some(path) => MemoryTransferStore::load_from_file(PathBuf::from(path))?,
        None => MemoryTransferStore::new(None),
    };
    let store = Arc::new(store);

    let engine = Arc::new(BridgeEngine::new(
        submitter.clone(),
        store.clone(),
        validator,
        config.bridge.clone(),
    ));

    tracing::info!(
        chains = registry.all().len(),
        bridge_chains = registry.bridge_chains().len(),
        persistent_store = config.store.path.is_some(),
        "Runtime initialized"
    );

    Ok(Runtime {
        config,
        registry,
        pool,
        submitter,
        store,
        engine,
    })
}

impl Runtime {
    /// Swap in a reloaded chain list. Connections of chains whose entry changed
    /// are dropped so the next call reconnects with the new endpoints.
    pub fn apply_chain_reload(&self, chains: Vec<ChainConfig>) {
        let previous = self.registry.all();
        for old in &previous {
            let unchanged = chains.iter().any(|c| c == old);
            if !unchanged && self.pool.evict(old.chain_id) {
                tracing::info!(chain_id = old.chain_id, "Chain configuration changed, connection dropped");
            }
        }
        self.registry.replace_all(chains);
        tracing::info!(chains = self.registry.all().len(), "Chain registry reloaded");
    }

    /// Close every connection and flush the store.
    pub fn shutdown(&self) {
        self.pool.close_all();
        if let Err(e) = self.store.save_to_file() {
            tracing::error!(error = %e, "Failed to save transfer store on shutdown");
        }
    }
}
