//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Root configuration for the engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Chains known to the registry.
    pub chains: Vec<ChainConfig>,

    /// RPC connection settings shared by all chains.
    pub rpc: RpcConfig,

    /// Transaction submission settings.
    pub transactions: TransactionConfig,

    /// Bridge protocol settings.
    pub bridge: BridgeConfig,

    /// Bridge event watcher settings.
    pub watcher: WatcherConfig,

    /// Transfer record persistence.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Administrative status of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    #[default]
    Active,
    Disabled,
}

/// Static metadata for one chain.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Numeric chain id (1 = Ethereum mainnet, 56 = BNB Chain).
    pub chain_id: u64,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Native asset symbol.
    #[serde(default)]
    pub symbol: String,

    /// Native asset decimals.
    #[serde(default = "default_decimals")]
    pub decimals: u8,

    /// Block explorer base URL.
    #[serde(default)]
    pub explorer_url: String,

    /// JSON-RPC endpoints, tried in order.
    pub rpc_urls: Vec<String>,

    /// Bridge contract address, if the chain participates in the bridge.
    #[serde(default)]
    pub bridge_address: Option<Address>,

    /// Block the bridge contract was deployed at; first block the watcher scans.
    #[serde(default)]
    pub deploy_height: u64,

    #[serde(default)]
    pub status: ChainStatus,
}

fn default_decimals() -> u8 {
    18
}

impl ChainConfig {
    pub fn is_active(&self) -> bool {
        self.status == ChainStatus::Active
    }

    /// Explorer link for a transaction hash, if an explorer is configured.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        if self.explorer_url.is_empty() {
            return None;
        }
        Some(format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash))
    }
}

/// RPC connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// RPC request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Transaction submission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Gas price multiplier in basis points (10000 = suggested, 12000 = 20% buffer).
    pub gas_price_multiplier_bps: u64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Multiplier applied to estimated gas limits, in basis points.
    pub gas_limit_multiplier_bps: u64,

    /// Receipt polling interval in milliseconds.
    pub receipt_poll_interval_ms: u64,

    /// Default deadline for receipt waits in seconds.
    pub receipt_timeout_secs: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            gas_price_multiplier_bps: 10_000,
            max_gas_price_gwei: 500,
            gas_limit_multiplier_bps: 12_000,
            receipt_poll_interval_ms: 1000,
            receipt_timeout_secs: 120,
        }
    }
}

/// Bridge protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Account that submits `unlock` calls on destination chains.
    pub relayer_address: Address,

    /// Deadline for token approval receipts in seconds.
    pub approval_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            relayer_address: Address::ZERO,
            approval_timeout_secs: 300,
        }
    }
}

/// Bridge event watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Run watchers in the `run` command.
    pub enabled: bool,

    /// Polling interval in seconds.
    pub poll_interval_secs: u64,

    /// Blocks to stay behind the head.
    pub confirmations: u64,

    /// Maximum blocks per `eth_getLogs` query.
    pub max_block_range: u64,

    /// Upper bound for the backoff after consecutive failed cycles, in seconds.
    pub max_backoff_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 10,
            confirmations: 0,
            max_block_range: 5000,
            max_backoff_secs: 120,
        }
    }
}

/// Transfer record persistence.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file; in-memory only when unset.
    pub path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
