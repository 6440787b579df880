//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! engine.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → chains feed the ChainRegistry, sections feed each subsystem
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ChainRegistry::replace_all swaps the chain snapshot
//! ```
//!
//! Only the chain list is hot-reloaded; other sections need a restart.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    BridgeConfig, ChainConfig, ChainStatus, EngineConfig, ObservabilityConfig, RpcConfig,
    StoreConfig, TransactionConfig, WatcherConfig,
};
