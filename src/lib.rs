//! Multi-chain transaction lifecycle and lock/unlock bridge engine.
//!
//! Drives wallet-signed transactions across independent EVM chains and keeps
//! bridge transfers in step with the `Lock`/`Unlock` events those chains emit.

pub mod blockchain;
pub mod bridge;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use blockchain::{ClientPool, TransactionSubmitter};
pub use bridge::BridgeEngine;
pub use config::EngineConfig;
pub use lifecycle::Shutdown;
