//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! EngineConfig.chains
//!     → registry.rs (chain metadata snapshot)
//!     → pool.rs (one connection per chain, via client.rs)
//!     → transaction.rs (price, nonce, sign via wallet.rs, broadcast)
//!     → confirmation.rs (receipt polling)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts
//! - Graceful degradation when blockchain unreachable

pub mod client;
pub mod confirmation;
pub mod gas;
pub mod nonce;
pub mod pool;
pub mod registry;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{AlloyRpc, ChainRpc, HttpConnector, RpcConnector};
pub use confirmation::ConfirmationWaiter;
pub use gas::{GasQuote, GasSpeed};
pub use nonce::NonceAllocator;
pub use pool::ClientPool;
pub use registry::ChainRegistry;
pub use transaction::{SubmitRequest, Submitted, TransactionSubmitter};
pub use types::{
    BlockchainError, BlockchainResult, CallRequest, ChainTransaction, PendingCall, TxReceipt,
};
pub use wallet::{Keystore, TransactionSigner};
