//! Lock/unlock bridge protocol.
//!
//! # Data Flow
//! ```text
//! initiate_transfer (CLI or caller)
//!     → engine.rs (bridge nonce, approve, lock via TransactionSubmitter)
//!     → store.rs (LockedPending record)
//!
//! watcher.rs (one task per bridge chain)
//!     → ClientPool (eth_getLogs on the bridge contract)
//!     → contract.rs (decode Lock / Unlock)
//!     → engine.rs (reconcile, release via validator.rs + unlock call)
//!     → store.rs (compare-and-set transitions, checkpoints)
//! ```

pub mod contract;
pub mod engine;
pub mod store;
pub mod types;
pub mod validator;
pub mod watcher;

pub use engine::{BridgeEngine, InitiatedTransfer, TransferRequest};
pub use store::{MemoryTransferStore, TransferStore};
pub use types::{
    BridgeError, BridgeResult, CrossTransfer, LockEvent, Page, ReconcileOutcome, TransferFilter,
    TransferKey, TransferLane, TransferPage, TransferStatus, TransferUpdate, UnlockEvent,
};
pub use validator::{LocalValidator, UnavailableValidator, ValidatorSigner};
pub use watcher::{spawn_watchers, BridgeWatcher, CycleReport};
