//! Bridge record types and errors.

use std::fmt;

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::BlockchainError;

/// Errors raised by the bridge engine, store and watcher.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Unknown or disabled chain, or chain without a bridge contract.
    #[error("bridge configuration error: {0}")]
    Configuration(String),

    /// Rejected request (zero amount, same source and destination).
    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    /// No record for the correlation key.
    #[error("transfer {0} not found")]
    NotFound(TransferKey),

    /// A record already exists for the correlation key.
    #[error("transfer {0} already exists")]
    Duplicate(TransferKey),

    /// An observed event disagrees with the stored record.
    #[error("event does not match transfer {key}: {reason}")]
    EventMismatch { key: TransferKey, reason: String },

    /// Compare-and-set lost: the record is no longer in the expected status.
    #[error("transfer {key} is {actual}, expected {expected}")]
    StatusConflict {
        key: TransferKey,
        expected: TransferStatus,
        actual: TransferStatus,
    },

    /// Attempt to move a record backwards.
    #[error("transfer {key} cannot move from {from} to {to}")]
    InvalidTransition {
        key: TransferKey,
        from: TransferStatus,
        to: TransferStatus,
    },

    /// Validator refused or failed to sign a release.
    #[error("release authorization failed: {0}")]
    Authorization(String),

    /// Malformed log or call return data.
    #[error("decode error: {0}")]
    Decode(String),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// The lock went out but its record was not written. Retrying would lock twice.
    #[error("lock {tx_hash} (bridge nonce {nonce}) was broadcast but not recorded: {reason}")]
    LockNotRecorded {
        tx_hash: TxHash,
        nonce: u64,
        reason: String,
    },

    #[error(transparent)]
    Chain(#[from] BlockchainError),
}

impl BridgeError {
    /// Whether the watcher should stop the cycle and retry the same range later.
    ///
    /// Non-retryable errors concern a single event and are skipped.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Store(_) => true,
            BridgeError::Chain(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Lifecycle of a cross-chain transfer. Only ever moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    LockedPending = 0,
    LockedConfirmed = 1,
    UnlockedPending = 2,
    Completed = 3,
}

impl TransferStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TransferStatus::LockedPending),
            1 => Some(TransferStatus::LockedConfirmed),
            2 => Some(TransferStatus::UnlockedPending),
            3 => Some(TransferStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::LockedPending => "locked_pending",
            TransferStatus::LockedConfirmed => "locked_confirmed",
            TransferStatus::UnlockedPending => "unlocked_pending",
            TransferStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a transfer. Bridge nonces are unique per lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferLane {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
}

/// Correlation key shared by the lock and unlock legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferKey {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub nonce: u64,
}

impl TransferKey {
    pub fn new(from_chain_id: u64, to_chain_id: u64, nonce: u64) -> Self {
        Self {
            from_chain_id,
            to_chain_id,
            nonce,
        }
    }

    pub fn lane(&self) -> TransferLane {
        TransferLane {
            from_chain_id: self.from_chain_id,
            to_chain_id: self.to_chain_id,
        }
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}#{}", self.from_chain_id, self.to_chain_id, self.nonce)
    }
}

/// The bridge's unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTransfer {
    /// Store-assigned insertion sequence; orders listings.
    pub id: u64,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_address: Address,
    pub to_address: Address,
    /// Zero address for the native asset.
    pub token_address: Address,
    pub amount: U256,
    /// Network fee budget of the lock call in source-chain wei.
    pub fee: U256,
    pub nonce: u64,
    pub from_hash: Option<TxHash>,
    pub to_hash: Option<TxHash>,
    pub lock_block: Option<u64>,
    pub unlock_block: Option<u64>,
    pub status: TransferStatus,
    /// Last release failure, cleared when the record advances.
    pub error: Option<String>,
    /// Unix seconds.
    pub created_at: u64,
    pub updated_at: u64,
}

impl CrossTransfer {
    pub fn key(&self) -> TransferKey {
        TransferKey::new(self.from_chain_id, self.to_chain_id, self.nonce)
    }

    pub fn is_native(&self) -> bool {
        self.token_address == Address::ZERO
    }

    pub fn involves(&self, address: Address) -> bool {
        self.from_address == address || self.to_address == address
    }
}

/// Partial update applied by [`TransferStore::update_transfer`](crate::bridge::store::TransferStore::update_transfer).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferUpdate {
    pub status: Option<TransferStatus>,
    pub from_hash: Option<TxHash>,
    pub to_hash: Option<TxHash>,
    pub lock_block: Option<u64>,
    pub unlock_block: Option<u64>,
    pub error: Option<String>,
}

impl TransferUpdate {
    pub fn advance(status: TransferStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_from_hash(mut self, hash: TxHash) -> Self {
        self.from_hash = Some(hash);
        self
    }

    pub fn with_to_hash(mut self, hash: Option<TxHash>) -> Self {
        self.to_hash = hash;
        self
    }

    pub fn with_lock_block(mut self, block: u64) -> Self {
        self.lock_block = Some(block);
        self
    }

    pub fn with_unlock_block(mut self, block: u64) -> Self {
        self.unlock_block = Some(block);
        self
    }

    /// Apply to `record`. A status change clears any recorded error.
    pub fn apply(&self, record: &mut CrossTransfer, now: u64) {
        if let Some(status) = self.status {
            if status != record.status {
                record.error = None;
            }
            record.status = status;
        }
        if let Some(hash) = self.from_hash {
            record.from_hash = Some(hash);
        }
        if let Some(hash) = self.to_hash {
            record.to_hash = Some(hash);
        }
        if let Some(block) = self.lock_block {
            record.lock_block = Some(block);
        }
        if let Some(block) = self.unlock_block {
            record.unlock_block = Some(block);
        }
        if let Some(error) = &self.error {
            record.error = Some(error.clone());
        }
        record.updated_at = now;
    }
}

/// Listing filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferFilter {
    pub from_chain_id: Option<u64>,
    pub to_chain_id: Option<u64>,
    /// Matches either side of the transfer.
    pub address: Option<Address>,
    pub status: Option<TransferStatus>,
}

impl TransferFilter {
    pub fn matches(&self, record: &CrossTransfer) -> bool {
        self.from_chain_id.map_or(true, |id| record.from_chain_id == id)
            && self.to_chain_id.map_or(true, |id| record.to_chain_id == id)
            && self.address.map_or(true, |a| record.involves(a))
            && self.status.map_or(true, |s| record.status == s)
    }
}

pub const MAX_PAGE_SIZE: usize = 100;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Page {
    /// Page numbers below 1 become 1; sizes are clamped to `1..=100`.
    pub fn new(number: usize, size: usize) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.number - 1).saturating_mul(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// One page of records plus the number of matches across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPage {
    pub records: Vec<CrossTransfer>,
    pub total: usize,
}

/// Decoded `Lock` log from a source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEvent {
    pub token: Address,
    pub from: Address,
    pub amount: U256,
    pub to_chain_id: u64,
    pub to_address: Address,
    pub nonce: u64,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u64,
}

/// Decoded `Unlock` log from a destination chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockEvent {
    pub token: Address,
    pub to: Address,
    pub amount: U256,
    pub from_chain_id: u64,
    pub nonce: u64,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u64,
}

/// Result of feeding one event (or one retry) into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record moved to this status.
    Advanced(TransferStatus),
    /// Replay of something already applied; nothing changed.
    AlreadyReconciled,
    /// Lock confirmed but release failed; the record waits in `LockedConfirmed`.
    Deferred(String),
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
