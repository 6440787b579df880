//! Transfer record persistence.
//!
//! Records are keyed by `(fromChainId, toChainId, nonce)`. Every mutation is a
//! compare-and-set on the record's status, so two legs observed in the same
//! polling window cannot overwrite each other.
//!
//! The snapshot file is shared between processes (a `transfer` command and a
//! running watcher). Each operation takes an advisory lock on `<path>.lock`,
//! reloads the file, and a mutation writes it back before the lock is released.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::bridge::types::{
    unix_now, BridgeError, BridgeResult, CrossTransfer, Page, TransferFilter, TransferKey,
    TransferLane, TransferPage, TransferStatus, TransferUpdate,
};

/// Durable home of `CrossTransfer` records and watcher checkpoints.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert a new record. Assigns `id` and timestamps; rejects a duplicate key.
    async fn create_transfer(&self, transfer: CrossTransfer) -> BridgeResult<CrossTransfer>;

    async fn find_transfer(&self, key: &TransferKey) -> BridgeResult<Option<CrossTransfer>>;

    /// Apply `update` only if the record is still in `expected` status.
    ///
    /// Fails with `StatusConflict` when it is not, and `InvalidTransition` when
    /// the update would move the status backwards.
    async fn update_transfer(
        &self,
        key: &TransferKey,
        expected: TransferStatus,
        update: TransferUpdate,
    ) -> BridgeResult<CrossTransfer>;

    /// Matching records newest first, plus the total match count.
    async fn list_transfers(&self, filter: &TransferFilter, page: Page)
        -> BridgeResult<TransferPage>;

    /// Records leaving `from_chain_id` that sit in `status`, oldest first.
    async fn transfers_in_status(
        &self,
        from_chain_id: u64,
        status: TransferStatus,
    ) -> BridgeResult<Vec<CrossTransfer>>;

    async fn highest_nonce(&self, lane: TransferLane) -> BridgeResult<Option<u64>>;

    /// Highest block on `chain_id` at which an event was reconciled into a record.
    async fn highest_reconciled_block(&self, chain_id: u64) -> BridgeResult<Option<u64>>;

    /// Last block the watcher fully processed on `chain_id`.
    async fn checkpoint(&self, chain_id: u64) -> BridgeResult<Option<u64>>;

    async fn save_checkpoint(&self, chain_id: u64, block: u64) -> BridgeResult<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    transfers: Vec<CrossTransfer>,
    checkpoints: BTreeMap<u64, u64>,
}

/// Held while the snapshot is read or rewritten. Closing the file drops the OS lock.
struct SnapshotLock<'a> {
    _process: MutexGuard<'a, ()>,
    _file: File,
}

/// Concurrent in-memory store with an optional write-through JSON snapshot.
#[derive(Debug)]
pub struct MemoryTransferStore {
    transfers: DashMap<TransferKey, CrossTransfer>,
    checkpoints: DashMap<u64, u64>,
    next_id: AtomicU64,
    persistence_path: Option<PathBuf>,
    file_lock: Mutex<()>,
}

impl Default for MemoryTransferStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryTransferStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            transfers: DashMap::new(),
            checkpoints: DashMap::new(),
            next_id: AtomicU64::new(1),
            persistence_path,
            file_lock: Mutex::new(()),
        }
    }

    /// Load from file if it exists; later operations keep it in sync.
    pub fn load_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        drop(store.lock_snapshot(false)?);
        tracing::info!(
            path = %path.display(),
            transfers = store.transfers.len(),
            checkpoints = store.checkpoints.len(),
            "Loaded transfer store snapshot"
        );
        Ok(store)
    }

    /// Merge the file with this process's view and write it back.
    /// No-op for a purely in-memory store.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        let _lock = self.lock_snapshot(true)?;
        self.write_snapshot()
    }

    /// Lock the snapshot file (shared or exclusive) and pull in what other
    /// processes wrote. `None` for a purely in-memory store.
    fn lock_snapshot(&self, exclusive: bool) -> std::io::Result<Option<SnapshotLock<'_>>> {
        let Some(path) = &self.persistence_path else {
            return Ok(None);
        };
        let process = self
            .file_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.with_extension("lock"))?;
        if exclusive {
            file.lock()?;
        } else {
            file.lock_shared()?;
        }

        self.reload(path)?;
        Ok(Some(SnapshotLock {
            _process: process,
            _file: file,
        }))
    }

    /// The file is authoritative: every mutation that succeeded anywhere was
    /// written to it before its lock was released.
    fn reload(&self, path: &Path) -> std::io::Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;

        let mut max_id = 0;
        for transfer in snapshot.transfers {
            max_id = max_id.max(transfer.id);
            self.transfers.insert(transfer.key(), transfer);
        }
        for (chain_id, block) in snapshot.checkpoints {
            let mut entry = self.checkpoints.entry(chain_id).or_insert(block);
            *entry = (*entry).max(block);
        }
        self.next_id
            .fetch_max(snapshot.next_id.max(max_id + 1), Ordering::SeqCst);
        Ok(())
    }

    /// Caller holds the exclusive lock.
    fn write_snapshot(&self) -> std::io::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let mut transfers: Vec<CrossTransfer> =
            self.transfers.iter().map(|r| r.value().clone()).collect();
        transfers.sort_by_key(|t| t.id);
        let snapshot = Snapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            transfers,
            checkpoints: self.checkpoints.iter().map(|r| (*r.key(), *r.value())).collect(),
        };

        // Write then rename so a crash never leaves a truncated snapshot.
        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &snapshot)?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), transfers = snapshot.transfers.len(), "Saved transfer store");
        Ok(())
    }

    fn read_lock(&self) -> BridgeResult<Option<SnapshotLock<'_>>> {
        self.lock_snapshot(false).map_err(store_error)
    }

    fn write_lock(&self) -> BridgeResult<Option<SnapshotLock<'_>>> {
        self.lock_snapshot(true).map_err(store_error)
    }

    fn persist(&self) -> BridgeResult<()> {
        self.write_snapshot().map_err(store_error)
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

fn store_error(e: std::io::Error) -> BridgeError {
    BridgeError::Store(format!("snapshot: {}", e))
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    async fn create_transfer(&self, mut transfer: CrossTransfer) -> BridgeResult<CrossTransfer> {
        let _lock = self.write_lock()?;
        let key = transfer.key();
        let created = match self.transfers.entry(key) {
            Entry::Occupied(_) => return Err(BridgeError::Duplicate(key)),
            Entry::Vacant(slot) => {
                let now = unix_now();
                transfer.id = self.next_id.fetch_add(1, Ordering::SeqCst);
                transfer.created_at = now;
                transfer.updated_at = now;
                slot.insert(transfer.clone());
                transfer
            }
        };
        if let Err(e) = self.persist() {
            self.transfers.remove(&key);
            return Err(e);
        }
        Ok(created)
    }

    async fn find_transfer(&self, key: &TransferKey) -> BridgeResult<Option<CrossTransfer>> {
        let _lock = self.read_lock()?;
        Ok(self.transfers.get(key).map(|r| r.value().clone()))
    }

    async fn update_transfer(
        &self,
        key: &TransferKey,
        expected: TransferStatus,
        update: TransferUpdate,
    ) -> BridgeResult<CrossTransfer> {
        let _lock = self.write_lock()?;
        let (previous, updated) = {
            let mut record = self
                .transfers
                .get_mut(key)
                .ok_or(BridgeError::NotFound(*key))?;

            if record.status != expected {
                return Err(BridgeError::StatusConflict {
                    key: *key,
                    expected,
                    actual: record.status,
                });
            }
            if let Some(target) = update.status {
                if target < record.status {
                    return Err(BridgeError::InvalidTransition {
                        key: *key,
                        from: record.status,
                        to: target,
                    });
                }
            }

            let previous = record.clone();
            update.apply(&mut record, unix_now());
            (previous, record.clone())
        };
        if let Err(e) = self.persist() {
            self.transfers.insert(*key, previous);
            return Err(e);
        }
        Ok(updated)
    }

    async fn list_transfers(
        &self,
        filter: &TransferFilter,
        page: Page,
    ) -> BridgeResult<TransferPage> {
        let _lock = self.read_lock()?;
        let mut matching: Vec<CrossTransfer> = self
            .transfers
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));

        let total = matching.len();
        let records = matching
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .collect();
        Ok(TransferPage { records, total })
    }

    async fn transfers_in_status(
        &self,
        from_chain_id: u64,
        status: TransferStatus,
    ) -> BridgeResult<Vec<CrossTransfer>> {
        let _lock = self.read_lock()?;
        let mut records: Vec<CrossTransfer> = self
            .transfers
            .iter()
            .filter(|r| r.from_chain_id == from_chain_id && r.status == status)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|t| t.id);
        Ok(records)
    }

    async fn highest_nonce(&self, lane: TransferLane) -> BridgeResult<Option<u64>> {
        let _lock = self.read_lock()?;
        Ok(self
            .transfers
            .iter()
            .filter(|r| r.key().lane() == lane)
            .map(|r| r.nonce)
            .max())
    }

    async fn highest_reconciled_block(&self, chain_id: u64) -> BridgeResult<Option<u64>> {
        let _lock = self.read_lock()?;
        Ok(self
            .transfers
            .iter()
            .flat_map(|r| {
                let lock = r.lock_block.filter(|_| r.from_chain_id == chain_id);
                let unlock = r.unlock_block.filter(|_| r.to_chain_id == chain_id);
                [lock, unlock]
            })
            .flatten()
            .max())
    }

    async fn checkpoint(&self, chain_id: u64) -> BridgeResult<Option<u64>> {
        let _lock = self.read_lock()?;
        Ok(self.checkpoints.get(&chain_id).map(|r| *r))
    }

    async fn save_checkpoint(&self, chain_id: u64, block: u64) -> BridgeResult<()> {
        let _lock = self.write_lock()?;
        let previous = self.checkpoints.get(&chain_id).map(|r| *r);
        {
            let mut entry = self.checkpoints.entry(chain_id).or_insert(block);
            // Re-scans after a restart must not move the watermark backwards.
            *entry = (*entry).max(block);
        }
        if let Err(e) = self.persist() {
            match previous {
                Some(block) => self.checkpoints.insert(chain_id, block),
                None => self.checkpoints.remove(&chain_id).map(|(_, b)| b),
            };
            return Err(e);
        }
        Ok(())
    }
}
