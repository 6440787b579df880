//! Per-chain bridge event polling.
//!
//! # Responsibilities
//! - Scan new blocks of one chain for `Lock` and `Unlock` logs
//! - Feed them to the engine in `(block, log index)` order
//! - Persist a checkpoint after every fully dispatched chunk
//! - Retry stalled releases once per cycle
//!
//! Errors never leave the loop; only the shutdown signal ends it.

use std::sync::Arc;
use std::time::Duration;

use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::bridge::contract::{decode_lock, decode_unlock, IBridge};
use crate::bridge::engine::BridgeEngine;
use crate::bridge::types::{BridgeError, BridgeResult, ReconcileOutcome};
use crate::config::WatcherConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::resilience::poll_delay;

/// What one polling cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// First block scanned; `None` when the chain had nothing new.
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub advanced: usize,
    pub replayed: usize,
    pub deferred: usize,
    pub skipped: usize,
    /// Pending locks confirmed from their receipt after the scan missed them.
    pub recovered: usize,
    pub released: usize,
}

/// First block to scan: past the deployment, the checkpoint and every reconciled event.
pub fn start_block(deploy_height: u64, checkpoint: Option<u64>, reconciled: Option<u64>) -> u64 {
    let after_checkpoint = checkpoint.map_or(0, |b| b + 1);
    let after_reconciled = reconciled.map_or(0, |b| b + 1);
    deploy_height.max(after_checkpoint).max(after_reconciled)
}

/// Polls one chain's bridge contract.
pub struct BridgeWatcher {
    chain_id: u64,
    engine: Arc<BridgeEngine>,
    config: WatcherConfig,
}

impl BridgeWatcher {
    pub fn new(chain_id: u64, engine: Arc<BridgeEngine>, config: WatcherConfig) -> Self {
        Self {
            chain_id,
            engine,
            config,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Run one cycle. A retryable error aborts it without moving the checkpoint
    /// past the failed chunk.
    pub async fn poll_once(&self) -> BridgeResult<CycleReport> {
        let chain = self
            .engine
            .registry()
            .get(self.chain_id)
            .map_err(|e| BridgeError::Configuration(e.to_string()))?;
        let bridge = chain.bridge_address.ok_or_else(|| {
            BridgeError::Configuration(format!("chain {} has no bridge contract", self.chain_id))
        })?;
        let client = self.engine.pool().get_client(self.chain_id).await?;
        let store = self.engine.store();

        let from = start_block(
            chain.deploy_height,
            store.checkpoint(self.chain_id).await?,
            store.highest_reconciled_block(self.chain_id).await?,
        );
        let head = client.block_number().await?;
        let target = head.saturating_sub(self.config.confirmations);

        let mut report = CycleReport::default();
        if target >= from {
            report.from_block = Some(from);
            let range = self.config.max_block_range.max(1);
            let mut chunk_start = from;

            while chunk_start <= target {
                let chunk_end = chunk_start.saturating_add(range - 1).min(target);
                let mut logs = client.logs(bridge, chunk_start, chunk_end).await?;
                logs.sort_by_key(|log| {
                    (
                        log.block_number.unwrap_or_default(),
                        log.log_index.unwrap_or_default(),
                    )
                });

                for log in &logs {
                    match self.dispatch(log).await {
                        Ok(Some(ReconcileOutcome::Advanced(_))) => report.advanced += 1,
                        Ok(Some(ReconcileOutcome::AlreadyReconciled)) => report.replayed += 1,
                        Ok(Some(ReconcileOutcome::Deferred(_))) => report.deferred += 1,
                        Ok(None) => {}
                        Err(e) if e.is_retryable() => return Err(e),
                        Err(e) => {
                            report.skipped += 1;
                            tracing::warn!(
                                chain_id = self.chain_id,
                                block = log.block_number,
                                tx_hash = ?log.transaction_hash,
                                error = %e,
                                "Skipping bridge event"
                            );
                        }
                    }
                }

                store.save_checkpoint(self.chain_id, chunk_end).await?;
                metrics::record_scanned_block(self.chain_id, chunk_end);
                report.to_block = Some(chunk_end);

                if chunk_end == u64::MAX {
                    break;
                }
                chunk_start = chunk_end + 1;
            }
        }

        if let Some(scanned_to) = store.checkpoint(self.chain_id).await? {
            report.recovered = self
                .engine
                .recover_missed_locks(self.chain_id, scanned_to)
                .await?;
        }
        report.released = self.engine.retry_stalled_unlocks(self.chain_id).await?;
        Ok(report)
    }

    async fn dispatch(&self, log: &Log) -> BridgeResult<Option<ReconcileOutcome>> {
        match log.topics().first() {
            Some(topic) if *topic == IBridge::Lock::SIGNATURE_HASH => {
                let event = decode_lock(log)?;
                self.engine.reconcile_lock(self.chain_id, event).await.map(Some)
            }
            Some(topic) if *topic == IBridge::Unlock::SIGNATURE_HASH => {
                let event = decode_unlock(log)?;
                self.engine.reconcile_unlock(self.chain_id, event).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Poll until shutdown. Failing cycles back off with jitter up to `max_backoff_secs`.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let max_backoff = Duration::from_secs(self.config.max_backoff_secs);
        let mut consecutive_failures = 0u32;

        tracing::info!(
            chain_id = self.chain_id,
            interval_secs = self.config.poll_interval_secs,
            "Bridge watcher starting"
        );

        loop {
            match self.poll_once().await {
                Ok(report) => {
                    consecutive_failures = 0;
                    metrics::record_watcher_cycle(self.chain_id, true);
                    if report.from_block.is_some() || report.recovered > 0 || report.released > 0 {
                        tracing::debug!(chain_id = self.chain_id, ?report, "Watcher cycle complete");
                    }
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    metrics::record_watcher_cycle(self.chain_id, false);
                    tracing::warn!(
                        chain_id = self.chain_id,
                        consecutive_failures,
                        error = %e,
                        "Watcher cycle failed; range will be retried"
                    );
                }
            }

            let delay = poll_delay(interval, consecutive_failures, max_backoff);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::info!(chain_id = self.chain_id, "Bridge watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Spawn one watcher per active bridge chain.
pub fn spawn_watchers(
    engine: &Arc<BridgeEngine>,
    config: &WatcherConfig,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    engine
        .registry()
        .bridge_chains()
        .into_iter()
        .map(|chain| {
            let watcher = BridgeWatcher::new(chain.chain_id, engine.clone(), config.clone());
            tokio::spawn(watcher.run(shutdown.subscribe()))
        })
        .collect()
}
