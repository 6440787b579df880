//! Cross-chain transfer orchestration.
//!
//! # State machine
//! ```text
//! initiate_transfer ─▶ LockedPending ──Lock event──▶ LockedConfirmed
//!                                                        │ release (sign + unlock)
//!                                                        ▼
//!                       Completed ◀──Unlock event── UnlockedPending
//! ```
//! A failed release leaves the record in `LockedConfirmed`; the watcher
//! retries it every cycle through [`BridgeEngine::retry_stalled_unlocks`].
//! A lock is never reversed.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use alloy::sol_types::SolCall;
use dashmap::DashSet;

use crate::blockchain::{
    BlockchainError, CallRequest, ChainRegistry, ClientPool, ConfirmationWaiter, NonceAllocator,
    SubmitRequest, TransactionSubmitter,
};
use crate::bridge::contract::{decode_lock, release_digest, IBridge, IERC20};
use crate::bridge::store::TransferStore;
use crate::bridge::types::{
    BridgeError, BridgeResult, CrossTransfer, LockEvent, Page, ReconcileOutcome, TransferFilter,
    TransferKey, TransferLane, TransferPage, TransferStatus, TransferUpdate, UnlockEvent,
};
use crate::bridge::validator::ValidatorSigner;
use crate::config::BridgeConfig;
use crate::observability::metrics;

const LOCK_REVERTED: &str = "lock transaction reverted";

/// A user's request to move value between chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_address: Address,
    pub to_address: Address,
    /// Zero address for the native asset.
    pub token_address: Address,
    pub amount: U256,
}

/// A broadcast lock and the record that tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedTransfer {
    pub tx_hash: TxHash,
    pub nonce: u64,
    pub transfer: CrossTransfer,
}

/// Drives transfers through their lifecycle.
pub struct BridgeEngine {
    registry: Arc<ChainRegistry>,
    pool: Arc<ClientPool>,
    submitter: Arc<TransactionSubmitter>,
    waiter: ConfirmationWaiter,
    store: Arc<dyn TransferStore>,
    validator: Arc<dyn ValidatorSigner>,
    config: BridgeConfig,
    bridge_nonces: NonceAllocator<TransferLane>,
    releases_in_flight: DashSet<TransferKey>,
}

/// Held while a release is being signed and submitted.
struct ReleaseClaim<'a> {
    key: TransferKey,
    in_flight: &'a DashSet<TransferKey>,
}

impl Drop for ReleaseClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

impl BridgeEngine {
    pub fn new(
        submitter: Arc<TransactionSubmitter>,
        store: Arc<dyn TransferStore>,
        validator: Arc<dyn ValidatorSigner>,
        config: BridgeConfig,
    ) -> Self {
        let pool = submitter.pool().clone();
        let registry = pool.registry().clone();
        let poll_interval = Duration::from_millis(submitter.config().receipt_poll_interval_ms);
        Self {
            registry,
            waiter: ConfirmationWaiter::new(pool.clone(), poll_interval),
            pool,
            submitter,
            store,
            validator,
            config,
            bridge_nonces: NonceAllocator::new(),
            releases_in_flight: DashSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    fn bridge_address(&self, chain_id: u64) -> BridgeResult<Address> {
        self.registry
            .bridge_address(chain_id)
            .map_err(|e| BridgeError::Configuration(e.to_string()))
    }

    /// Lock `amount` on the source chain and record the transfer as `LockedPending`.
    ///
    /// Nothing is written unless the lock transaction was broadcast.
    pub async fn initiate_transfer(
        &self,
        request: TransferRequest,
    ) -> BridgeResult<InitiatedTransfer> {
        if request.amount.is_zero() {
            return Err(BridgeError::InvalidTransfer("amount must be greater than zero".into()));
        }
        if request.from_chain_id == request.to_chain_id {
            return Err(BridgeError::InvalidTransfer(format!(
                "source and destination are both chain {}",
                request.from_chain_id
            )));
        }
        let source_bridge = self.bridge_address(request.from_chain_id)?;
        self.bridge_address(request.to_chain_id)?;

        let native = request.token_address == Address::ZERO;
        if !native {
            self.approve(&request, source_bridge).await?;
        }

        let lane = TransferLane {
            from_chain_id: request.from_chain_id,
            to_chain_id: request.to_chain_id,
        };
        let floor = self.nonce_floor(lane, source_bridge).await?;
        let nonce = self.bridge_nonces.allocate(&lane, floor);

        let data = IBridge::lockCall {
            token: request.token_address,
            amount: request.amount,
            toChainId: U256::from(request.to_chain_id),
            toAddress: request.to_address,
            nonce: U256::from(nonce),
        }
        .abi_encode();
        let value = if native { request.amount } else { U256::ZERO };

        let submitted = self
            .submitter
            .submit(SubmitRequest::contract_call(
                request.from_chain_id,
                request.from_address,
                source_bridge,
                value,
                data.into(),
            ))
            .await;
        let (tx_hash, fee, error) = match submitted {
            Ok(submitted) => (submitted.tx_hash, submitted.call.max_network_fee(), None),
            // The lock may still land, so the nonce stays taken and the record is
            // kept for the watcher to confirm.
            Err(BlockchainError::BroadcastUncertain { tx_hash, nonce: account_nonce }) => {
                let reason = BlockchainError::BroadcastUncertain {
                    tx_hash,
                    nonce: account_nonce,
                }
                .to_string();
                tracing::warn!(
                    from_chain_id = lane.from_chain_id,
                    to_chain_id = lane.to_chain_id,
                    nonce,
                    tx_hash = %tx_hash,
                    "Lock broadcast uncertain"
                );
                (tx_hash, U256::ZERO, Some(reason))
            }
            Err(e) => {
                self.bridge_nonces.release(&lane, nonce);
                return Err(e.into());
            }
        };

        let record = CrossTransfer {
            id: 0,
            from_chain_id: request.from_chain_id,
            to_chain_id: request.to_chain_id,
            from_address: request.from_address,
            to_address: request.to_address,
            token_address: request.token_address,
            amount: request.amount,
            fee,
            nonce,
            from_hash: Some(tx_hash),
            to_hash: None,
            lock_block: None,
            unlock_block: None,
            status: TransferStatus::LockedPending,
            error,
            created_at: 0,
            updated_at: 0,
        };
        let transfer = match self.store.create_transfer(record).await {
            Ok(transfer) => transfer,
            Err(e) => {
                tracing::error!(
                    from_chain_id = request.from_chain_id,
                    to_chain_id = request.to_chain_id,
                    nonce,
                    tx_hash = %tx_hash,
                    error = %e,
                    "Lock broadcast but transfer record could not be stored"
                );
                return Err(BridgeError::LockNotRecorded {
                    tx_hash,
                    nonce,
                    reason: e.to_string(),
                });
            }
        };

        metrics::record_transfer_transition(TransferStatus::LockedPending.as_str());
        tracing::info!(
            key = %transfer.key(),
            tx_hash = %tx_hash,
            amount = %request.amount,
            token = %request.token_address,
            "Transfer locked"
        );

        Ok(InitiatedTransfer {
            tx_hash,
            nonce,
            transfer,
        })
    }

    async fn approve(&self, request: &TransferRequest, spender: Address) -> BridgeResult<()> {
        let data = IERC20::approveCall {
            spender,
            amount: request.amount,
        }
        .abi_encode();
        let approval = self
            .submitter
            .submit(SubmitRequest::contract_call(
                request.from_chain_id,
                request.from_address,
                request.token_address,
                U256::ZERO,
                data.into(),
            ))
            .await?;

        self.waiter
            .wait_for_success(
                request.from_chain_id,
                approval.tx_hash,
                Duration::from_secs(self.config.approval_timeout_secs),
            )
            .await?;
        tracing::info!(
            chain_id = request.from_chain_id,
            token = %request.token_address,
            tx_hash = %approval.tx_hash,
            "Token approval confirmed"
        );
        Ok(())
    }

    /// Lowest bridge nonce that is still unused on `lane`, per contract and store.
    async fn nonce_floor(&self, lane: TransferLane, bridge: Address) -> BridgeResult<u64> {
        let client = self.pool.get_client(lane.from_chain_id).await?;
        let raw = client
            .call(&CallRequest {
                from: None,
                to: bridge,
                value: U256::ZERO,
                data: IBridge::nonceCall {}.abi_encode().into(),
            })
            .await?;
        let on_chain = IBridge::nonceCall::abi_decode_returns(&raw)
            .map_err(|e| BridgeError::Decode(format!("nonce(): {}", e)))?;
        let on_chain = u64::try_from(on_chain)
            .map_err(|_| BridgeError::Decode(format!("nonce() out of range: {}", on_chain)))?;

        let stored_next = self
            .store
            .highest_nonce(lane)
            .await?
            .map_or(0, |n| n + 1);
        Ok(on_chain.max(stored_next))
    }

    /// Apply a `Lock` log observed on `chain_id`, then try to release.
    pub async fn reconcile_lock(
        &self,
        chain_id: u64,
        event: LockEvent,
    ) -> BridgeResult<ReconcileOutcome> {
        let key = TransferKey::new(chain_id, event.to_chain_id, event.nonce);
        let record = self
            .store
            .find_transfer(&key)
            .await?
            .ok_or(BridgeError::NotFound(key))?;

        if record.amount != event.amount {
            return Err(mismatch(key, "amount", record.amount, event.amount));
        }
        if record.token_address != event.token {
            return Err(mismatch(key, "token", record.token_address, event.token));
        }
        if record.to_address != event.to_address {
            return Err(mismatch(key, "recipient", record.to_address, event.to_address));
        }

        let mut confirmed_now = false;
        let record = match record.status {
            TransferStatus::LockedPending => {
                let update = TransferUpdate::advance(TransferStatus::LockedConfirmed)
                    .with_from_hash(event.tx_hash)
                    .with_lock_block(event.block_number);
                match self
                    .store
                    .update_transfer(&key, TransferStatus::LockedPending, update)
                    .await
                {
                    Ok(updated) => {
                        confirmed_now = true;
                        metrics::record_transfer_transition(
                            TransferStatus::LockedConfirmed.as_str(),
                        );
                        tracing::info!(key = %key, block = event.block_number, "Lock confirmed");
                        updated
                    }
                    Err(BridgeError::StatusConflict { .. }) => self
                        .store
                        .find_transfer(&key)
                        .await?
                        .ok_or(BridgeError::NotFound(key))?,
                    Err(e) => return Err(e),
                }
            }
            _ => record,
        };

        if record.status != TransferStatus::LockedConfirmed {
            return Ok(ReconcileOutcome::AlreadyReconciled);
        }

        match self.release(&key).await? {
            ReconcileOutcome::AlreadyReconciled if confirmed_now => {
                Ok(ReconcileOutcome::Advanced(TransferStatus::LockedConfirmed))
            }
            outcome => Ok(outcome),
        }
    }

    /// Sign and submit the destination-chain unlock for a `LockedConfirmed` record.
    async fn release(&self, key: &TransferKey) -> BridgeResult<ReconcileOutcome> {
        let Some(_claim) = self.claim_release(*key) else {
            tracing::debug!(key = %key, "Release already in flight");
            return Ok(ReconcileOutcome::AlreadyReconciled);
        };

        // Re-read under the claim: another path may have released it already.
        let record = self
            .store
            .find_transfer(key)
            .await?
            .ok_or(BridgeError::NotFound(*key))?;
        if record.status != TransferStatus::LockedConfirmed {
            return Ok(ReconcileOutcome::AlreadyReconciled);
        }

        let tx_hash = match self.submit_unlock(&record).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(key = %key, error = %reason, "Release deferred");
                if let Err(store_err) = self
                    .store
                    .update_transfer(
                        key,
                        TransferStatus::LockedConfirmed,
                        TransferUpdate::failure(reason.clone()),
                    )
                    .await
                {
                    tracing::warn!(key = %key, error = %store_err, "Could not record release failure");
                }
                return Ok(ReconcileOutcome::Deferred(reason));
            }
        };

        let update =
            TransferUpdate::advance(TransferStatus::UnlockedPending).with_to_hash(Some(tx_hash));
        match self
            .store
            .update_transfer(key, TransferStatus::LockedConfirmed, update)
            .await
        {
            Ok(_) => {
                metrics::record_transfer_transition(TransferStatus::UnlockedPending.as_str());
                tracing::info!(key = %key, tx_hash = %tx_hash, "Unlock submitted");
                Ok(ReconcileOutcome::Advanced(TransferStatus::UnlockedPending))
            }
            // The Unlock event won the race and already completed the record.
            Err(BridgeError::StatusConflict { .. }) => Ok(ReconcileOutcome::AlreadyReconciled),
            Err(e) => Err(e),
        }
    }

    async fn submit_unlock(&self, record: &CrossTransfer) -> BridgeResult<TxHash> {
        let destination_bridge = self.bridge_address(record.to_chain_id)?;
        let digest = release_digest(
            record.token_address,
            record.amount,
            record.to_address,
            record.from_chain_id,
            record.nonce,
        );
        let signature = self.validator.sign_release(digest).await?;

        let data = IBridge::unlockCall {
            token: record.token_address,
            amount: record.amount,
            to: record.to_address,
            fromChainId: U256::from(record.from_chain_id),
            nonce: U256::from(record.nonce),
            signature,
        }
        .abi_encode();

        let submitted = self
            .submitter
            .submit(SubmitRequest::contract_call(
                record.to_chain_id,
                self.config.relayer_address,
                destination_bridge,
                U256::ZERO,
                data.into(),
            ))
            .await?;
        Ok(submitted.tx_hash)
    }

    fn claim_release(&self, key: TransferKey) -> Option<ReleaseClaim<'_>> {
        if !self.releases_in_flight.insert(key) {
            return None;
        }
        Some(ReleaseClaim {
            key,
            in_flight: &self.releases_in_flight,
        })
    }

    /// Apply an `Unlock` log observed on destination `chain_id`.
    pub async fn reconcile_unlock(
        &self,
        chain_id: u64,
        event: UnlockEvent,
    ) -> BridgeResult<ReconcileOutcome> {
        let key = TransferKey::new(event.from_chain_id, chain_id, event.nonce);

        loop {
            let record = self
                .store
                .find_transfer(&key)
                .await?
                .ok_or(BridgeError::NotFound(key))?;

            if record.amount != event.amount {
                return Err(mismatch(key, "amount", record.amount, event.amount));
            }
            if record.to_address != event.to {
                return Err(mismatch(key, "recipient", record.to_address, event.to));
            }
            if record.status == TransferStatus::Completed {
                return Ok(ReconcileOutcome::AlreadyReconciled);
            }

            let to_hash = record.to_hash.is_none().then_some(event.tx_hash);
            let update = TransferUpdate::advance(TransferStatus::Completed)
                .with_to_hash(to_hash)
                .with_unlock_block(event.block_number);

            match self.store.update_transfer(&key, record.status, update).await {
                Ok(_) => {
                    metrics::record_transfer_transition(TransferStatus::Completed.as_str());
                    tracing::info!(key = %key, block = event.block_number, "Transfer completed");
                    return Ok(ReconcileOutcome::Advanced(TransferStatus::Completed));
                }
                // Moved under us (e.g. release just landed); re-read and retry.
                Err(BridgeError::StatusConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Re-attempt release for every `LockedConfirmed` transfer leaving `chain_id`.
    ///
    /// Returns how many releases were submitted.
    pub async fn retry_stalled_unlocks(&self, chain_id: u64) -> BridgeResult<usize> {
        let stalled = self
            .store
            .transfers_in_status(chain_id, TransferStatus::LockedConfirmed)
            .await?;

        let mut released = 0;
        for record in stalled {
            if let ReconcileOutcome::Advanced(_) = self.release(&record.key()).await? {
                released += 1;
            }
        }
        if released > 0 {
            tracing::info!(chain_id, released, "Retried stalled unlocks");
        }
        Ok(released)
    }

    /// Confirm `LockedPending` records on `chain_id` whose lock was mined at or
    /// below `scanned_to`.
    ///
    /// The scan skips a `Lock` log whose record was written after the watcher
    /// passed its block. The stored lock hash leads back to that log.
    /// Returns how many records left `LockedPending`.
    pub async fn recover_missed_locks(&self, chain_id: u64, scanned_to: u64) -> BridgeResult<usize> {
        let pending = self
            .store
            .transfers_in_status(chain_id, TransferStatus::LockedPending)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }
        let bridge = self.bridge_address(chain_id)?;
        let client = self.pool.get_client(chain_id).await?;

        let mut recovered = 0;
        for record in pending {
            let key = record.key();
            let Some(lock_hash) = record.from_hash else {
                continue;
            };
            let Some(receipt) = client.transaction_receipt(lock_hash).await? else {
                continue;
            };
            let Some(block) = receipt.block_number.filter(|b| *b <= scanned_to) else {
                continue;
            };

            if !receipt.success {
                if record.error.as_deref() != Some(LOCK_REVERTED) {
                    tracing::warn!(key = %key, tx_hash = %lock_hash, block, "Lock transaction reverted");
                    self.store
                        .update_transfer(
                            &key,
                            TransferStatus::LockedPending,
                            TransferUpdate::failure(LOCK_REVERTED),
                        )
                        .await?;
                }
                continue;
            }

            let logs = client.logs(bridge, block, block).await?;
            let event = logs
                .iter()
                .filter(|log| log.transaction_hash == Some(lock_hash))
                .filter_map(|log| decode_lock(log).ok())
                .find(|event| event.to_chain_id == key.to_chain_id && event.nonce == key.nonce);
            let Some(event) = event else {
                tracing::warn!(key = %key, tx_hash = %lock_hash, block, "Mined lock has no matching Lock event");
                continue;
            };

            match self.reconcile_lock(chain_id, event).await {
                Ok(ReconcileOutcome::AlreadyReconciled) => {}
                Ok(_) => {
                    recovered += 1;
                    tracing::info!(key = %key, block, "Recovered lock missed by the scan");
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => tracing::warn!(key = %key, error = %e, "Could not recover lock"),
            }
        }
        Ok(recovered)
    }

    /// Newest first; `page` is 1-based and `page_size` is clamped to `1..=100`.
    pub async fn list_transfers(
        &self,
        filter: &TransferFilter,
        page: usize,
        page_size: usize,
    ) -> BridgeResult<TransferPage> {
        self.store
            .list_transfers(filter, Page::new(page, page_size))
            .await
    }
}

fn mismatch(
    key: TransferKey,
    field: &str,
    stored: impl std::fmt::Display,
    observed: impl std::fmt::Display,
) -> BridgeError {
    BridgeError::EventMismatch {
        key,
        reason: format!("{} is {} on record but {} in event", field, stored, observed),
    }
}
