//! Receipt polling for submitted transactions.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::TxHash;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::blockchain::pool::ClientPool;
use crate::blockchain::types::{BlockchainError, BlockchainResult, TxReceipt};

/// Polls a chain until a transaction's receipt appears or a deadline passes.
pub struct ConfirmationWaiter {
    pool: Arc<ClientPool>,
    poll_interval: Duration,
}

impl ConfirmationWaiter {
    pub fn new(pool: Arc<ClientPool>, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    /// Wait for the receipt of `tx_hash`, reverted or not.
    ///
    /// An unknown or unmined transaction keeps polling; any RPC error aborts.
    /// Expiry returns `ConfirmationTimeout` and leaves the transaction alone.
    pub async fn wait_for_receipt(
        &self,
        chain_id: u64,
        tx_hash: TxHash,
        deadline: Duration,
    ) -> BlockchainResult<TxReceipt> {
        let client = self.pool.get_client(chain_id).await?;

        let result = timeout(deadline, async {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match client.transaction_receipt(tx_hash).await? {
                    Some(receipt) => return Ok(receipt),
                    None => {
                        tracing::debug!(chain_id, tx_hash = %tx_hash, "Transaction pending");
                    }
                }
            }
        })
        .await;

        match result {
            Ok(receipt) => receipt,
            Err(_) => {
                tracing::warn!(
                    chain_id,
                    tx_hash = %tx_hash,
                    waited_secs = deadline.as_secs(),
                    "Gave up waiting for receipt"
                );
                Err(BlockchainError::ConfirmationTimeout {
                    tx_hash,
                    waited_secs: deadline.as_secs(),
                })
            }
        }
    }

    /// Like [`wait_for_receipt`](Self::wait_for_receipt), but a reverted receipt is an error.
    pub async fn wait_for_success(
        &self,
        chain_id: u64,
        tx_hash: TxHash,
        deadline: Duration,
    ) -> BlockchainResult<TxReceipt> {
        let receipt = self.wait_for_receipt(chain_id, tx_hash, deadline).await?;
        if !receipt.success {
            return Err(BlockchainError::Reverted(tx_hash));
        }
        Ok(receipt)
    }
}
