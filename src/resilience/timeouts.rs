//! Timeout enforcement for RPC round-trips.

use std::future::Future;
use std::time::Duration;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Run an RPC future under a deadline, mapping expiry to `BlockchainError::Timeout`.
pub async fn with_timeout<T, F>(duration: Duration, fut: F) -> BlockchainResult<T>
where
    F: Future<Output = BlockchainResult<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(BlockchainError::Timeout(duration.as_secs())),
    }
}
