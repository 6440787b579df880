//! Transaction building, signing, broadcast and fee replacement.
//!
//! # Responsibilities
//! - Price and size transactions (suggested gas price, estimated gas limit)
//! - Allocate chain nonces without ever handing one out twice
//! - Sign and broadcast; no confirmation wait
//! - Speed up or cancel a pending transaction by reusing its nonce

use std::sync::Arc;

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};

use crate::blockchain::client::ChainRpc;
use crate::blockchain::nonce::NonceAllocator;
use crate::blockchain::pool::ClientPool;
use crate::blockchain::types::{
    BlockchainError, BlockchainResult, CallRequest, ChainTransaction, PendingCall,
};
use crate::blockchain::wallet::TransactionSigner;
use crate::config::TransactionConfig;
use crate::observability::metrics;

/// Gas used by a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

const WEI_PER_GWEI: u128 = 1_000_000_000;

const BPS_DENOMINATOR: u128 = 10_000;

/// A transaction to build, sign and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Overrides the suggested gas price.
    pub fee_per_gas: Option<u128>,
    /// Overrides gas estimation.
    pub gas_limit: Option<u64>,
}

impl SubmitRequest {
    /// Value transfer with network-suggested pricing.
    pub fn transfer(chain_id: u64, from: Address, to: Address, value: U256) -> Self {
        Self {
            chain_id,
            from,
            to,
            value,
            data: Bytes::new(),
            fee_per_gas: None,
            gas_limit: None,
        }
    }

    /// Contract call with network-suggested pricing.
    pub fn contract_call(chain_id: u64, from: Address, to: Address, value: U256, data: Bytes) -> Self {
        Self {
            chain_id,
            from,
            to,
            value,
            data,
            fee_per_gas: None,
            gas_limit: None,
        }
    }
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub tx_hash: TxHash,
    pub call: PendingCall,
}

/// Builds, signs and broadcasts transactions for accounts held by the signer.
pub struct TransactionSubmitter {
    pool: Arc<ClientPool>,
    signer: Arc<dyn TransactionSigner>,
    nonces: NonceAllocator<(u64, Address)>,
    config: TransactionConfig,
}

impl TransactionSubmitter {
    pub fn new(
        pool: Arc<ClientPool>,
        signer: Arc<dyn TransactionSigner>,
        config: TransactionConfig,
    ) -> Self {
        Self {
            pool,
            signer,
            nonces: NonceAllocator::new(),
            config,
        }
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Build, sign and broadcast `request`. Returns once the node accepted it.
    pub async fn submit(&self, request: SubmitRequest) -> BlockchainResult<Submitted> {
        let chain_id = request.chain_id;
        if !self.signer.has_account(request.from) {
            return Err(BlockchainError::AccountNotFound(request.from));
        }

        let client = self.pool.get_client(chain_id).await?;

        let fee_per_gas = match request.fee_per_gas {
            Some(fee) => fee,
            None => {
                let suggested = client.gas_price().await?;
                apply_bps(suggested, self.config.gas_price_multiplier_bps).ok_or_else(|| {
                    BlockchainError::InvalidTransaction(format!(
                        "gas price {} overflows after multiplier",
                        suggested
                    ))
                })?
            }
        };
        self.check_fee_cap(fee_per_gas)?;

        // Estimation precedes nonce allocation so a reverting call burns no nonce.
        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => {
                let estimated = client
                    .estimate_gas(&CallRequest {
                        from: Some(request.from),
                        to: request.to,
                        value: request.value,
                        data: request.data.clone(),
                    })
                    .await?;
                apply_bps(estimated as u128, self.config.gas_limit_multiplier_bps)
                    .and_then(|limit| u64::try_from(limit).ok())
                    .ok_or_else(|| {
                        BlockchainError::Estimation(format!(
                            "gas limit {} overflows after multiplier",
                            estimated
                        ))
                    })?
            }
        };

        let chain_pending = client.pending_transaction_count(request.from).await?;
        let key = (chain_id, request.from);
        let nonce = self.nonces.allocate(&key, chain_pending);

        let call = PendingCall {
            chain_id,
            from: request.from,
            to: request.to,
            value: request.value,
            data: request.data,
            nonce,
            fee_per_gas,
            gas_limit,
        };

        match self.sign_and_send(client.as_ref(), &call).await {
            Ok(tx_hash) => {
                metrics::record_submission(chain_id, "ok");
                tracing::info!(
                    chain_id,
                    tx_hash = %tx_hash,
                    from = %call.from,
                    to = %call.to,
                    nonce,
                    fee_per_gas,
                    gas_limit,
                    "Transaction submitted"
                );
                Ok(Submitted { tx_hash, call })
            }
            Err(e @ BlockchainError::BroadcastUncertain { .. }) => {
                metrics::record_submission(chain_id, "uncertain");
                tracing::warn!(chain_id, from = %call.from, nonce, error = %e, "Broadcast outcome unknown, nonce kept");
                Err(e)
            }
            Err(e) => {
                self.nonces.release(&key, nonce);
                metrics::record_submission(chain_id, "rejected");
                tracing::warn!(chain_id, from = %call.from, nonce, error = %e, "Transaction submission failed");
                Err(e)
            }
        }
    }

    /// Re-broadcast a pending transaction with a higher fee and the same nonce.
    pub async fn accelerate(&self, chain_id: u64, tx_hash: TxHash) -> BlockchainResult<Submitted> {
        let client = self.pool.get_client(chain_id).await?;
        let original = pending_original(client.as_ref(), tx_hash).await?;
        let to = original.to.ok_or_else(|| {
            BlockchainError::InvalidTransaction(format!(
                "{} creates a contract and cannot be re-sent",
                tx_hash
            ))
        })?;

        let call = PendingCall {
            chain_id,
            from: original.from,
            to,
            value: original.value,
            data: original.data.clone(),
            nonce: original.nonce,
            fee_per_gas: bump_fee(original.fee_per_gas, 3, 2),
            gas_limit: original.gas_limit,
        };
        self.replace(client.as_ref(), tx_hash, call, "accelerate").await
    }

    /// Replace a pending transaction with a zero-value self transfer at a higher fee.
    pub async fn cancel(&self, chain_id: u64, tx_hash: TxHash) -> BlockchainResult<Submitted> {
        let client = self.pool.get_client(chain_id).await?;
        let original = pending_original(client.as_ref(), tx_hash).await?;

        let call = PendingCall {
            chain_id,
            from: original.from,
            to: original.from,
            value: U256::ZERO,
            data: Bytes::new(),
            nonce: original.nonce,
            fee_per_gas: bump_fee(original.fee_per_gas, 2, 1),
            gas_limit: TRANSFER_GAS,
        };
        self.replace(client.as_ref(), tx_hash, call, "cancel").await
    }

    async fn replace(
        &self,
        client: &dyn ChainRpc,
        replaced: TxHash,
        call: PendingCall,
        kind: &'static str,
    ) -> BlockchainResult<Submitted> {
        if !self.signer.has_account(call.from) {
            return Err(BlockchainError::AccountNotFound(call.from));
        }
        self.check_fee_cap(call.fee_per_gas)?;

        let tx_hash = self.sign_and_send(client, &call).await?;
        metrics::record_replacement(call.chain_id, kind);
        tracing::info!(
            chain_id = call.chain_id,
            replaced = %replaced,
            tx_hash = %tx_hash,
            nonce = call.nonce,
            fee_per_gas = call.fee_per_gas,
            kind,
            "Replacement transaction submitted"
        );
        Ok(Submitted { tx_hash, call })
    }

    /// A client-side timeout is reported as `BroadcastUncertain`, never as a rejection.
    async fn sign_and_send(&self, client: &dyn ChainRpc, call: &PendingCall) -> BlockchainResult<TxHash> {
        let raw = self.signer.sign_transaction(call).await?;
        let tx_hash = keccak256(&raw);
        match client.send_raw_transaction(raw).await {
            Err(BlockchainError::Timeout(_)) => Err(BlockchainError::BroadcastUncertain {
                tx_hash,
                nonce: call.nonce,
            }),
            result => result,
        }
    }

    fn check_fee_cap(&self, fee_per_gas: u128) -> BlockchainResult<()> {
        let max_wei = self.config.max_gas_price_gwei as u128 * WEI_PER_GWEI;
        if fee_per_gas > max_wei {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: (fee_per_gas / WEI_PER_GWEI) as u64,
                max_gwei: self.config.max_gas_price_gwei,
            });
        }
        Ok(())
    }
}

async fn pending_original(client: &dyn ChainRpc, tx_hash: TxHash) -> BlockchainResult<ChainTransaction> {
    let original = client
        .transaction_by_hash(tx_hash)
        .await?
        .ok_or(BlockchainError::NotFound(tx_hash))?;
    if !original.is_pending() {
        return Err(BlockchainError::AlreadyConfirmed(tx_hash));
    }
    Ok(original)
}

/// `max(fee * num / den, fee + 1)`: a replacement must strictly outbid the original.
pub fn bump_fee(fee: u128, num: u128, den: u128) -> u128 {
    (fee.saturating_mul(num) / den).max(fee.saturating_add(1))
}

/// `ceil(value * bps / 10000)`, or `None` on overflow.
fn apply_bps(value: u128, bps: u64) -> Option<u128> {
    value
        .checked_mul(bps as u128)
        .map(|scaled| scaled.div_ceil(BPS_DENOMINATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accelerate_fee_bump() {
        assert_eq!(bump_fee(20_000_000_000, 3, 2), 30_000_000_000);
        // Tiny fees still strictly increase.
        assert_eq!(bump_fee(1, 3, 2), 2);
        assert_eq!(bump_fee(0, 3, 2), 1);
    }

    #[test]
    fn test_cancel_fee_bump() {
        assert_eq!(bump_fee(20_000_000_000, 2, 1), 40_000_000_000);
        assert_eq!(bump_fee(0, 2, 1), 1);
        assert_eq!(bump_fee(u128::MAX, 2, 1), u128::MAX);
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(100_000, 12_000), Some(120_000));
        assert_eq!(apply_bps(21_000, 10_000), Some(21_000));
        assert_eq!(apply_bps(10, 12_500), Some(13));
        assert_eq!(apply_bps(u128::MAX, 12_000), None);
        // Exact for values f64 cannot represent.
        assert_eq!(apply_bps(u64::MAX as u128, 10_000), Some(u64::MAX as u128));
    }

    #[test]
    fn test_submit_request_constructors() {
        let transfer = SubmitRequest::transfer(1, Address::ZERO, Address::repeat_byte(1), U256::from(5u64));
        assert!(transfer.data.is_empty());
        assert!(transfer.fee_per_gas.is_none());

        let call = SubmitRequest::contract_call(
            1,
            Address::ZERO,
            Address::repeat_byte(1),
            U256::ZERO,
            Bytes::from(vec![0xde, 0xad]),
        );
        assert_eq!(call.data.len(), 2);
    }
}
