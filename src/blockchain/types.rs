//! Chain-facing types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// No configured RPC endpoint could be reached for the chain.
    #[error("no reachable RPC endpoint for chain {chain_id}: {reason}")]
    Connectivity { chain_id: u64, reason: String },

    /// Unknown chain, disabled chain or missing bridge contract.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Gas estimation failed, usually because the call would revert.
    #[error("gas estimation failed: {0}")]
    Estimation(String),

    /// The node rejected the signed transaction (nonce too low, underpriced, funds).
    #[error("broadcast rejected: {0}")]
    Broadcast(String),

    /// The broadcast timed out; the node may or may not have accepted it.
    ///
    /// The nonce stays reserved. `tx_hash` is computed locally from the signed bytes.
    #[error("broadcast of {tx_hash} (nonce {nonce}) timed out; it may still be mined")]
    BroadcastUncertain { tx_hash: TxHash, nonce: u64 },

    /// No keypair is held for the sending address.
    #[error("account not found: {0}")]
    AccountNotFound(Address),

    /// Replacement requested for a transaction that is already mined.
    #[error("transaction {0} is already confirmed")]
    AlreadyConfirmed(TxHash),

    /// The node does not know the transaction.
    #[error("transaction {0} not found")]
    NotFound(TxHash),

    /// No receipt appeared before the caller's deadline.
    #[error("no receipt for {tx_hash} after {waited_secs} seconds")]
    ConfirmationTimeout { tx_hash: TxHash, waited_secs: u64 },

    /// Transaction was mined but reverted.
    #[error("transaction reverted: {0}")]
    Reverted(TxHash),

    /// Gas price exceeded maximum allowed.
    #[error("gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Any other RPC failure.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Invalid private key format or signing failure.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// The transaction cannot be rebuilt (e.g. contract creation).
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
}

impl BlockchainError {
    /// Whether the failure is transient and a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BlockchainError::Connectivity { .. }
                | BlockchainError::Rpc(_)
                | BlockchainError::Timeout(_)
        )
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// An in-flight transaction attempt.
///
/// Lives for one submit call. A replacement produces a new `PendingCall`
/// with the same nonce rather than mutating the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCall {
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    pub fee_per_gas: u128,
    pub gas_limit: u64,
}

impl PendingCall {
    /// Upper bound of the network fee this call can spend.
    pub fn max_network_fee(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.fee_per_gas)
    }
}

/// Parameters for a simulated call (`eth_estimateGas`, `eth_call`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// A transaction as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    /// Legacy gas price, or max fee per gas for EIP-1559 transactions.
    pub fee_per_gas: u128,
    pub gas_limit: u64,
    /// `None` while pending.
    pub block_number: Option<u64>,
}

impl ChainTransaction {
    pub fn is_pending(&self) -> bool {
        self.block_number.is_none()
    }
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
    pub gas_used: u64,
}
