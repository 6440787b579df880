//! Bridge and ERC-20 contract bindings.

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolValue;

use crate::bridge::types::{BridgeError, BridgeResult, LockEvent, UnlockEvent};

sol! {
    #[derive(Debug)]
    interface IBridge {
        function lock(address token, uint256 amount, uint256 toChainId, address toAddress, uint256 nonce) external payable;
        function unlock(address token, uint256 amount, address to, uint256 fromChainId, uint256 nonce, bytes signature) external;
        function nonce() external view returns (uint256);

        /// Emitted on the source chain when value is escrowed.
        event Lock(address token, address from, uint256 amount, uint256 toChainId, address toAddress, uint256 nonce);

        /// Emitted on the destination chain when value is released.
        event Unlock(address token, address to, uint256 amount, uint256 fromChainId, uint256 nonce);
    }

    #[derive(Debug)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// Message the validator signs to authorize a release:
/// `keccak256(abi.encodePacked(token, amount, to, sourceChainId, nonce))`.
pub fn release_digest(
    token: Address,
    amount: U256,
    to: Address,
    source_chain_id: u64,
    nonce: u64,
) -> B256 {
    keccak256(
        (
            token,
            amount,
            to,
            U256::from(source_chain_id),
            U256::from(nonce),
        )
            .abi_encode_packed(),
    )
}

fn small(value: U256, field: &str) -> BridgeResult<u64> {
    u64::try_from(value).map_err(|_| BridgeError::Decode(format!("{} out of range: {}", field, value)))
}

fn position(log: &Log) -> BridgeResult<(alloy::primitives::TxHash, u64, u64)> {
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| BridgeError::Decode("log without transaction hash".to_string()))?;
    let block_number = log
        .block_number
        .ok_or_else(|| BridgeError::Decode("log without block number".to_string()))?;
    Ok((tx_hash, block_number, log.log_index.unwrap_or_default()))
}

pub fn decode_lock(log: &Log) -> BridgeResult<LockEvent> {
    let decoded = log
        .log_decode::<IBridge::Lock>()
        .map_err(|e| BridgeError::Decode(format!("Lock: {}", e)))?;
    let event = decoded.inner.data;
    let (tx_hash, block_number, log_index) = position(log)?;

    Ok(LockEvent {
        token: event.token,
        from: event.from,
        amount: event.amount,
        to_chain_id: small(event.toChainId, "toChainId")?,
        to_address: event.toAddress,
        nonce: small(event.nonce, "nonce")?,
        tx_hash,
        block_number,
        log_index,
    })
}

pub fn decode_unlock(log: &Log) -> BridgeResult<UnlockEvent> {
    let decoded = log
        .log_decode::<IBridge::Unlock>()
        .map_err(|e| BridgeError::Decode(format!("Unlock: {}", e)))?;
    let event = decoded.inner.data;
    let (tx_hash, block_number, log_index) = position(log)?;

    Ok(UnlockEvent {
        token: event.token,
        to: event.to,
        amount: event.amount,
        from_chain_id: small(event.fromChainId, "fromChainId")?,
        nonce: small(event.nonce, "nonce")?,
        tx_hash,
        block_number,
        log_index,
    })
}
