//! Transaction signing capability and a local keystore implementation.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized
//! - Callers only ever see addresses and signed bytes

use std::collections::HashMap;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::blockchain::types::{BlockchainError, BlockchainResult, PendingCall};

/// Environment variable holding comma-separated account private keys.
pub const ACCOUNT_KEYS_ENV_VAR: &str = "BRIDGE_ACCOUNT_KEYS";

/// Signs raw transactions for accounts held by the wallet subsystem.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Whether a keypair exists for `address`.
    fn has_account(&self, address: Address) -> bool;

    /// Sign `call` with the key of `call.from`, returning EIP-2718 encoded bytes.
    async fn sign_transaction(&self, call: &PendingCall) -> BlockchainResult<Bytes>;
}

/// In-process keystore backed by alloy local signers.
#[derive(Default)]
pub struct Keystore {
    signers: HashMap<Address, PrivateKeySigner>,
}

impl Keystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hex-encoded private key (with or without 0x prefix). Returns its address.
    ///
    /// # Security
    /// The private key is parsed and stored in memory. It is never logged.
    pub fn add_private_key(&mut self, private_key_hex: &str) -> BlockchainResult<Address> {
        let key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;

        let address = signer.address();
        self.signers.insert(address, signer);
        tracing::info!(address = %address, "Account loaded into keystore");
        Ok(address)
    }

    /// Build a keystore from a comma-separated key list.
    pub fn from_key_list(keys: &str) -> BlockchainResult<Self> {
        let mut keystore = Self::new();
        for key in keys.split(',').filter(|k| !k.trim().is_empty()) {
            keystore.add_private_key(key)?;
        }
        Ok(keystore)
    }

    /// Load accounts from `BRIDGE_ACCOUNT_KEYS`. An unset variable yields an empty keystore.
    pub fn from_env() -> BlockchainResult<Self> {
        match std::env::var(ACCOUNT_KEYS_ENV_VAR) {
            Ok(keys) => Self::from_key_list(&keys),
            Err(_) => {
                tracing::warn!(
                    env_var = ACCOUNT_KEYS_ENV_VAR,
                    "No account keys configured; submissions will fail with account not found"
                );
                Ok(Self::new())
            }
        }
    }

    /// Addresses held by this keystore.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.signers.keys().copied().collect();
        addresses.sort();
        addresses
    }
}

#[async_trait]
impl TransactionSigner for Keystore {
    fn has_account(&self, address: Address) -> bool {
        self.signers.contains_key(&address)
    }

    async fn sign_transaction(&self, call: &PendingCall) -> BlockchainResult<Bytes> {
        let signer = self
            .signers
            .get(&call.from)
            .ok_or(BlockchainError::AccountNotFound(call.from))?;
        let wallet = EthereumWallet::from(signer.clone());

        let request = TransactionRequest::default()
            .with_from(call.from)
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone())
            .with_nonce(call.nonce)
            .with_gas_limit(call.gas_limit)
            .with_gas_price(call.fee_per_gas)
            .with_chain_id(call.chain_id);

        let envelope = request
            .build(&wallet)
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Signing failed: {}", e)))?;

        Ok(Bytes::from(envelope.encoded_2718()))
    }
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("accounts", &self.addresses())
            .finish()
    }
}
