//! Release authorization.
//!
//! The validator key is a separate trust boundary: the engine only ever hands
//! it a digest and receives a signature back.

use alloy::primitives::{Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;

use crate::bridge::types::{BridgeError, BridgeResult};

/// Environment variable holding the validator private key.
pub const VALIDATOR_KEY_ENV_VAR: &str = "BRIDGE_VALIDATOR_PRIVATE_KEY";

/// Signs release digests for the destination-chain `unlock` call.
#[async_trait]
pub trait ValidatorSigner: Send + Sync {
    /// 65-byte `r || s || v` signature over `digest`.
    async fn sign_release(&self, digest: B256) -> BridgeResult<Bytes>;
}

/// Validator backed by a key held in this process.
pub struct LocalValidator {
    signer: PrivateKeySigner,
}

impl LocalValidator {
    pub fn from_private_key(private_key_hex: &str) -> BridgeResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BridgeError::Authorization(format!("invalid validator key: {}", e)))?;
        Ok(Self { signer })
    }

    pub fn from_env() -> BridgeResult<Self> {
        let key = std::env::var(VALIDATOR_KEY_ENV_VAR).map_err(|_| {
            BridgeError::Authorization(format!("{} is not set", VALIDATOR_KEY_ENV_VAR))
        })?;
        let validator = Self::from_private_key(&key)?;
        tracing::info!(validator = %validator.address(), "Validator key loaded");
        Ok(validator)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

#[async_trait]
impl ValidatorSigner for LocalValidator {
    async fn sign_release(&self, digest: B256) -> BridgeResult<Bytes> {
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| BridgeError::Authorization(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

impl std::fmt::Debug for LocalValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalValidator")
            .field("address", &self.address())
            .finish()
    }
}

/// Stand-in when no validator key is configured; every release is refused
/// and transfers wait in `LockedConfirmed` until a key is provided.
#[derive(Debug, Default)]
pub struct UnavailableValidator;

#[async_trait]
impl ValidatorSigner for UnavailableValidator {
    async fn sign_release(&self, _digest: B256) -> BridgeResult<Bytes> {
        Err(BridgeError::Authorization(format!(
            "no validator key configured ({})",
            VALIDATOR_KEY_ENV_VAR
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, Signature};

    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn test_signature_recovers_validator() {
        let validator = LocalValidator::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let digest = keccak256(b"release");

        let raw = validator.sign_release(digest).await.unwrap();
        assert_eq!(raw.len(), 65);

        let signature = Signature::try_from(raw.as_ref()).unwrap();
        let recovered = signature.recover_address_from_prehash(&digest).unwrap();
        assert_eq!(recovered, validator.address());
    }

    #[test]
    fn test_invalid_key() {
        let err = LocalValidator::from_private_key("zz").unwrap_err();
        assert!(matches!(err, BridgeError::Authorization(_)));
    }

    #[test]
    fn test_debug_hides_key() {
        let validator = LocalValidator::from_private_key(TEST_PRIVATE_KEY).unwrap();
        assert!(!format!("{:?}", validator).contains(TEST_PRIVATE_KEY));
    }

    #[tokio::test]
    async fn test_unavailable_validator_refuses() {
        let err = UnavailableValidator
            .sign_release(B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Authorization(_)));
    }
}
