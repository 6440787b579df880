//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is reported,
//! not just the first one.

use std::collections::HashSet;

use alloy::primitives::Address;
use thiserror::Error;

use crate::config::schema::EngineConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("chain {0} is declared more than once")]
    DuplicateChain(u64),

    #[error("chain {0} has no RPC endpoints")]
    NoRpcUrls(u64),

    #[error("chain {chain_id}: invalid RPC URL '{url}'")]
    InvalidRpcUrl { chain_id: u64, url: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be at least 10000 basis points, got {value}")]
    MultiplierBelowOne { field: &'static str, value: u64 },

    #[error("bridge.relayer_address must be set when a chain has a bridge contract")]
    MissingRelayer,

    #[error("store.path must be set when a chain has a bridge contract")]
    MissingStorePath,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for chain in &config.chains {
        if !seen.insert(chain.chain_id) {
            errors.push(ValidationError::DuplicateChain(chain.chain_id));
        }
        if chain.is_active() && chain.rpc_urls.is_empty() {
            errors.push(ValidationError::NoRpcUrls(chain.chain_id));
        }
        for url in &chain.rpc_urls {
            if url.parse::<url::Url>().is_err() {
                errors.push(ValidationError::InvalidRpcUrl {
                    chain_id: chain.chain_id,
                    url: url.clone(),
                });
            }
        }
    }

    if config.rpc.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "rpc.timeout_secs" });
    }
    if config.transactions.receipt_poll_interval_ms == 0 {
        errors.push(ValidationError::Zero {
            field: "transactions.receipt_poll_interval_ms",
        });
    }
    if config.watcher.poll_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "watcher.poll_interval_secs" });
    }
    if config.watcher.max_block_range == 0 {
        errors.push(ValidationError::Zero { field: "watcher.max_block_range" });
    }
    if config.transactions.gas_price_multiplier_bps < 10_000 {
        errors.push(ValidationError::MultiplierBelowOne {
            field: "transactions.gas_price_multiplier_bps",
            value: config.transactions.gas_price_multiplier_bps,
        });
    }
    if config.transactions.gas_limit_multiplier_bps < 10_000 {
        errors.push(ValidationError::MultiplierBelowOne {
            field: "transactions.gas_limit_multiplier_bps",
            value: config.transactions.gas_limit_multiplier_bps,
        });
    }

    // Transfers are started by one process and reconciled by another; both
    // must share the store file, and releases need a signing relayer.
    if config.chains.iter().any(|c| c.bridge_address.is_some()) {
        if config.bridge.relayer_address == Address::ZERO {
            errors.push(ValidationError::MissingRelayer);
        }
        if config.store.path.is_none() {
            errors.push(ValidationError::MissingStorePath);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ChainConfig, ChainStatus};

    fn chain(chain_id: u64, urls: &[&str]) -> ChainConfig {
        ChainConfig {
            chain_id,
            name: String::new(),
            symbol: String::new(),
            decimals: 18,
            explorer_url: String::new(),
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
            bridge_address: None,
            deploy_height: 0,
            status: ChainStatus::Active,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.chains.push(chain(1, &["http://localhost:8545"]));
        config.chains.push(chain(1, &["not a url"]));
        config.chains.push(chain(56, &[]));
        config.watcher.poll_interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateChain(1)));
        assert!(errors.contains(&ValidationError::NoRpcUrls(56)));
        assert!(errors.contains(&ValidationError::Zero {
            field: "watcher.poll_interval_secs"
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidRpcUrl { chain_id: 1, .. })));
    }

    #[test]
    fn test_bridge_chain_requires_relayer_and_store() {
        let mut config = EngineConfig::default();
        let mut bridged = chain(1, &["http://localhost:8545"]);
        bridged.bridge_address = Some(Address::repeat_byte(0x11));
        config.chains.push(bridged);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingRelayer));
        assert!(errors.contains(&ValidationError::MissingStorePath));

        config.bridge.relayer_address = Address::repeat_byte(0xc3);
        config.store.path = Some("transfers.json".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let mut config = EngineConfig::default();
        config.transactions.gas_limit_multiplier_bps = 9_000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MultiplierBelowOne {
                field: "transactions.gas_limit_multiplier_bps",
                value: 9_000
            }]
        );
    }

    #[test]
    fn test_disabled_chain_may_omit_urls() {
        let mut config = EngineConfig::default();
        let mut disabled = chain(137, &[]);
        disabled.status = ChainStatus::Disabled;
        config.chains.push(disabled);
        assert!(validate_config(&config).is_ok());
    }
}
