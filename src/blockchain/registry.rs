//! Chain registry: administered metadata per chain.
//!
//! Reads take a lock-free snapshot; administrative updates swap the whole map.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use arc_swap::ArcSwap;

use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::config::schema::{ChainConfig, ChainStatus};

/// Registry of chains the engine may talk to.
pub struct ChainRegistry {
    chains: ArcSwap<HashMap<u64, ChainConfig>>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainConfig>) -> Self {
        Self {
            chains: ArcSwap::from_pointee(index(chains)),
        }
    }

    /// Look up an active chain.
    pub fn get(&self, chain_id: u64) -> BlockchainResult<ChainConfig> {
        let snapshot = self.chains.load();
        let chain = snapshot.get(&chain_id).ok_or_else(|| {
            BlockchainError::Configuration(format!("unknown chain {}", chain_id))
        })?;
        if !chain.is_active() {
            return Err(BlockchainError::Configuration(format!(
                "chain {} is disabled",
                chain_id
            )));
        }
        Ok(chain.clone())
    }

    /// Bridge contract address of an active chain.
    pub fn bridge_address(&self, chain_id: u64) -> BlockchainResult<Address> {
        self.get(chain_id)?.bridge_address.ok_or_else(|| {
            BlockchainError::Configuration(format!(
                "bridge contract not configured on chain {}",
                chain_id
            ))
        })
    }

    /// Active chains with a bridge contract, ordered by chain id.
    pub fn bridge_chains(&self) -> Vec<ChainConfig> {
        let mut chains: Vec<ChainConfig> = self
            .chains
            .load()
            .values()
            .filter(|c| c.is_active() && c.bridge_address.is_some())
            .cloned()
            .collect();
        chains.sort_by_key(|c| c.chain_id);
        chains
    }

    /// All registered chains, including disabled ones.
    pub fn all(&self) -> Vec<ChainConfig> {
        let mut chains: Vec<ChainConfig> = self.chains.load().values().cloned().collect();
        chains.sort_by_key(|c| c.chain_id);
        chains
    }

    /// Insert or replace one chain.
    pub fn upsert(&self, chain: ChainConfig) {
        self.chains.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(chain.chain_id, chain.clone());
            next
        });
        tracing::info!(chain_id = chain.chain_id, "Chain registry entry updated");
    }

    /// Change the status of a registered chain.
    pub fn set_status(&self, chain_id: u64, status: ChainStatus) -> BlockchainResult<()> {
        if !self.chains.load().contains_key(&chain_id) {
            return Err(BlockchainError::Configuration(format!(
                "unknown chain {}",
                chain_id
            )));
        }
        self.chains.rcu(|current| {
            let mut next = HashMap::clone(current);
            if let Some(chain) = next.get_mut(&chain_id) {
                chain.status = status;
            }
            next
        });
        tracing::info!(chain_id, status = ?status, "Chain status changed");
        Ok(())
    }

    /// Replace the whole chain list (config reload).
    pub fn replace_all(&self, chains: Vec<ChainConfig>) {
        let count = chains.len();
        self.chains.store(Arc::new(index(chains)));
        tracing::info!(chains = count, "Chain registry reloaded");
    }
}

fn index(chains: Vec<ChainConfig>) -> HashMap<u64, ChainConfig> {
    chains.into_iter().map(|c| (c.chain_id, c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(chain_id: u64, bridge: Option<Address>) -> ChainConfig {
        ChainConfig {
            chain_id,
            name: format!("chain-{}", chain_id),
            symbol: "ETH".into(),
            decimals: 18,
            explorer_url: String::new(),
            rpc_urls: vec!["http://localhost:8545".into()],
            bridge_address: bridge,
            deploy_height: 0,
            status: ChainStatus::Active,
        }
    }

    #[test]
    fn test_lookup_and_bridge_address() {
        let bridge = Address::repeat_byte(0x11);
        let registry = ChainRegistry::new(vec![chain(1, Some(bridge)), chain(56, None)]);

        assert_eq!(registry.get(1).unwrap().chain_id, 1);
        assert_eq!(registry.bridge_address(1).unwrap(), bridge);
        assert!(matches!(
            registry.bridge_address(56),
            Err(BlockchainError::Configuration(_))
        ));
        assert!(matches!(registry.get(999), Err(BlockchainError::Configuration(_))));
    }

    #[test]
    fn test_disabled_chain_is_rejected() {
        let registry = ChainRegistry::new(vec![chain(1, Some(Address::ZERO))]);
        registry.set_status(1, ChainStatus::Disabled).unwrap();
        assert!(registry.get(1).is_err());
        assert!(registry.bridge_chains().is_empty());
        assert_eq!(registry.all().len(), 1);

        registry.set_status(1, ChainStatus::Active).unwrap();
        assert!(registry.get(1).is_ok());
        assert!(registry.set_status(2, ChainStatus::Active).is_err());
    }

    #[test]
    fn test_bridge_chains_sorted() {
        let registry = ChainRegistry::new(vec![
            chain(56, Some(Address::repeat_byte(2))),
            chain(10, None),
            chain(1, Some(Address::repeat_byte(1))),
        ]);
        let ids: Vec<u64> = registry.bridge_chains().iter().map(|c| c.chain_id).collect();
        assert_eq!(ids, vec![1, 56]);
    }

    #[test]
    fn test_upsert_and_replace() {
        let registry = ChainRegistry::new(vec![chain(1, None)]);
        registry.upsert(chain(1, Some(Address::repeat_byte(7))));
        assert_eq!(registry.bridge_address(1).unwrap(), Address::repeat_byte(7));

        registry.replace_all(vec![chain(137, None)]);
        assert!(registry.get(1).is_err());
        assert!(registry.get(137).is_ok());
    }
}
