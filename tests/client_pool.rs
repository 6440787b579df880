//! Client pool behavior against mock endpoints.

mod common;

use std::sync::Arc;
use std::time::Duration;

use crosschain_engine::blockchain::{BlockchainError, ChainRegistry, ClientPool};
use crosschain_engine::config::ChainStatus;

use common::{chain_config, MockChain, MockConnector};

fn pool_with(urls: &[&str]) -> (Arc<ClientPool>, Arc<MockConnector>) {
    let chain = MockChain::new(1);
    let connector = MockConnector::new(&[chain]);
    let registry = Arc::new(ChainRegistry::new(vec![chain_config(1, urls)]));
    let pool = Arc::new(ClientPool::new(registry, connector.clone()));
    (pool, connector)
}

#[tokio::test]
async fn test_cached_connection_is_reused() {
    let (pool, connector) = pool_with(&["http://a.test"]);

    let first = pool.get_client(1).await.unwrap();
    let second = pool.get_client(1).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn test_falls_through_to_next_url() {
    let (pool, connector) = pool_with(&["http://down.test", "http://up.test"]);
    connector.fail_url("http://down.test");

    let client = pool.get_client(1).await.unwrap();
    assert_eq!(client.endpoint(), "http://up.test");
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn test_all_urls_failing_is_not_cached() {
    let (pool, connector) = pool_with(&["http://a.test", "http://b.test"]);
    connector.fail_url("http://a.test");
    connector.fail_url("http://b.test");

    let err = pool.get_client(1).await.err().unwrap();
    assert!(matches!(err, BlockchainError::Connectivity { chain_id: 1, .. }));
    assert!(pool.is_empty());

    // The next call resolves again instead of replaying the failure.
    connector.heal_url("http://b.test");
    let client = pool.get_client(1).await.unwrap();
    assert_eq!(client.endpoint(), "http://b.test");
    assert_eq!(connector.attempts(), 4);
}

#[tokio::test]
async fn test_close_all_forces_fresh_connection() {
    let (pool, connector) = pool_with(&["http://a.test"]);
    let before = pool.get_client(1).await.unwrap();

    assert_eq!(pool.close_all(), 1);
    assert!(pool.is_empty());

    let after = pool.get_client(1).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn test_concurrent_first_use_stores_one_connection() {
    let (pool, connector) = pool_with(&["http://a.test"]);
    connector.set_delay(Duration::from_millis(50));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_client(1).await.unwrap() })
        })
        .collect();

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap());
    }

    assert_eq!(pool.len(), 1);
    let stored = pool.get_client(1).await.unwrap();
    assert!(clients.iter().all(|c| Arc::ptr_eq(c, &stored)));
}

#[tokio::test]
async fn test_unknown_and_disabled_chains_rejected() {
    let (pool, connector) = pool_with(&["http://a.test"]);

    let err = pool.get_client(999).await.err().unwrap();
    assert!(matches!(err, BlockchainError::Configuration(_)));

    pool.registry().set_status(1, ChainStatus::Disabled).unwrap();
    let err = pool.get_client(1).await.err().unwrap();
    assert!(matches!(err, BlockchainError::Configuration(_)));
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_evict_drops_single_chain() {
    let (pool, _connector) = pool_with(&["http://a.test"]);
    pool.get_client(1).await.unwrap();

    assert!(pool.evict(1));
    assert!(!pool.evict(1));
    assert!(pool.is_empty());
}
