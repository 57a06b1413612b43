//! Integration tests for the pass-through strategy
//!
//! Negative caching, round-trips, and the order lookup scenario.

mod common;

use common::{Order, call_counter, count_of, fast_config, memory_client};
use guarded_cache::{CacheError, CacheStore};
use std::sync::atomic::Ordering;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(600);

#[tokio::test]
async fn confirmed_absence_is_cached_and_loader_not_recalled() {
    let (client, _store) = memory_client(fast_config());
    let calls = call_counter();

    let first: Option<Order> = client
        .get("user:", "missing", TTL, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await
        .unwrap();
    assert_eq!(first, None);
    assert_eq!(count_of(&calls), 1);

    // Second lookup within the negative TTL hits the marker; the loader
    // must not run again.
    let second: Option<Order> = client
        .get("user:", "missing", TTL, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await
        .unwrap();
    assert_eq!(second, None);
    assert_eq!(count_of(&calls), 1);
    assert_eq!(client.stats().negative_hits, 1);
}

#[tokio::test]
async fn order_lookup_scenario() {
    let (client, _store) = memory_client(fast_config());
    let calls = call_counter();

    // First call: miss, loader runs, result cached.
    let first: Option<Order> = client
        .get("order:", 42, TTL, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Order { id: 42, total: 100 }))
            }
        })
        .await
        .unwrap();
    assert_eq!(first, Some(Order { id: 42, total: 100 }));
    assert_eq!(count_of(&calls), 1);

    // Second call within the TTL: hit, same value, loader untouched.
    let second: Option<Order> = client
        .get("order:", 42, TTL, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(count_of(&calls), 1);
    assert_eq!(client.stats().hits, 1);
}

#[tokio::test]
async fn explicit_set_round_trips_through_get() {
    let (client, _store) = memory_client(fast_config());
    let order = Order::new(7);

    client.set("order:7", &order, TTL).await.unwrap();
    let cached: Option<Order> = client
        .get("order:", 7, TTL, || async {
            panic!("loader must not run on a hit")
        })
        .await
        .unwrap();
    assert_eq!(cached, Some(order));
}

#[tokio::test]
async fn corrupt_payload_is_an_error_not_a_miss() {
    let (client, store) = memory_client(fast_config());
    store.set_with_ttl("order:9", "not-json", TTL).await.unwrap();

    let result: Result<Option<Order>, _> = client
        .get("order:", 9, TTL, || async {
            panic!("loader must not mask corrupt payloads")
        })
        .await;
    assert!(matches!(result, Err(CacheError::Decode { .. })));
}

#[tokio::test]
async fn loader_failure_propagates() {
    let (client, _store) = memory_client(fast_config());

    let result: Result<Option<Order>, _> = client
        .get("order:", 11, TTL, || async {
            anyhow::bail!("database unreachable")
        })
        .await;
    assert!(matches!(result, Err(CacheError::Loader(_))));
}
