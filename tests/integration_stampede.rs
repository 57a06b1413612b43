//! Integration tests for the mutex-guarded strategy
//!
//! Concurrent miss coalescing, negative results under lock, contention
//! bounds, and lock release on loader failure.

mod common;

use common::{Order, call_counter, count_of, fast_config, memory_client};
use guarded_cache::{CacheConfig, CacheError, CacheStore};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinSet;

const TTL: Duration = Duration::from_secs(600);

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_misses_invoke_loader_exactly_once() {
    let (client, _store) = memory_client(fast_config());
    let calls = call_counter();

    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let client = client.clone();
        let calls = calls.clone();
        tasks.spawn(async move {
            client
                .get_with_mutex("user:", 9, TTL, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // Keep the critical section open long enough for every
                    // contender to observe the miss.
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(Some(Order::new(9)))
                })
                .await
        });
    }

    let mut results = Vec::new();
    while let Some(result) = tasks.join_next().await {
        results.push(
            result
                .unwrap_or_else(|_| panic!("task panicked"))
                .unwrap_or_else(|err| panic!("lookup failed: {err}")),
        );
    }

    assert_eq!(count_of(&calls), 1, "stampede reached the loader");
    assert!(results.iter().all(|order| *order == Some(Order::new(9))));
}

#[tokio::test]
async fn absent_identifier_is_negatively_cached_under_lock() {
    let (client, _store) = memory_client(fast_config());
    let calls = call_counter();

    for _ in 0..2 {
        let calls = calls.clone();
        let result: Option<Order> = client
            .get_with_mutex("user:", "ghost", TTL, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .unwrap();
        assert_eq!(result, None);
    }
    assert_eq!(count_of(&calls), 1);
}

#[tokio::test]
async fn contended_lock_exhausts_retry_budget() {
    let config = CacheConfig {
        mutex_retry_delay: Duration::from_millis(5),
        mutex_max_retries: 3,
        ..CacheConfig::default()
    };
    let (client, store) = memory_client(config);

    // Simulate a foreign holder that never finishes its reload.
    assert!(
        store
            .acquire_lock("lock:5", "foreign", Duration::from_secs(60))
            .await
            .unwrap()
    );

    let result: Result<Option<Order>, _> = client
        .get_with_mutex("user:", 5, TTL, || async {
            panic!("loader must not run without the lock")
        })
        .await;
    assert!(matches!(
        result,
        Err(CacheError::LockContended { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn loader_failure_is_rethrown_after_release() {
    let (client, store) = memory_client(fast_config());

    let result: Result<Option<Order>, _> = client
        .get_with_mutex("user:", 8, TTL, || async {
            anyhow::bail!("database unreachable")
        })
        .await;
    assert!(matches!(result, Err(CacheError::Loader(_))));

    // The per-identifier lock was released despite the failure.
    assert!(
        store
            .acquire_lock("lock:8", "probe", Duration::from_secs(60))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn waiters_resolve_negative_results_too() {
    let (client, _store) = memory_client(fast_config());
    let calls = call_counter();

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let client = client.clone();
        let calls = calls.clone();
        tasks.spawn(async move {
            client
                .get_with_mutex("user:", "nobody", TTL, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(None::<Order>)
                })
                .await
        });
    }

    while let Some(result) = tasks.join_next().await {
        let value = result
            .unwrap_or_else(|_| panic!("task panicked"))
            .unwrap_or_else(|err| panic!("lookup failed: {err}"));
        assert_eq!(value, None);
    }
    assert_eq!(count_of(&calls), 1);
}
