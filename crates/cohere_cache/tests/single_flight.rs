// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Concurrency tests for single-flight computation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cohere_cache::{AppCacheExt, CacheTelemetry, EntryPolicy, Error, LazyStore, ObjectCache};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tick::Clock;
use tokio::sync::Notify;

#[tokio::test]
async fn concurrent_misses_share_one_computation() {
    let cache = ObjectCache::builder(Clock::new_frozen())
        .telemetry(CacheTelemetry::disabled())
        .build();
    let calls = AtomicUsize::new(0);
    let gate = Notify::new();

    let (cache_ref, calls_ref, gate_ref) = (&cache, &calls, &gate);
    let mut lookups: FuturesUnordered<_> = (0..32)
        .map(move |_| {
            cache_ref.get_or_insert_as("uRepo_Template_1", move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                gate_ref.notified().await;
                Ok(Some(String::from("master")))
            })
        })
        .collect();

    // Every lookup has been polled and is parked on the computation in flight.
    assert!(futures::poll!(lookups.next()).is_pending());
    gate.notify_one();

    let mut answered = 0;
    while let Some(value) = lookups.next().await {
        let value = value.expect("lookup succeeds");
        assert_eq!(value.as_deref().map(String::as_str), Some("master"));
        answered += 1;
    }

    assert_eq!(answered, 32);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn shared_failure_reaches_every_waiter_and_is_not_kept() {
    let store = LazyStore::<u64>::new(Clock::new_frozen());
    let calls = AtomicUsize::new(0);
    let gate = Notify::new();
    let policy = EntryPolicy::none();

    let (store_ref, policy_ref, calls_ref, gate_ref) = (&store, &policy, &calls, &gate);
    let mut lookups: FuturesUnordered<_> = (0..16)
        .map(move |_| {
            store_ref.get_or_create("k", policy_ref, move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                gate_ref.notified().await;
                Err(Error::computation("store down"))
            })
        })
        .collect();

    assert!(futures::poll!(lookups.next()).is_pending());
    gate.notify_one();

    while let Some(outcome) = lookups.next().await {
        let error = outcome.expect_err("factory fails");
        assert!(error.to_string().contains("store down"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());

    let value = store
        .get_or_create("k", &policy, || async { Ok(Some(7)) })
        .await
        .expect("retry succeeds");
    assert_eq!(value, Some(7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_compute_independently() {
    let store = Arc::new(LazyStore::<usize>::new(Clock::new_frozen()));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut lookups = FuturesUnordered::new();
    for i in 0..8_usize {
        let store = Arc::clone(&store);
        let calls = Arc::clone(&calls);
        lookups.push(tokio::spawn(async move {
            let key = format!("uRepo_User_{i}");
            store
                .get_or_create(&key, &EntryPolicy::none(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(i))
                })
                .await
        }));
    }

    while let Some(joined) = lookups.next().await {
        joined.expect("task completes").expect("lookup succeeds");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(store.len(), 8);
}
