//! Behavior every storage backend must show, shared by the per-backend test files.
//!
//! Each check creates its own uniquely named bucket so backends that persist
//! between tests (DynamoDB, Redis) can be reused.

#![allow(dead_code)]

use chrono::Utc;
use leakybucket::{AtomicAdmission, Bucket, BucketError, Storage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Bucket name unique to one test run
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// A new bucket has the requested capacity, is empty, and resets one rate from now.
pub async fn create_test<S: Storage>(storage: &S) {
    let now = Utc::now();
    let bucket = storage
        .create(&unique_name("create"), 100, Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(bucket.capacity(), 100);
    assert_eq!(bucket.remaining(), 100);

    let expected = now + chrono::Duration::seconds(60);
    let drift = (bucket.reset() - expected).num_milliseconds().abs();
    assert!(drift <= 1000, "reset {} not close to {}", bucket.reset(), expected);
}

/// Sequential adds count down and the handle agrees with each returned state.
pub async fn add_test<S: Storage>(storage: &S) {
    let bucket = storage
        .create(&unique_name("add"), 10, Duration::from_secs(60))
        .await
        .unwrap();

    for (amount, remaining) in [(1, 9), (3, 6), (6, 0)] {
        let state = bucket.add(amount).await.unwrap();
        assert_eq!(state.remaining, remaining);
        assert_eq!(bucket.remaining(), state.remaining);
        assert_eq!(state.capacity, 10);
    }

    let err = bucket.add(1).await.unwrap_err();
    assert!(err.is_capacity_exceeded(), "expected capacity exceeded, got {err:?}");
    assert_eq!(err.state().map(|s| s.remaining), Some(0));
    assert_eq!(bucket.remaining(), 0);
}

/// A full bucket admits again once its window has passed, with a reset in the future.
pub async fn add_reset_test<S: Storage>(storage: &S) {
    let bucket = storage
        .create(&unique_name("reset"), 1, Duration::from_millis(1))
        .await
        .unwrap();

    bucket.add(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;

    let before = Utc::now();
    let state = bucket.add(1).await.unwrap();
    assert_eq!(state.remaining, 0);
    assert!(state.reset > before, "reset {} is not in the future", state.reset);
}

/// Creating an existing name adopts the stored consumption instead of starting over.
pub async fn find_or_create_test<S: Storage>(storage: &S) {
    let name = unique_name("find-or-create");
    let first = storage
        .create(&name, 10, Duration::from_secs(60))
        .await
        .unwrap();
    first.add(4).await.unwrap();

    let second = storage
        .create(&name, 10, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(second.remaining(), 6);
    let drift = (second.reset() - first.reset()).num_milliseconds().abs();
    assert!(drift <= 1000, "handles disagree on reset: {} vs {}", first.reset(), second.reset());
    assert_eq!(second.add(1).await.unwrap().remaining, 5);
}

/// A stale handle learns the true state from a rejected add.
pub async fn instance_consistency_test<S: Storage>(storage: &S) {
    let name = unique_name("consistency");
    let a = storage
        .create(&name, 5, Duration::from_secs(60))
        .await
        .unwrap();
    let b = storage
        .create(&name, 5, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(b.remaining(), 5);

    a.add(5).await.unwrap();

    let err = b.add(1).await.unwrap_err();
    assert!(err.is_capacity_exceeded());
    assert_eq!(b.remaining(), 0);
    assert_eq!(b.reset(), a.reset());
}

/// An empty name is a configuration error.
pub async fn empty_name_test<S: Storage>(storage: &S)
where
    S::Bucket: std::fmt::Debug,
{
    let err = storage
        .create("", 10, Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::Config(_)));
}

/// `n + 1` concurrent adds of one unit against capacity `n`: every remaining
/// count from `n - 1` down to zero is seen exactly once, plus one rejection.
pub async fn thread_safe_add_test<S>(storage: &S)
where
    S: AtomicAdmission,
{
    let n: u64 = 100;
    let bucket = Arc::new(
        storage
            .create(&unique_name("thread-safe"), n, Duration::from_secs(60))
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..=n {
        let bucket = Arc::clone(&bucket);
        handles.push(tokio::spawn(async move { bucket.add(1).await }));
    }

    let mut remaining = HashSet::new();
    let mut errors = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(state) => {
                assert!(remaining.insert(state.remaining), "remaining {} seen twice", state.remaining);
            }
            Err(e) => errors.push(e),
        }
    }

    assert_eq!(remaining.len() as u64, n);
    assert_eq!(errors.len(), 1, "expected one rejection, got {errors:?}");
    assert!(errors[0].is_capacity_exceeded());
}
