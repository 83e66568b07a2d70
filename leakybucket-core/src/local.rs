//! Single-process buckets
//!
//! The baseline implementation: a map from name to an in-process window
//! guarded by one mutex per bucket. There is a single writer address space,
//! so rollover is a plain comparison under that mutex and no version guard
//! is needed. Records live as long as the storage, so there is no
//! housekeeping either.
//!
//! All handles created for one name share the window. Capacity, as with the
//! other storages, is a property of each handle.

use crate::bucket::{AtomicAdmission, Bucket, BucketState, Consistency, Storage};
use crate::error::{BucketError, BucketResult};
use crate::record::offset;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Window state shared by every handle of one name
#[derive(Debug, Clone)]
struct LocalWindow {
    value: u64,
    expiration: DateTime<Utc>,
}

impl LocalWindow {
    fn roll_if_expired(&mut self, rate: Duration, now: DateTime<Utc>) {
        if now > self.expiration {
            self.value = 0;
            self.expiration = offset(now, rate);
        }
    }
}

/// In-process bucket factory
#[derive(Clone, Default)]
pub struct LocalStorage {
    windows: Arc<DashMap<String, Arc<Mutex<LocalWindow>>>>,
}

impl LocalStorage {
    /// Create a new in-process storage
    pub fn new() -> Self {
        debug!("Creating new local bucket storage");
        Self::default()
    }

    /// Get the number of tracked buckets (for monitoring)
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl Storage for LocalStorage {
    type Bucket = LocalBucket;

    async fn create(&self, name: &str, capacity: u64, rate: Duration) -> BucketResult<LocalBucket> {
        if name.is_empty() {
            return Err(BucketError::config("bucket name must not be empty"));
        }

        let window = self
            .windows
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(LocalWindow {
                    value: 0,
                    expiration: offset(Utc::now(), rate),
                }))
            })
            .clone();
        window.lock().roll_if_expired(rate, Utc::now());

        Ok(LocalBucket {
            name: name.to_string(),
            capacity,
            rate,
            window,
        })
    }

    fn consistency(&self) -> Consistency {
        Consistency::Atomic
    }
}

impl AtomicAdmission for LocalStorage {}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("buckets", &self.windows.len())
            .finish()
    }
}

/// Handle over an in-process window
pub struct LocalBucket {
    name: String,
    capacity: u64,
    rate: Duration,
    window: Arc<Mutex<LocalWindow>>,
}

impl LocalBucket {
    fn snapshot(&self, window: &LocalWindow) -> BucketState {
        BucketState::from_value(self.capacity, window.value, window.expiration)
    }
}

#[async_trait]
impl Bucket for LocalBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn remaining(&self) -> u64 {
        self.state().remaining
    }

    fn reset(&self) -> DateTime<Utc> {
        self.window.lock().expiration
    }

    fn state(&self) -> BucketState {
        self.snapshot(&self.window.lock())
    }

    async fn add(&self, amount: u64) -> BucketResult<BucketState> {
        let mut window = self.window.lock();
        window.roll_if_expired(self.rate, Utc::now());

        match window.value.checked_add(amount) {
            Some(value) if value <= self.capacity => {
                window.value = value;
                trace!(name = %self.name, value = value, "Local add applied");
                Ok(self.snapshot(&window))
            }
            _ => {
                trace!(name = %self.name, amount = amount, "Local add rejected");
                Err(BucketError::CapacityExceeded(self.snapshot(&window)))
            }
        }
    }
}

impl std::fmt::Debug for LocalBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBucket")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("rate", &self.rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_adds() {
        let storage = LocalStorage::new();
        let bucket = storage
            .create("test", 5, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(bucket.add(2).await.unwrap().remaining, 3);
        assert_eq!(bucket.add(3).await.unwrap().remaining, 0);

        let err = bucket.add(1).await.unwrap_err();
        assert!(err.is_capacity_exceeded());
        assert_eq!(bucket.remaining(), 0);
    }

    #[tokio::test]
    async fn test_handles_share_window() {
        let storage = LocalStorage::new();
        let a = storage
            .create("test", 10, Duration::from_secs(60))
            .await
            .unwrap();
        let b = storage
            .create("test", 10, Duration::from_secs(60))
            .await
            .unwrap();

        a.add(4).await.unwrap();
        assert_eq!(b.remaining(), 6);
        assert_eq!(a.reset(), b.reset());
        assert_eq!(storage.key_count(), 1);
    }

    #[tokio::test]
    async fn test_window_rolls_over() {
        let storage = LocalStorage::new();
        let bucket = storage
            .create("test", 1, Duration::from_millis(1))
            .await
            .unwrap();

        bucket.add(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let woke = Utc::now();

        let state = bucket.add(1).await.unwrap();
        assert_eq!(state.remaining, 0);
        assert!(state.reset > woke);
    }

    #[tokio::test]
    async fn test_overflowing_amount_rejected() {
        let storage = LocalStorage::new();
        let bucket = storage
            .create("test", 3, Duration::from_secs(60))
            .await
            .unwrap();
        bucket.add(1).await.unwrap();

        assert!(bucket.add(u64::MAX).await.is_err());
        assert_eq!(bucket.remaining(), 2);
    }

    #[test]
    fn test_consistency() {
        assert_eq!(LocalStorage::new().consistency(), Consistency::Atomic);
    }
}
