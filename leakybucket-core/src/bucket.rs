//! Bucket and storage contracts
//!
//! A [`Bucket`] is a per-name handle over a fixed window of capacity. It keeps
//! a cached view of the backend (remaining space and the next reset) that is
//! refreshed on every [`Bucket::add`]. A [`Storage`] creates or finds buckets
//! by name.

use crate::error::BucketResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Snapshot of a bucket as last observed by a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    /// Capacity of the handle that took the snapshot
    pub capacity: u64,
    /// Remaining space in the current window
    pub remaining: u64,
    /// When the current window ends
    pub reset: DateTime<Utc>,
}

impl BucketState {
    /// Build a snapshot from a consumed value, clamping so remaining is never negative
    pub fn from_value(capacity: u64, value: u64, reset: DateTime<Utc>) -> Self {
        Self {
            capacity,
            remaining: capacity - value.min(capacity),
            reset,
        }
    }

    /// Time left until the window resets, zero once it has passed
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.reset - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// How far a storage can be trusted under concurrent admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Check-and-consume is a single atomic step; concurrent callers never
    /// overshoot capacity
    Atomic,
    /// Reads, decides, then increments; concurrent callers can overshoot.
    /// Suitable for single-writer or advisory use only
    Advisory,
}

/// A named, capacity-bounded, time-windowed usage counter
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Name of the bucket
    fn name(&self) -> &str;

    /// Capacity of this handle
    fn capacity(&self) -> u64;

    /// Remaining space, as last observed
    fn remaining(&self) -> u64;

    /// When the current window ends, as last observed
    fn reset(&self) -> DateTime<Utc>;

    /// Snapshot of the cached state
    fn state(&self) -> BucketState {
        BucketState {
            capacity: self.capacity(),
            remaining: self.remaining(),
            reset: self.reset(),
        }
    }

    /// Reserve `amount` from the current window.
    ///
    /// Returns the refreshed state on success and
    /// [`BucketError::CapacityExceeded`](crate::BucketError::CapacityExceeded)
    /// when the amount does not fit. `add(0)` consumes nothing and only
    /// refreshes the cache, rolling the window over if it has expired.
    async fn add(&self, amount: u64) -> BucketResult<BucketState>;
}

/// Factory for buckets keyed by name
#[async_trait]
pub trait Storage: Send + Sync {
    /// Bucket handle produced by this storage
    type Bucket: Bucket + 'static;

    /// Create a handle for `name`, finding or creating its backing record.
    ///
    /// `rate` is the window length. `capacity` applies to this handle only
    /// and is not persisted.
    async fn create(
        &self,
        name: &str,
        capacity: u64,
        rate: Duration,
    ) -> BucketResult<Self::Bucket>;

    /// Consistency tier of this storage
    fn consistency(&self) -> Consistency;
}

/// Marker for storages whose admission is exact under concurrency.
///
/// Generic code that relies on never overshooting capacity should bound on
/// this trait rather than on [`Storage`].
pub trait AtomicAdmission: Storage {}
