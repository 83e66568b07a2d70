//! Buckets over a shared conditional store
//!
//! [`RemoteStorage`] turns any [`BucketStore`] into a multi-process-safe
//! bucket factory. Several processes may hold handles for the same name; the
//! store record is the single source of truth and each handle only caches
//! what it last saw.
//!
//! ## Admission
//!
//! Capacity is consumed with a single [`BucketStore::bounded_increment`]. The
//! store evaluates the capacity condition in the same atomic write as the
//! increment, so there is no read-decide-write window between processes.
//!
//! ## Window rollover
//!
//! When a read observes an expired window, the handle issues a
//! [`BucketStore::conditional_reset`] gated on the version it read. Exactly
//! one concurrent reset commits. Losers re-read and adopt the winner's
//! record. The version wraps at [`MAX_VERSION`](crate::record::MAX_VERSION)
//! and carries no meaning beyond conflict detection.
//!
//! ## Housekeeping
//!
//! Records may be deleted by the store's garbage collection at any time.
//! Every read path treats a missing record as due for re-creation.

use crate::bucket::{AtomicAdmission, Bucket, BucketState, Consistency, Storage};
use crate::error::{BucketError, BucketResult};
use crate::record::{BucketRecord, offset};
use crate::stores::{BucketStore, Increment, ResetOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// How many times a single add re-creates a record that vanished under it
const MAX_RECREATE_ATTEMPTS: u32 = 3;

/// Bucket factory over a shared conditional store
pub struct RemoteStorage<S> {
    store: Arc<S>,
}

impl<S: BucketStore> RemoteStorage<S> {
    /// Create a storage over `store`
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Create a storage sharing an existing store
    pub fn from_arc(store: Arc<S>) -> Self {
        debug!(store = store.store_type(), "Creating remote bucket storage");
        Self { store }
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S> Clone for RemoteStorage<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[async_trait]
impl<S: BucketStore + 'static> Storage for RemoteStorage<S> {
    type Bucket = RemoteBucket<S>;

    async fn create(&self, name: &str, capacity: u64, rate: Duration) -> BucketResult<RemoteBucket<S>> {
        if name.is_empty() {
            return Err(BucketError::config("bucket name must not be empty"));
        }

        let record = find_or_create(self.store.as_ref(), name, rate).await?;
        let bucket = RemoteBucket {
            name: name.to_string(),
            capacity,
            rate,
            store: Arc::clone(&self.store),
            cache: RwLock::new(BucketState::from_value(capacity, record.value, record.expiration)),
            add_lock: tokio::sync::Mutex::new(()),
        };

        // A window that lapsed with no traffic is rolled over now so the
        // handle starts from the current window.
        if record.is_expired(Utc::now()) {
            debug!(name = %name, "Bucket expired at creation, rolling over");
            bucket.add(0).await?;
        }

        Ok(bucket)
    }

    fn consistency(&self) -> Consistency {
        Consistency::Atomic
    }
}

impl<S: BucketStore + 'static> AtomicAdmission for RemoteStorage<S> {}

impl<S> std::fmt::Debug for RemoteStorage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorage").finish_non_exhaustive()
    }
}

/// Handle over one named record in a shared store
pub struct RemoteBucket<S> {
    name: String,
    capacity: u64,
    rate: Duration,
    store: Arc<S>,
    cache: RwLock<BucketState>,
    /// Serializes this handle's adds so the cache is never read mid-update.
    /// Cross-process correctness comes from the store, not from this lock.
    add_lock: tokio::sync::Mutex<()>,
}

impl<S: BucketStore> RemoteBucket<S> {
    /// Window length of this handle
    pub fn rate(&self) -> Duration {
        self.rate
    }

    fn refresh(&self, record: &BucketRecord) -> BucketState {
        let state = BucketState::from_value(self.capacity, record.value, record.expiration);
        *self.cache.write() = state;
        state
    }

    /// Roll an expired record over, adopting whichever reset won
    async fn roll_over(&self, record: BucketRecord) -> BucketResult<BucketRecord> {
        let new_expiration = offset(Utc::now(), self.rate);
        match self
            .store
            .conditional_reset(&self.name, record.version, new_expiration)
            .await?
        {
            ResetOutcome::Applied(rolled) => {
                debug!(
                    name = %self.name,
                    version = rolled.version,
                    expiration = %rolled.expiration,
                    "Bucket window rolled over"
                );
                Ok(rolled)
            }
            ResetOutcome::Conflict => {
                debug!(
                    name = %self.name,
                    expected_version = record.version,
                    "Concurrent rollover detected, adopting stored record"
                );
                find_or_create(self.store.as_ref(), &self.name, self.rate).await
            }
        }
    }

    /// Current record with any pending rollover applied
    async fn current(&self) -> BucketResult<BucketRecord> {
        let record = find_or_create(self.store.as_ref(), &self.name, self.rate).await?;
        if record.is_expired(Utc::now()) {
            self.roll_over(record).await
        } else {
            Ok(record)
        }
    }

    async fn admit(&self, amount: u64) -> BucketResult<BucketState> {
        let record = self.current().await?;
        if amount == 0 {
            return Ok(self.refresh(&record));
        }

        let mut attempt = 1;
        loop {
            match self
                .store
                .bounded_increment(&self.name, amount, self.capacity)
                .await?
            {
                Increment::Applied(updated) => {
                    trace!(name = %self.name, value = updated.value, "Bucket add applied");
                    return Ok(self.refresh(&updated));
                }
                Increment::CapacityExceeded => {
                    // Refetch so the caller sees the backend's actual state
                    let current = find_or_create(self.store.as_ref(), &self.name, self.rate).await?;
                    let state = self.refresh(&current);
                    trace!(name = %self.name, remaining = state.remaining, "Bucket add rejected");
                    return Err(BucketError::CapacityExceeded(state));
                }
                Increment::Missing if attempt < MAX_RECREATE_ATTEMPTS => {
                    debug!(
                        name = %self.name,
                        attempt = attempt,
                        "Bucket record vanished during add, re-creating"
                    );
                    self.current().await?;
                    attempt += 1;
                }
                Increment::Missing => {
                    debug!(name = %self.name, attempts = attempt, "Giving up on vanishing record");
                    return Err(BucketError::Contention {
                        name: self.name.clone(),
                        attempts: MAX_RECREATE_ATTEMPTS,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl<S: BucketStore> Bucket for RemoteBucket<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn remaining(&self) -> u64 {
        self.cache.read().remaining
    }

    fn reset(&self) -> DateTime<Utc> {
        self.cache.read().reset
    }

    fn state(&self) -> BucketState {
        *self.cache.read()
    }

    async fn add(&self, amount: u64) -> BucketResult<BucketState> {
        let _guard = self.add_lock.lock().await;
        self.admit(amount).await
    }
}

impl<S> std::fmt::Debug for RemoteBucket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBucket")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("rate", &self.rate)
            .field("state", &*self.cache.read())
            .finish()
    }
}

/// Read the record for `name`, creating it with a fresh window if absent.
///
/// Two racing creators converge on the winner's record.
async fn find_or_create<S: BucketStore + ?Sized>(
    store: &S,
    name: &str,
    rate: Duration,
) -> BucketResult<BucketRecord> {
    if let Some(record) = store.get(name).await? {
        return Ok(record);
    }

    let fresh = BucketRecord::new(name, rate, store.item_ttl(), Utc::now());
    let record = store.create_if_absent(fresh).await?;
    debug!(name = %name, expiration = %record.expiration, "Bucket record created");
    Ok(record)
}
