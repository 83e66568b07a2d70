//! In-memory bucket record store
//!
//! Uses DashMap for thread-safe concurrent access. Every conditional operation
//! runs under the entry lock for its key, so the store linearizes writes to a
//! record the same way a durable table does. Suitable for single-process
//! deployments and for exercising the optimistic protocol in tests.

use crate::error::{BucketError, BucketResult};
use crate::record::BucketRecord;
use crate::stores::{BucketStore, Increment, ResetOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tracing::{debug, trace};

/// Default lifetime of a record before housekeeping may delete it
const DEFAULT_ITEM_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory bucket record store
pub struct MemoryStore {
    /// Records keyed by bucket name
    records: DashMap<String, BucketRecord>,
    /// Housekeeping lifetime of each record
    item_ttl: Duration,
}

impl MemoryStore {
    /// Create a new in-memory store with a 24 hour item lifetime
    pub fn new() -> Self {
        debug!("Creating new in-memory bucket store");
        Self {
            records: DashMap::new(),
            item_ttl: DEFAULT_ITEM_TTL,
        }
    }

    /// Create a store with a custom item lifetime.
    ///
    /// The lifetime should exceed any window used against the store by a
    /// wide margin.
    pub fn with_item_ttl(item_ttl: Duration) -> BucketResult<Self> {
        if item_ttl.is_zero() {
            return Err(BucketError::config("item TTL must be non-zero"));
        }
        Ok(Self {
            records: DashMap::new(),
            item_ttl,
        })
    }

    /// Get the number of stored records (for monitoring)
    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    /// Delete records whose housekeeping deadline has passed at `now`.
    ///
    /// Returns how many records were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.gc_after > now);
        let purged = before.saturating_sub(self.records.len());
        debug!(purged = purged, "Purged expired bucket records");
        purged
    }

    /// Overwrite a record unconditionally (seeding and fault injection)
    pub fn put(&self, record: BucketRecord) {
        self.records.insert(record.name.clone(), record);
    }

    /// Remove a record, as housekeeping would
    pub fn remove(&self, name: &str) -> Option<BucketRecord> {
        self.records.remove(name).map(|(_, record)| record)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn get(&self, name: &str) -> BucketResult<Option<BucketRecord>> {
        trace!(name = %name, "Memory store get");
        Ok(self.records.get(name).map(|record| record.value().clone()))
    }

    async fn create_if_absent(&self, record: BucketRecord) -> BucketResult<BucketRecord> {
        trace!(name = %record.name, "Memory store create");
        match self.records.entry(record.name.clone()) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => Ok(slot.insert(record).value().clone()),
        }
    }

    async fn bounded_increment(
        &self,
        name: &str,
        amount: u64,
        capacity: u64,
    ) -> BucketResult<Increment> {
        trace!(name = %name, amount = amount, capacity = capacity, "Memory store increment");

        let Some(mut record) = self.records.get_mut(name) else {
            return Ok(Increment::Missing);
        };

        match record.value.checked_add(amount) {
            Some(value) if value <= capacity => {
                record.value = value;
                Ok(Increment::Applied(record.value().clone()))
            }
            _ => Ok(Increment::CapacityExceeded),
        }
    }

    async fn conditional_reset(
        &self,
        name: &str,
        expected_version: u64,
        new_expiration: DateTime<Utc>,
    ) -> BucketResult<ResetOutcome> {
        trace!(name = %name, expected_version = expected_version, "Memory store reset");

        let Some(mut record) = self.records.get_mut(name) else {
            return Ok(ResetOutcome::Conflict);
        };
        if record.version != expected_version {
            return Ok(ResetOutcome::Conflict);
        }

        let rolled = record.rolled_over(new_expiration, self.item_ttl, Utc::now());
        *record = rolled.clone();
        Ok(ResetOutcome::Applied(rolled))
    }

    fn item_ttl(&self) -> Duration {
        self.item_ttl
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.records.len())
            .field("item_ttl", &self.item_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::next_version;

    fn record(name: &str) -> BucketRecord {
        BucketRecord::new(
            name,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_first_writer() {
        let store = MemoryStore::new();

        let mut first = record("test");
        first.value = 3;
        let created = store.create_if_absent(first.clone()).await.unwrap();
        assert_eq!(created, first);

        let second = store.create_if_absent(record("test")).await.unwrap();
        assert_eq!(second.value, 3);
        assert_eq!(store.key_count(), 1);
    }

    #[tokio::test]
    async fn test_bounded_increment() {
        let store = MemoryStore::new();
        store.create_if_absent(record("test")).await.unwrap();

        match store.bounded_increment("test", 4, 5).await.unwrap() {
            Increment::Applied(updated) => assert_eq!(updated.value, 4),
            other => panic!("expected Applied, got {:?}", other),
        }

        // 4 + 2 > 5, nothing is written
        assert_eq!(
            store.bounded_increment("test", 2, 5).await.unwrap(),
            Increment::CapacityExceeded
        );
        assert_eq!(store.get("test").await.unwrap().unwrap().value, 4);

        // Filling exactly to capacity is allowed
        assert!(matches!(
            store.bounded_increment("test", 1, 5).await.unwrap(),
            Increment::Applied(_)
        ));
    }

    #[tokio::test]
    async fn test_increment_larger_than_capacity() {
        let store = MemoryStore::new();
        store.create_if_absent(record("test")).await.unwrap();

        assert_eq!(
            store.bounded_increment("test", 11, 10).await.unwrap(),
            Increment::CapacityExceeded
        );
        assert_eq!(
            store.bounded_increment("test", u64::MAX, u64::MAX - 1).await.unwrap(),
            Increment::CapacityExceeded
        );
    }

    #[tokio::test]
    async fn test_increment_missing_record() {
        let store = MemoryStore::new();
        assert_eq!(
            store.bounded_increment("nope", 1, 10).await.unwrap(),
            Increment::Missing
        );
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_conditional_reset() {
        let store = MemoryStore::new();
        let created = store.create_if_absent(record("test")).await.unwrap();
        store.bounded_increment("test", 5, 10).await.unwrap();

        let expiration = created.expiration + chrono::Duration::seconds(60);
        let reset = store
            .conditional_reset("test", created.version, expiration)
            .await
            .unwrap();
        let ResetOutcome::Applied(rolled) = reset else {
            panic!("expected the first reset to apply");
        };
        assert_eq!(rolled.value, 0);
        assert_eq!(rolled.version, next_version(created.version));
        assert_eq!(rolled.expiration, expiration);

        // A second reset with the stale version must not apply
        assert_eq!(
            store
                .conditional_reset("test", created.version, expiration)
                .await
                .unwrap(),
            ResetOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn test_reset_missing_record_conflicts() {
        let store = MemoryStore::new();
        assert_eq!(
            store.conditional_reset("nope", 0, Utc::now()).await.unwrap(),
            ResetOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        let mut stale = record("stale");
        stale.gc_after = Utc::now() - chrono::Duration::seconds(1);
        store.put(stale);
        store.create_if_absent(record("fresh")).await.unwrap();

        assert_eq!(store.purge_expired(Utc::now()), 1);
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[test]
    fn test_zero_item_ttl_rejected() {
        assert!(MemoryStore::with_item_ttl(Duration::ZERO).is_err());
    }

    #[test]
    fn test_store_type() {
        let store = MemoryStore::new();
        assert_eq!(store.store_type(), "memory");
    }
}
