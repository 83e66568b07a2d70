//! Bucket record stores
//!
//! A store is a key-value table holding one [`BucketRecord`] per bucket name,
//! manipulated only through conditional operations:
//!
//! - **get**: read that observes the latest committed write
//! - **create_if_absent**: idempotent creation, the first writer wins
//! - **bounded_increment**: atomic check-and-increment against a capacity
//! - **conditional_reset**: version-gated window rollover
//!
//! Implementations:
//!
//! - **Memory**: in-process table on DashMap, for single-process use and tests
//! - **DynamoDB**: durable table in the `leakybucket-dynamodb` crate

mod memory;

pub use memory::MemoryStore;

use crate::error::BucketResult;
use crate::record::BucketRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a bounded increment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Increment {
    /// The increment committed; carries the updated record
    Applied(BucketRecord),
    /// `value + amount` would exceed the capacity; nothing was written
    CapacityExceeded,
    /// No record exists for the name (deleted by housekeeping)
    Missing,
}

/// Outcome of a version-gated reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The reset committed; carries the new record
    Applied(BucketRecord),
    /// The stored version no longer matched; someone else rolled the window
    Conflict,
}

/// Trait for conditional bucket record stores
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Read the record for `name` with the most recent committed state.
    /// Returns `None` when no record exists.
    async fn get(&self, name: &str) -> BucketResult<Option<BucketRecord>>;

    /// Store `record` if its name is free, otherwise return the existing record
    async fn create_if_absent(&self, record: BucketRecord) -> BucketResult<BucketRecord>;

    /// Atomically add `amount` to the stored value, committing only if the
    /// result stays within `capacity`
    async fn bounded_increment(
        &self,
        name: &str,
        amount: u64,
        capacity: u64,
    ) -> BucketResult<Increment>;

    /// Replace the record with a fresh window ending at `new_expiration`,
    /// only if the stored version still equals `expected_version`
    async fn conditional_reset(
        &self,
        name: &str,
        expected_version: u64,
        new_expiration: DateTime<Utc>,
    ) -> BucketResult<ResetOutcome>;

    /// How long records live before housekeeping may delete them
    fn item_ttl(&self) -> Duration;

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
