//! # Leaky Bucket
//!
//! Capacity-bounded, time-windowed buckets identified by name. A caller
//! reserves capacity with [`Bucket::add`] and learns whether it fit, how much
//! is left and when the window resets.
//!
//! Backends are selected with feature flags:
//!
//! | backend | feature | consistency |
//! |---|---|---|
//! | [`LocalStorage`] | always | exact, one process |
//! | [`RemoteStorage`]`<`[`MemoryStore`]`>` | always | exact, one process |
//! | `dynamodb::DynamoDbStorage` | `dynamodb` | exact, any number of processes |
//! | `redis::RedisStorage` | `redis` | advisory |
//!
//! Code that relies on hard limits under concurrency can require the
//! [`AtomicAdmission`] bound, which only exact storages implement.

pub use leakybucket_core::*;

#[cfg(feature = "dynamodb")]
pub use leakybucket_dynamodb as dynamodb;

#[cfg(feature = "redis")]
pub use leakybucket_redis as redis;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AtomicAdmission, Bucket, BucketError, BucketResult, BucketState, Consistency,
        LocalStorage, MemoryStore, RemoteStorage, Storage,
    };
}
