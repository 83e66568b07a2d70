//! # Leaky Bucket Redis
//!
//! Buckets kept as expiring Redis counters.
//!
//! This storage is [`Consistency::Advisory`](leakybucket_core::Consistency):
//! admission reads the counter and increments it in separate commands, so
//! concurrent writers to one bucket can overshoot its capacity. It does not
//! implement [`AtomicAdmission`](leakybucket_core::AtomicAdmission). Prefer
//! `leakybucket-dynamodb` when several processes must share a hard limit.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leakybucket_core::{Bucket, Storage};
//! use leakybucket_redis::{RedisConfig, RedisStorage};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::from_env().key_prefix("api").build();
//!     let storage = RedisStorage::connect(&config).await?;
//!
//!     let bucket = storage.create("nightly-export", 10, Duration::from_secs(3600)).await?;
//!     bucket.add(1).await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod storage;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use storage::{RedisBucket, RedisStorage};

// Re-export redis for convenience
pub use redis;
