//! # Leaky Bucket DynamoDB
//!
//! Buckets persisted in a DynamoDB table, safe to share between any number
//! of processes. Admission is exact: the table evaluates every increment
//! against the capacity in a single conditional write, and window rollovers
//! are guarded by a version attribute so exactly one reset wins per window.
//!
//! ## Table
//!
//! One table with hash key `name` (S). Enable DynamoDB TTL on the `_ttl`
//! attribute so idle buckets are eventually removed; the item TTL should be
//! far longer than any bucket rate.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leakybucket_core::{Bucket, Storage};
//! use leakybucket_dynamodb::{DynamoDbConfig, connect_storage};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DynamoDbConfig::from_env()
//!         .table_name("rate-limits")
//!         .build();
//!     let storage = connect_storage(&config).await?;
//!
//!     let bucket = storage.create("tenant-42", 100, Duration::from_secs(60)).await?;
//!     match bucket.add(1).await {
//!         Ok(state) => println!("{} left until {}", state.remaining, state.reset),
//!         Err(e) if e.is_capacity_exceeded() => println!("slow down"),
//!         Err(e) => return Err(e.into()),
//!     }
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod item;
mod store;

pub use config::{CredentialsSource, DEFAULT_ITEM_TTL, DynamoDbConfig, DynamoDbConfigBuilder};
pub use store::DynamoDbStore;

use leakybucket_core::{BucketResult, RemoteStorage};

/// Bucket storage over a DynamoDB table
pub type DynamoDbStorage = RemoteStorage<DynamoDbStore>;

/// Connect to the configured table and wrap it as bucket storage.
pub async fn connect_storage(config: &DynamoDbConfig) -> BucketResult<DynamoDbStorage> {
    Ok(RemoteStorage::new(DynamoDbStore::connect(config).await?))
}

// Re-export AWS types for convenience
pub use aws_config;
pub use aws_sdk_dynamodb;
