//! # Leaky Bucket Core
//!
//! Named, capacity-bounded, time-windowed buckets. Callers reserve capacity
//! from a bucket and are told whether the reservation fits in the current
//! window. Windows are fixed: consumption accumulates until the window ends,
//! then resets to zero in one step.
//!
//! ## Features
//!
//! - **Bucket / Storage contracts**: one handle per name, created by a storage
//! - **Shared backends**: [`RemoteStorage`] runs an optimistic-concurrency
//!   protocol over any [`BucketStore`] that offers conditional single-key
//!   writes, so independent processes can share one bucket safely
//! - **In-process backends**: [`MemoryStore`] (a conditional table in memory)
//!   and [`LocalStorage`] (the plain single-process baseline)
//! - **Consistency tiers**: storages declare [`Consistency`], and only exact
//!   ones implement [`AtomicAdmission`]
//!
//! ## Quick Start
//!
//! ```rust
//! use leakybucket_core::{Bucket, MemoryStore, RemoteStorage, Storage};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = RemoteStorage::new(MemoryStore::new());
//! let bucket = storage.create("user_123", 10, Duration::from_secs(60)).await?;
//!
//! match bucket.add(1).await {
//!     Ok(state) => println!("admitted, {} remaining", state.remaining),
//!     Err(e) if e.is_capacity_exceeded() => println!("full until {}", bucket.reset()),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod duration_secs;
pub mod error;
pub mod local;
pub mod record;
pub mod remote;
pub mod retry;
pub mod stores;

pub use bucket::{AtomicAdmission, Bucket, BucketState, Consistency, Storage};
pub use error::{BucketError, BucketResult};
pub use local::{LocalBucket, LocalStorage};
pub use record::{BucketRecord, MAX_VERSION, next_version};
pub use remote::{RemoteBucket, RemoteStorage};
pub use retry::{BackoffStrategy, Retry, RetryConfig};
pub use stores::{BucketStore, Increment, MemoryStore, ResetOutcome};
