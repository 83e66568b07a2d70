//! Persisted bucket records
//!
//! One record exists per bucket name. `value` accumulates within a window and
//! returns to zero only through a version-gated rollover. The
//! garbage-collection deadline is housekeeping only and is independent of the
//! window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound of the version counter before it wraps to zero
pub const MAX_VERSION: u64 = 2 << 28;

/// Next version after `version`, wrapping past [`MAX_VERSION`]
pub fn next_version(version: u64) -> u64 {
    match version.checked_add(1) {
        Some(next) if next <= MAX_VERSION => next,
        _ => 0,
    }
}

/// Add a std duration to a timestamp, saturating at the maximum timestamp
pub fn offset(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_add_signed(by))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Backend state of a single bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    /// Bucket name (primary key)
    pub name: String,
    /// Consumption in the current window
    pub value: u64,
    /// End of the current window
    pub expiration: DateTime<Utc>,
    /// Guards window rollovers
    pub version: u64,
    /// Housekeeping deadline after which the record may be deleted
    pub gc_after: DateTime<Utc>,
}

impl BucketRecord {
    /// Fresh record whose window ends one `rate` from `now`
    pub fn new(name: impl Into<String>, rate: Duration, item_ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value: 0,
            expiration: offset(now, rate),
            version: 0,
            gc_after: offset(now, item_ttl),
        }
    }

    /// Whether the window has lapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }

    /// The record that replaces this one when its window rolls over
    pub fn rolled_over(
        &self,
        new_expiration: DateTime<Utc>,
        item_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: self.name.clone(),
            value: 0,
            expiration: new_expiration,
            version: next_version(self.version),
            gc_after: offset(now, item_ttl),
        }
    }
}
