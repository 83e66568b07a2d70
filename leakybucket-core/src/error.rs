//! Error types for bucket operations

use crate::bucket::BucketState;
use thiserror::Error;

/// Result type for bucket operations
pub type BucketResult<T> = Result<T, BucketError>;

/// Bucket errors
///
/// Only capacity rejections and genuine backend failures cross the public
/// boundary. Create races, concurrent resets and records deleted by
/// housekeeping are resolved inside the storage layer.
#[derive(Debug, Clone, Error)]
pub enum BucketError {
    /// The requested amount does not fit in the current window
    #[error(
        "add exceeds free capacity ({} of {} remaining, resets at {})",
        .0.remaining,
        .0.capacity,
        .0.reset
    )]
    CapacityExceeded(BucketState),

    /// The backend did not answer in time (dial, connect or operation timeout)
    #[error("Bucket store timed out: {0}")]
    Timeout(String),

    /// Any other backend or transport failure
    #[error("Bucket store error: {0}")]
    Store(String),

    /// A persisted record could not be decoded
    #[error("Malformed bucket record: {0}")]
    Malformed(String),

    /// The record kept disappearing while an add was in flight
    #[error("Bucket '{name}' was removed {attempts} times during a single add")]
    Contention {
        /// Bucket name
        name: String,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Invalid construction parameters
    #[error("Bucket configuration error: {0}")]
    Config(String),
}

impl BucketError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new malformed record error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is a capacity rejection
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded(_))
    }

    /// Check if this error belongs to the timeout class
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Get the bucket snapshot attached to a capacity rejection
    pub fn state(&self) -> Option<&BucketState> {
        match self {
            Self::CapacityExceeded(state) => Some(state),
            _ => None,
        }
    }
}
