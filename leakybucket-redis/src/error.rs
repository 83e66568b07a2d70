//! Mapping of Redis failures onto bucket errors.

use leakybucket_core::BucketError;

/// Convert a Redis client failure into a [`BucketError`].
pub(crate) fn classify(operation: &str, err: redis::RedisError) -> BucketError {
    let message = format!("{} failed: {}", operation, err);
    if err.is_timeout() {
        BucketError::Timeout(message)
    } else {
        BucketError::Store(message)
    }
}

/// Parse a stored counter.
pub(crate) fn parse_count(key: &str, raw: &str) -> Result<u64, BucketError> {
    raw.parse()
        .map_err(|_| BucketError::malformed(format!("counter at '{}' is not a number: {}", key, raw)))
}
