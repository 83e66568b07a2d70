//! Mapping of AWS SDK failures onto bucket errors.

use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use leakybucket_core::BucketError;

/// Convert an SDK failure into a [`BucketError`].
///
/// Transport timeouts (dial, connect, operation) become
/// [`BucketError::Timeout`] so the construction retry can recognize them;
/// everything else is a store error.
pub(crate) fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> BucketError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let timed_out = match &err {
        SdkError::TimeoutError(_) => true,
        SdkError::DispatchFailure(failure) => failure.is_timeout(),
        _ => false,
    };

    let message = format!("{} failed: {}", operation, DisplayErrorContext(&err));
    if timed_out {
        BucketError::Timeout(message)
    } else {
        BucketError::Store(message)
    }
}
