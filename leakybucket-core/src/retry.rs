//! Retry with backoff for backend initialization.
//!
//! Backends verify their table or connection once at construction time. A
//! momentary network blip should not fail startup, so that single check is
//! retried with bounded exponential backoff, but only for errors the caller's
//! predicate classifies as transient. Steady-state operations never retry
//! here; that policy belongs to the caller.
//!
//! ## Example
//!
//! ```rust
//! use leakybucket_core::retry::{BackoffStrategy, Retry, RetryConfig};
//! use leakybucket_core::BucketError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), BucketError> {
//! let retry = Retry::new(
//!     RetryConfig::new(3).backoff(BackoffStrategy::exponential(Duration::from_millis(10))),
//! );
//!
//! let value = retry
//!     .call_if(|| async { Ok::<_, BucketError>(42) }, BucketError::is_timeout)
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Constant delay between retries.
    Constant(Duration),
    /// Exponential backoff: delay multiplies each retry.
    Exponential {
        /// Initial delay.
        initial: Duration,
        /// Multiplier (typically 2.0).
        multiplier: f64,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Create constant backoff.
    pub fn constant(delay: Duration) -> Self {
        Self::Constant(delay)
    }

    /// Create exponential backoff doubling from `initial`, capped at 30 seconds.
    pub fn exponential(initial: Duration) -> Self {
        Self::Exponential {
            initial,
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }

    /// Set maximum delay.
    pub fn with_max(self, max: Duration) -> Self {
        match self {
            Self::Exponential {
                initial,
                multiplier,
                ..
            } => Self::Exponential {
                initial,
                multiplier,
                max,
            },
            other => other,
        }
    }

    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.powi(attempt as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1))
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial).
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// Create new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the backoff strategy.
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Retry executor.
#[derive(Debug, Clone, Default)]
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `f`, retrying only errors for which `should_retry` holds.
    ///
    /// The last error is returned unchanged once attempts are exhausted or
    /// an error is not retryable.
    pub async fn call_if<F, Fut, T, E, P>(&self, mut f: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Retry succeeded");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !should_retry(&e) {
                        return Err(e);
                    }
                    if attempt + 1 >= max_attempts {
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = max_attempts,
                            error = %e,
                            "Final retry attempt failed"
                        );
                        return Err(e);
                    }

                    let delay = self.config.backoff.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        delay = ?delay,
                        error = %e,
                        "Retry attempt failed, waiting before retry"
                    );
                    if delay > Duration::ZERO {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
