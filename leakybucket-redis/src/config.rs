//! Redis configuration.

use leakybucket_core::{BucketError, BucketResult, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Prefix for bucket keys, joined to the name with `:`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Connection timeout.
    #[serde(with = "leakybucket_core::duration_secs", default = "default_connection_timeout")]
    pub connection_timeout: Duration,
    /// Attempts for the initial connection.
    #[serde(default = "default_init_retry_attempts")]
    pub init_retry_attempts: u32,
}

fn default_key_prefix() -> String {
    "leakybucket".to_string()
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_init_retry_attempts() -> u32 {
    RetryConfig::default().max_attempts
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: default_key_prefix(),
            connection_timeout: default_connection_timeout(),
            init_retry_attempts: default_init_retry_attempts(),
        }
    }
}

impl RedisConfig {
    /// Create a new configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> RedisConfigBuilder {
        let mut builder = RedisConfigBuilder::new();

        if let Ok(url) = std::env::var("REDIS_URL") {
            builder = builder.url(url);
        }

        if let Ok(prefix) = std::env::var("LEAKYBUCKET_REDIS_PREFIX") {
            builder = builder.key_prefix(prefix);
        }

        builder
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> BucketResult<()> {
        if self.url.is_empty() {
            return Err(BucketError::config("redis URL must not be empty"));
        }
        if self.connection_timeout.is_zero() {
            return Err(BucketError::config("connection timeout must be non-zero"));
        }
        Ok(())
    }

    /// Retry policy for the initial connection.
    pub fn init_retry(&self) -> RetryConfig {
        RetryConfig::new(self.init_retry_attempts)
    }
}

/// Builder for Redis configuration.
#[derive(Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RedisConfig::default(),
        }
    }

    /// Set the Redis URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the number of attempts for the initial connection.
    pub fn init_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.init_retry_attempts = attempts;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RedisConfig {
        self.config
    }
}
