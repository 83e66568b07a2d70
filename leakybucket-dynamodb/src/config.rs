//! DynamoDB storage configuration.

use leakybucket_core::{BucketError, BucketResult, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of a bucket item before DynamoDB TTL may delete it.
pub const DEFAULT_ITEM_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Credentials source for AWS authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsSource {
    /// Use AWS profile from ~/.aws/credentials.
    Profile(String),
    /// Use explicit credentials.
    Explicit {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
    /// Default AWS SDK credential chain (environment, profile, IAM role).
    #[default]
    Auto,
}

/// DynamoDB storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamoDbConfig {
    /// Table holding one item per bucket, hash key `name` (S).
    pub table_name: String,
    /// How long an item lives before TTL housekeeping may delete it.
    /// Should be far longer than any bucket rate.
    #[serde(with = "leakybucket_core::duration_secs", default = "default_item_ttl")]
    pub item_ttl: Duration,
    /// AWS region.
    pub region: Option<String>,
    /// Custom endpoint URL (for DynamoDB Local, LocalStack, etc.).
    pub endpoint_url: Option<String>,
    /// Credentials source.
    #[serde(default)]
    pub credentials: CredentialsSource,
    /// Attempts for the table check at construction time.
    #[serde(default = "default_init_retry_attempts")]
    pub init_retry_attempts: u32,
}

fn default_item_ttl() -> Duration {
    DEFAULT_ITEM_TTL
}

fn default_init_retry_attempts() -> u32 {
    RetryConfig::default().max_attempts
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            item_ttl: default_item_ttl(),
            region: None,
            endpoint_url: None,
            credentials: CredentialsSource::Auto,
            init_retry_attempts: default_init_retry_attempts(),
        }
    }
}

impl DynamoDbConfig {
    /// Create a configuration for the given table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> DynamoDbConfigBuilder {
        DynamoDbConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> DynamoDbConfigBuilder {
        let mut builder = DynamoDbConfigBuilder::new();

        if let Ok(table) = std::env::var("LEAKYBUCKET_TABLE") {
            builder = builder.table_name(table);
        }

        if let Ok(ttl) = std::env::var("LEAKYBUCKET_ITEM_TTL_SECS")
            && let Ok(secs) = ttl.parse() {
                builder = builder.item_ttl(Duration::from_secs(secs));
            }

        if let Ok(region) = std::env::var("AWS_REGION") {
            builder = builder.region(region);
        } else if let Ok(region) = std::env::var("AWS_DEFAULT_REGION") {
            builder = builder.region(region);
        }

        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            builder = builder.endpoint_url(endpoint);
        }

        builder
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> BucketResult<()> {
        if self.table_name.is_empty() {
            return Err(BucketError::config("table name must not be empty"));
        }
        if self.item_ttl.is_zero() {
            return Err(BucketError::config("item TTL must be non-zero"));
        }
        Ok(())
    }

    /// Retry policy for the table check.
    pub fn init_retry(&self) -> RetryConfig {
        RetryConfig::new(self.init_retry_attempts)
    }

    /// Build the AWS SDK configuration.
    pub async fn sdk_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        match &self.credentials {
            CredentialsSource::Profile(profile) => {
                loader = loader.profile_name(profile);
            }
            CredentialsSource::Explicit {
                access_key_id,
                secret_access_key,
                session_token,
            } => {
                let creds = aws_credential_types::Credentials::new(
                    access_key_id,
                    secret_access_key,
                    session_token.clone(),
                    None,
                    "explicit",
                );
                loader = loader.credentials_provider(creds);
            }
            CredentialsSource::Auto => {}
        }

        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        loader.load().await
    }
}

/// Builder for DynamoDB storage configuration.
#[derive(Default)]
pub struct DynamoDbConfigBuilder {
    config: DynamoDbConfig,
}

impl DynamoDbConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table name.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.config.table_name = table.into();
        self
    }

    /// Set the item lifetime.
    pub fn item_ttl(mut self, ttl: Duration) -> Self {
        self.config.item_ttl = ttl;
        self
    }

    /// Set the AWS region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    /// Set a custom endpoint URL.
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_url = Some(url.into());
        self
    }

    /// Set the credentials source.
    pub fn credentials(mut self, credentials: CredentialsSource) -> Self {
        self.config.credentials = credentials;
        self
    }

    /// Use explicit credentials.
    pub fn explicit_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.config.credentials = CredentialsSource::Explicit {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        };
        self
    }

    /// Use a named profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config.credentials = CredentialsSource::Profile(profile.into());
        self
    }

    /// Set the number of attempts for the table check.
    pub fn init_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.init_retry_attempts = attempts;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> DynamoDbConfig {
        self.config
    }
}
