//! DynamoDB bucket record store
//!
//! Every operation is a single conditional request against one item, so the
//! table serializes concurrent writers to a bucket. Reads are strongly
//! consistent. Attribute names always go through expression placeholders
//! because `name` and `value` are reserved words.

use crate::config::DynamoDbConfig;
use crate::error::classify;
use crate::item::{self, NAME, VALUE, VERSION};
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::ReturnValue;
use chrono::{DateTime, Utc};
use leakybucket_core::record::{next_version, offset};
use leakybucket_core::{
    BucketError, BucketRecord, BucketResult, BucketStore, Increment, ResetOutcome, Retry,
};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Bucket record store backed by a DynamoDB table
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
    item_ttl: Duration,
}

impl DynamoDbStore {
    /// Build a client from `config` and check the table is reachable.
    ///
    /// Timeouts during the check are retried per the configured policy; any
    /// other failure, such as a missing table, is returned at once.
    pub async fn connect(config: &DynamoDbConfig) -> BucketResult<Self> {
        config.validate()?;

        let sdk_config = config.sdk_config().await;
        let store = Self::from_client(
            Client::new(&sdk_config),
            config.table_name.clone(),
            config.item_ttl,
        )?;
        store.verify_table(&Retry::new(config.init_retry())).await?;

        info!(
            table = %store.table_name,
            region = ?sdk_config.region(),
            "DynamoDB bucket store initialized"
        );
        Ok(store)
    }

    /// Wrap an existing client without any network round trip.
    pub fn from_client(
        client: Client,
        table_name: impl Into<String>,
        item_ttl: Duration,
    ) -> BucketResult<Self> {
        let table_name = table_name.into();
        if table_name.is_empty() {
            return Err(BucketError::config("table name must not be empty"));
        }
        if item_ttl.is_zero() {
            return Err(BucketError::config("item TTL must be non-zero"));
        }

        Ok(Self {
            client,
            table_name,
            item_ttl,
        })
    }

    /// Describe the table, retrying timeouts under `retry`.
    pub async fn verify_table(&self, retry: &Retry) -> BucketResult<()> {
        let client = &self.client;
        let table = self.table_name.as_str();

        retry
            .call_if(
                move || async move {
                    client
                        .describe_table()
                        .table_name(table)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| classify("DescribeTable", e))
                },
                BucketError::is_timeout,
            )
            .await
    }

    /// Underlying SDK client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Table name
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn classify_rejection(&self, name: &str) -> BucketResult<Increment> {
        match self.get(name).await? {
            Some(_) => Ok(Increment::CapacityExceeded),
            None => Ok(Increment::Missing),
        }
    }
}

#[async_trait]
impl BucketStore for DynamoDbStore {
    async fn get(&self, name: &str) -> BucketResult<Option<BucketRecord>> {
        trace!(name = %name, table = %self.table_name, "DynamoDB get");

        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(item::key(name)))
            .consistent_read(true)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(classify("GetItem", err)),
        };

        match output.item() {
            Some(found) if !found.is_empty() => item::decode(found).map(Some),
            _ => Ok(None),
        }
    }

    async fn create_if_absent(&self, record: BucketRecord) -> BucketResult<BucketRecord> {
        trace!(name = %record.name, table = %self.table_name, "DynamoDB create");

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item::encode(&record)))
            .condition_expression("attribute_not_exists(#N)")
            .expression_attribute_names("#N", NAME)
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(name = %record.name, expiration = %record.expiration, "Created bucket record");
                Ok(record)
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                debug!(name = %record.name, "Bucket record already exists, adopting it");
                // The winner may already be gone again; ours is as good as any
                Ok(self.get(&record.name).await?.unwrap_or(record))
            }
            Err(err) => Err(classify("PutItem", err)),
        }
    }

    async fn bounded_increment(
        &self,
        name: &str,
        amount: u64,
        capacity: u64,
    ) -> BucketResult<Increment> {
        trace!(name = %name, amount = amount, capacity = capacity, "DynamoDB increment");

        let Some(limit) = capacity.checked_sub(amount) else {
            return self.classify_rejection(name).await;
        };

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(item::key(name)))
            .update_expression("SET #V = #V + :a")
            .condition_expression("attribute_exists(#N) AND #V <= :limit")
            .expression_attribute_names("#N", NAME)
            .expression_attribute_names("#V", VALUE)
            .expression_attribute_values(":a", item::number(amount))
            .expression_attribute_values(":limit", item::number(limit))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => match output.attributes() {
                Some(attributes) => item::decode(attributes).map(Increment::Applied),
                None => Err(BucketError::malformed("UpdateItem returned no attributes")),
            },
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                self.classify_rejection(name).await
            }
            Err(err) => Err(classify("UpdateItem", err)),
        }
    }

    async fn conditional_reset(
        &self,
        name: &str,
        expected_version: u64,
        new_expiration: DateTime<Utc>,
    ) -> BucketResult<ResetOutcome> {
        trace!(name = %name, expected_version = expected_version, "DynamoDB reset");

        let rolled = BucketRecord {
            name: name.to_string(),
            value: 0,
            expiration: new_expiration,
            version: next_version(expected_version),
            gc_after: offset(Utc::now(), self.item_ttl),
        };

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item::encode(&rolled)))
            .condition_expression("#Ver = :v")
            .expression_attribute_names("#Ver", VERSION)
            .expression_attribute_values(":v", item::number(expected_version))
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(
                    name = %name,
                    version = rolled.version,
                    "Rolled bucket window"
                );
                Ok(ResetOutcome::Applied(rolled))
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                debug!(name = %name, expected_version = expected_version, "Window already rolled");
                Ok(ResetOutcome::Conflict)
            }
            Err(err) => Err(classify("PutItem", err)),
        }
    }

    fn item_ttl(&self) -> Duration {
        self.item_ttl
    }

    fn store_type(&self) -> &'static str {
        "dynamodb"
    }
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore")
            .field("table_name", &self.table_name)
            .field("item_ttl", &self.item_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::config::{BehaviorVersion, Region};

    fn offline_client() -> Client {
        let config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn test_from_client() {
        let store =
            DynamoDbStore::from_client(offline_client(), "buckets", Duration::from_secs(60)).unwrap();
        assert_eq!(store.table_name(), "buckets");
        assert_eq!(store.item_ttl(), Duration::from_secs(60));
        assert_eq!(store.store_type(), "dynamodb");
    }

    #[test]
    fn test_from_client_rejects_bad_parameters() {
        let err = DynamoDbStore::from_client(offline_client(), "", Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, BucketError::Config(_)));

        let err = DynamoDbStore::from_client(offline_client(), "buckets", Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, BucketError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_validates_before_dialing() {
        let config = DynamoDbConfig::default();
        let err = DynamoDbStore::connect(&config).await.unwrap_err();
        assert!(matches!(err, BucketError::Config(_)));
    }
}
