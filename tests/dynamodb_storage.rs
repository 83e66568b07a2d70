//! DynamoDB-backed storage against DynamoDB Local.
//!
//! Run with a local endpoint:
//!
//! ```text
//! docker run -p 8000:8000 amazon/dynamodb-local
//! AWS_DYNAMO_ENDPOINT=http://localhost:8000 cargo test --features dynamodb -- --ignored
//! ```

mod common;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::client::Waiters;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use chrono::Utc;
use leakybucket::dynamodb::{DynamoDbConfig, DynamoDbStorage, DynamoDbStore, aws_sdk_dynamodb};
use leakybucket::{Bucket, BucketError, Consistency, RemoteStorage, Storage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(30);

fn endpoint() -> String {
    std::env::var("AWS_DYNAMO_ENDPOINT").expect("AWS_DYNAMO_ENDPOINT must be set")
}

fn config(table: &str) -> DynamoDbConfig {
    DynamoDbConfig::builder()
        .table_name(table)
        .region("us-east-1")
        .endpoint_url(endpoint())
        .explicit_credentials("id", "secret")
        .item_ttl(Duration::from_secs(10))
        .init_retry_attempts(1)
        .build()
}

/// A throwaway table, deleted on `teardown`
struct Table {
    name: String,
    client: Client,
}

impl Table {
    async fn provision() -> Self {
        common::init_tracing();
        let name = common::unique_name("test-table");
        let sdk_config = config(&name).sdk_config().await;
        let client = Client::new(&sdk_config);

        client
            .create_table()
            .table_name(&name)
            .billing_mode(BillingMode::PayPerRequest)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("name")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("name")
                    .key_type(KeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .send()
            .await
            .unwrap();

        client
            .wait_until_table_exists()
            .table_name(&name)
            .wait(WAIT)
            .await
            .unwrap();

        Self { name, client }
    }

    async fn storage(&self) -> DynamoDbStorage {
        leakybucket::dynamodb::connect_storage(&config(&self.name))
            .await
            .unwrap()
    }

    async fn teardown(self) {
        self.client
            .delete_table()
            .table_name(&self.name)
            .send()
            .await
            .unwrap();
        self.client
            .wait_until_table_not_exists()
            .table_name(&self.name)
            .wait(WAIT)
            .await
            .unwrap();
    }
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_create() {
    let table = Table::provision().await;
    common::create_test(&table.storage().await).await;
    table.teardown().await;
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_add() {
    let table = Table::provision().await;
    common::add_test(&table.storage().await).await;
    table.teardown().await;
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_add_reset() {
    let table = Table::provision().await;
    common::add_reset_test(&table.storage().await).await;
    table.teardown().await;
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_find_or_create() {
    let table = Table::provision().await;
    common::find_or_create_test(&table.storage().await).await;
    table.teardown().await;
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_instance_consistency() {
    let table = Table::provision().await;
    common::instance_consistency_test(&table.storage().await).await;
    table.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_thread_safe_add() {
    let table = Table::provision().await;
    let storage = table.storage().await;
    assert_eq!(storage.consistency(), Consistency::Atomic);
    common::thread_safe_add_test(&storage).await;
    table.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_independent_clients_never_overshoot() {
    let table = Table::provision().await;
    let name = common::unique_name("shared");
    let admitted = Arc::new(AtomicU64::new(0));

    // Separate clients stand in for separate processes
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let storage = table.storage().await;
        for _ in 0..20 {
            let bucket = Arc::new(
                storage
                    .create(&name, 25, Duration::from_secs(60))
                    .await
                    .unwrap(),
            );
            let admitted = Arc::clone(&admitted);
            tasks.push(tokio::spawn(async move {
                match bucket.add(1).await {
                    Ok(_) => {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => assert!(e.is_capacity_exceeded(), "unexpected error: {e}"),
                }
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 25);
    table.teardown().await;
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_missing_table_fails_fast() {
    common::init_tracing();
    let err = leakybucket::dynamodb::connect_storage(&config("doesnt-exist"))
        .await
        .unwrap_err();

    assert!(matches!(err, BucketError::Store(_)), "got {err:?}");
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_item_carries_housekeeping_ttl() {
    let table = Table::provision().await;
    let storage = table.storage().await;

    let before = Utc::now().timestamp();
    storage
        .create("ttl-bucket", 5, Duration::from_secs(1))
        .await
        .unwrap();

    let item = table
        .client
        .get_item()
        .table_name(&table.name)
        .key("name", AttributeValue::S("ttl-bucket".into()))
        .consistent_read(true)
        .send()
        .await
        .unwrap()
        .item
        .unwrap();

    let ttl: i64 = item["_ttl"].as_n().unwrap().parse().unwrap();
    let expiration: i64 = item["expiration"].as_n().unwrap().parse().unwrap();
    assert!(ttl >= before + 10 && ttl <= Utc::now().timestamp() + 10);
    // The window end is tracked separately, in milliseconds
    assert!(expiration / 1000 < ttl);

    table.teardown().await;
}

#[tokio::test]
#[ignore = "Requires DynamoDB Local at AWS_DYNAMO_ENDPOINT"]
async fn test_deleted_item_is_recreated() {
    let table = Table::provision().await;
    let store = DynamoDbStore::connect(&config(&table.name)).await.unwrap();
    let storage = RemoteStorage::new(store);

    let bucket = storage
        .create("vanishing", 3, Duration::from_secs(60))
        .await
        .unwrap();
    bucket.add(3).await.unwrap();

    // As TTL housekeeping would
    table
        .client
        .delete_item()
        .table_name(&table.name)
        .key("name", AttributeValue::S("vanishing".into()))
        .send()
        .await
        .unwrap();

    assert_eq!(bucket.add(1).await.unwrap().remaining, 2);
    table.teardown().await;
}
