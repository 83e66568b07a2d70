//! Bucket item layout
//!
//! | attribute    | type | content                                   |
//! |--------------|------|-------------------------------------------|
//! | `name`       | S    | bucket name, hash key                     |
//! | `value`      | N    | consumption in the current window         |
//! | `expiration` | N    | end of the window, unix milliseconds      |
//! | `version`    | N    | rollover guard                            |
//! | `_ttl`       | N    | housekeeping deadline, unix seconds       |
//!
//! `_ttl` is the table's TTL attribute. Deletion by TTL is lazy, so the
//! window end is kept separately and never relies on it.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use leakybucket_core::{BucketError, BucketRecord, BucketResult};
use std::collections::HashMap;

pub(crate) const NAME: &str = "name";
pub(crate) const VALUE: &str = "value";
pub(crate) const EXPIRATION: &str = "expiration";
pub(crate) const VERSION: &str = "version";
pub(crate) const TTL: &str = "_ttl";

pub(crate) type Item = HashMap<String, AttributeValue>;

/// Numeric attribute value
pub(crate) fn number(n: impl ToString) -> AttributeValue {
    AttributeValue::N(n.to_string())
}

/// Primary key of the item for `name`
pub(crate) fn key(name: &str) -> Item {
    HashMap::from([(NAME.to_string(), AttributeValue::S(name.to_string()))])
}

pub(crate) fn encode(record: &BucketRecord) -> Item {
    HashMap::from([
        (NAME.to_string(), AttributeValue::S(record.name.clone())),
        (VALUE.to_string(), number(record.value)),
        (EXPIRATION.to_string(), number(record.expiration.timestamp_millis())),
        (VERSION.to_string(), number(record.version)),
        (TTL.to_string(), number(record.gc_after.timestamp())),
    ])
}

pub(crate) fn decode(item: &Item) -> BucketResult<BucketRecord> {
    let name = item
        .get(NAME)
        .and_then(|v| v.as_s().ok())
        .ok_or_else(|| BucketError::malformed("missing string attribute 'name'"))?
        .clone();

    let expiration_ms: i64 = parse_number(item, EXPIRATION)?;
    let expiration = DateTime::<Utc>::from_timestamp_millis(expiration_ms).ok_or_else(|| {
        BucketError::malformed(format!("expiration {} out of range", expiration_ms))
    })?;

    let ttl_secs: i64 = parse_number(item, TTL)?;
    let gc_after = DateTime::<Utc>::from_timestamp(ttl_secs, 0)
        .ok_or_else(|| BucketError::malformed(format!("_ttl {} out of range", ttl_secs)))?;

    Ok(BucketRecord {
        name,
        value: parse_number(item, VALUE)?,
        expiration,
        version: parse_number(item, VERSION)?,
        gc_after,
    })
}

fn parse_number<T: std::str::FromStr>(item: &Item, attribute: &str) -> BucketResult<T> {
    let raw = item
        .get(attribute)
        .and_then(|v| v.as_n().ok())
        .ok_or_else(|| BucketError::malformed(format!("missing number attribute '{}'", attribute)))?;

    raw.parse()
        .map_err(|_| BucketError::malformed(format!("attribute '{}' is not valid: {}", attribute, raw)))
}
