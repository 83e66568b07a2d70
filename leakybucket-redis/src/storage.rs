//! Redis bucket storage
//!
//! A bucket is a single integer key holding the window's consumption, with
//! the window end expressed as the key's expiry. Redis offers no single
//! command that checks a bound and increments together, so admission here
//! reads the counter, decides locally, then writes:
//!
//! 1. `GET` the counter; if the amount does not fit, reject
//! 2. `SET key amount NX PX rate` to open a fresh window
//! 3. otherwise `INCRBY` the existing counter
//!
//! Two writers can both pass step 1 and both increment, so a window may end
//! above capacity. If the key expires between a failed `SET NX` and the
//! `INCRBY`, the increment recreates it with no expiry and that bucket never
//! resets until the key is deleted. Use this storage for a single writer per
//! bucket or where an advisory limit is good enough.

use crate::config::RedisConfig;
use crate::error::{classify, parse_count};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leakybucket_core::record::offset;
use leakybucket_core::{Bucket, BucketError, BucketResult, BucketState, Consistency, Retry, Storage};
use parking_lot::RwLock;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Advisory bucket storage on Redis
#[derive(Clone)]
pub struct RedisStorage {
    /// Redis connection manager
    conn: ConnectionManager,
    /// Key prefix
    prefix: String,
}

impl RedisStorage {
    /// Connect to the configured server.
    ///
    /// Connection timeouts are retried per the configured policy; any other
    /// failure is returned at once.
    pub async fn connect(config: &RedisConfig) -> BucketResult<Self> {
        config.validate()?;
        debug!(url = %config.url, "Connecting to Redis for leaky buckets");

        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| BucketError::config(format!("invalid redis URL: {}", e)))?;
        let timeout = config.connection_timeout;

        let conn = Retry::new(config.init_retry())
            .call_if(
                || {
                    let client = client.clone();
                    async move {
                        match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
                            Ok(Ok(conn)) => Ok(conn),
                            Ok(Err(e)) => Err(classify("connect", e)),
                            Err(_) => Err(BucketError::timeout(format!(
                                "connect timed out after {:?}",
                                timeout
                            ))),
                        }
                    }
                },
                BucketError::is_timeout,
            )
            .await?;

        info!(prefix = %config.key_prefix, "Redis bucket storage initialized");
        Ok(Self::from_manager(conn, config.key_prefix.clone()))
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    /// Get the full key with prefix
    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    type Bucket = RedisBucket;

    async fn create(&self, name: &str, capacity: u64, rate: Duration) -> BucketResult<RedisBucket> {
        if name.is_empty() {
            return Err(BucketError::config("bucket name must not be empty"));
        }

        let key = self.key(name);
        let mut conn = self.conn.clone();
        let now = Utc::now();

        let count: Option<String> = conn.get(&key).await.map_err(|e| classify("GET", e))?;
        let state = match count {
            None => BucketState::from_value(capacity, 0, offset(now, rate)),
            Some(raw) => {
                let value = parse_count(&key, &raw)?;
                let reset = reset_from_reply(now, conn.pttl(&key).await)?;
                BucketState::from_value(capacity, value, reset)
            }
        };
        trace!(key = %key, remaining = state.remaining, "Redis bucket created");

        Ok(RedisBucket {
            name: name.to_string(),
            key,
            capacity,
            rate,
            conn: self.conn.clone(),
            cache: RwLock::new(state),
            add_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn consistency(&self) -> Consistency {
        Consistency::Advisory
    }
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Handle over one Redis counter
pub struct RedisBucket {
    name: String,
    key: String,
    capacity: u64,
    rate: Duration,
    conn: ConnectionManager,
    cache: RwLock<BucketState>,
    add_lock: tokio::sync::Mutex<()>,
}

impl RedisBucket {
    /// Redis key holding the counter
    pub fn key(&self) -> &str {
        &self.key
    }

    fn rate_millis(&self) -> u64 {
        u64::try_from(self.rate.as_millis()).unwrap_or(u64::MAX).max(1)
    }

    /// Re-read the window end from the key's expiry once the cached one has passed.
    async fn refresh_stale_reset(&self, conn: &mut ConnectionManager) -> BucketResult<()> {
        let now = Utc::now();
        if self.cache.read().reset > now {
            return Ok(());
        }
        let reset = reset_from_reply(now, conn.pttl(&self.key).await)?;
        self.cache.write().reset = reset;
        Ok(())
    }

    fn set_remaining(&self, value: u64) -> BucketState {
        let mut cache = self.cache.write();
        let reset = cache.reset;
        *cache = BucketState::from_value(self.capacity, value, reset);
        *cache
    }
}

#[async_trait]
impl Bucket for RedisBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn remaining(&self) -> u64 {
        self.cache.read().remaining
    }

    fn reset(&self) -> DateTime<Utc> {
        self.cache.read().reset
    }

    fn state(&self) -> BucketState {
        *self.cache.read()
    }

    async fn add(&self, amount: u64) -> BucketResult<BucketState> {
        let _guard = self.add_lock.lock().await;
        let mut conn = self.conn.clone();
        trace!(key = %self.key, amount = amount, "Redis add");

        let count: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(|e| classify("GET", e))?;
        let value = match count {
            Some(raw) => parse_count(&self.key, &raw)?,
            None => 0,
        };
        let state = self.set_remaining(value);

        if amount > state.remaining {
            self.refresh_stale_reset(&mut conn).await?;
            trace!(key = %self.key, remaining = state.remaining, "Redis add rejected");
            return Err(BucketError::CapacityExceeded(self.state()));
        }

        let opened: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(amount)
            .arg("NX")
            .arg("PX")
            .arg(self.rate_millis())
            .query_async(&mut conn)
            .await
            .map_err(|e| classify("SET", e))?;

        if opened.is_some() {
            let state = BucketState::from_value(self.capacity, amount, offset(Utc::now(), self.rate));
            *self.cache.write() = state;
            debug!(key = %self.key, "Opened new Redis window");
            return Ok(state);
        }

        self.refresh_stale_reset(&mut conn).await?;

        let count: i64 = conn
            .incr(&self.key, amount)
            .await
            .map_err(|e| classify("INCRBY", e))?;
        Ok(self.set_remaining(u64::try_from(count).unwrap_or(0)))
    }
}

impl std::fmt::Debug for RedisBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucket")
            .field("key", &self.key)
            .field("capacity", &self.capacity)
            .field("rate", &self.rate)
            .finish()
    }
}

/// Window end implied by a `PTTL` reply at `now`.
///
/// Negative replies (no key, or no expiry) mean the window is already over.
fn reset_from_pttl(now: DateTime<Utc>, pttl: i64) -> DateTime<Utc> {
    match u64::try_from(pttl) {
        Ok(ms) => offset(now, Duration::from_millis(ms)),
        Err(_) => now,
    }
}

/// Window end from a `PTTL` reply, surfacing a failed command.
fn reset_from_reply(now: DateTime<Utc>, reply: redis::RedisResult<i64>) -> BucketResult<DateTime<Utc>> {
    reply
        .map(|pttl| reset_from_pttl(now, pttl))
        .map_err(|e| classify("PTTL", e))
}
