//! Redis-backed counter and window
//!
//! The counter is a plain integer key (`INCR`/`GET`/`SET NX`). The window is a
//! list of JSON-encoded metrics; append and trim run inside one `MULTI`/`EXEC`
//! transaction so other instances sharing the list never see it over capacity.

use super::{CounterStore, StoreError, WindowStore};
use crate::models::Metric;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Connection settings for [`RedisStore`]
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// `host:port` of the Redis server
    pub addr: String,
    /// Password, empty for none
    pub password: String,
    /// Key of the durable request counter
    pub counter_key: String,
    /// Key of the window list
    pub window_key: String,
    /// Bound on establishing a connection
    pub connect_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            password: String::new(),
            counter_key: "request_count".to_string(),
            window_key: "metrics".to_string(),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Build a `redis://` URL for database 0, embedding the password if set
pub fn redis_url(addr: &str, password: &str) -> Result<Url, StoreError> {
    let mut url = Url::parse(&format!("redis://{}/0", addr))
        .map_err(|e| StoreError::Unavailable(format!("invalid redis address {:?}: {}", addr, e)))?;

    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|_| StoreError::Unavailable("cannot set redis password".to_string()))?;
    }

    Ok(url)
}

/// Hide the password part of a URL for logging
fn sanitize_url(url: &Url) -> String {
    let mut sanitized = url.clone();
    if sanitized.password().is_some() {
        let _ = sanitized.set_password(Some("***"));
    }
    sanitized.to_string()
}

/// Counter and window stored in Redis
///
/// The connection is established lazily and re-established after I/O
/// failures, so a Redis that is down at startup is picked up once it returns.
pub struct RedisStore {
    client: Client,
    config: RedisStoreConfig,
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Create a store; no connection is opened until the first command
    pub fn new(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let url = redis_url(&config.addr, &config.password)?;
        info!(url = %sanitize_url(&url), "Configuring Redis store");

        let client = Client::open(url.as_str())?;

        Ok(Self {
            client,
            config,
            conn: RwLock::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.conn.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.config.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            StoreError::Unavailable(format!(
                "connection to {} timed out after {:?}",
                self.config.addr, self.config.connect_timeout
            ))
        })??;

        debug!(addr = %self.config.addr, "Redis connection established");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Map a command result, dropping the cached connection on transport errors
    async fn check<T>(&self, result: Result<T, RedisError>) -> Result<T, StoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    warn!(error = %e, "Redis connection lost, will reconnect");
                    *self.conn.write().await = None;
                }
                Err(StoreError::Redis(e))
            }
        }
    }

    /// Decode window entries, skipping any that are not valid metrics.
    ///
    /// A corrupt entry stays in the list until trimmed; it must not block
    /// analysis of the entries around it.
    fn decode(entries: Vec<String>) -> Vec<Metric> {
        entries
            .iter()
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(metric) => Some(metric),
                Err(e) => {
                    warn!(error = %e, entry = %raw, "Skipping undecodable window entry");
                    None
                }
            })
            .collect()
    }

    /// `LTRIM` range keeping the last `keep` entries; never keeps zero
    fn trim_start(keep: usize) -> isize {
        -(keep.max(1) as isize)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self) -> Result<i64, StoreError> {
        let mut conn = self.connection().await?;
        let result: Result<i64, RedisError> = conn.incr(&self.config.counter_key, 1i64).await;
        self.check(result).await
    }

    async fn get_or_init(&self) -> Result<i64, StoreError> {
        let mut conn = self.connection().await?;
        let result: Result<(i64,), RedisError> = redis::pipe()
            .atomic()
            .set_nx(&self.config.counter_key, 0i64)
            .ignore()
            .get(&self.config.counter_key)
            .query_async(&mut conn)
            .await;
        let (count,) = self.check(result).await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: Result<String, RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        self.check(result).await.map(|_| ())
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn push_and_trim(&self, entry: &Metric, keep: usize) -> Result<(), StoreError> {
        let payload = serde_json::to_string(entry)?;
        let key = &self.config.window_key;

        let mut conn = self.connection().await?;
        let result: Result<(), RedisError> = redis::pipe()
            .atomic()
            .rpush(key, payload)
            .ignore()
            .ltrim(key, Self::trim_start(keep), -1)
            .ignore()
            .query_async(&mut conn)
            .await;
        self.check(result).await
    }

    async fn read_all(&self) -> Result<Vec<Metric>, StoreError> {
        let mut conn = self.connection().await?;
        let result: Result<Vec<String>, RedisError> =
            conn.lrange(&self.config.window_key, 0, -1).await;
        let entries = self.check(result).await?;
        Ok(Self::decode(entries))
    }

    async fn push_trim_and_read(
        &self,
        entry: &Metric,
        keep: usize,
    ) -> Result<Vec<Metric>, StoreError> {
        let payload = serde_json::to_string(entry)?;
        let key = &self.config.window_key;

        let mut conn = self.connection().await?;
        let result: Result<(Vec<String>,), RedisError> = redis::pipe()
            .atomic()
            .rpush(key, payload)
            .ignore()
            .ltrim(key, Self::trim_start(keep), -1)
            .ignore()
            .lrange(key, 0, -1)
            .query_async(&mut conn)
            .await;
        let (entries,) = self.check(result).await?;
        Ok(Self::decode(entries))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        CounterStore::ping(self).await
    }
}
