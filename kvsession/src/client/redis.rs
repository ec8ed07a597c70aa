//! Redis cache client.
//!
//! This client talks to a Redis server through a `deadpool-redis` connection
//! pool.
//!
//! # Examples
//!
//! ```no_run
//! # use std::time::Duration;
//! # use kvsession::client::CacheClient;
//! # use kvsession::client::redis::RedisClient;
//! # use kvsession::config::CacheUrl;
//! # #[tokio::main]
//! # async fn main() {
//! let client = RedisClient::new(&CacheUrl::from("redis://127.0.0.1:6379"), 16).unwrap();
//! client
//!     .set("session:abc", b"{\"user\":1}".to_vec(), Duration::from_secs(60))
//!     .await
//!     .unwrap();
//! let payload = client.get("session:abc").await.unwrap();
//!
//! assert_eq!(payload, Some(b"{\"user\":1}".to_vec()));
//! # }
//! ```
use std::time::Duration;

use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, SetExpiry, SetOptions};
use thiserror::Error;
use tracing::debug;

use crate::client::{Batch, BatchOp, CacheClient, CacheClientError, CacheClientResult};
use crate::config::CacheUrl;

const ERROR_PREFIX: &str = "redis client error:";

/// Errors specific to the Redis cache client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RedisClientError {
    /// An error occurred during Redis connection pool creation.
    #[error("{ERROR_PREFIX} redis pool creation error: {0}")]
    PoolCreation(Box<dyn std::error::Error + Send + Sync>),

    /// An error occurred during a pool connection or checkout.
    #[error("{ERROR_PREFIX} redis pool connection error: {0}")]
    PoolConnection(Box<dyn std::error::Error + Send + Sync>),

    /// An error occurred during a Redis command execution.
    #[error("{ERROR_PREFIX} redis command error: {0}")]
    RedisCommand(Box<dyn std::error::Error + Send + Sync>),

    /// The provided Redis connection string is invalid.
    #[error("{ERROR_PREFIX} invalid redis connection string: {0}")]
    InvalidConnectionString(String),

    /// The requested connection pool size is zero.
    #[error("{ERROR_PREFIX} redis pool size must be greater than zero")]
    InvalidPoolSize,
}

impl From<RedisClientError> for CacheClientError {
    fn from(err: RedisClientError) -> Self {
        CacheClientError::Backend(err.to_string())
    }
}

fn command_error(err: redis::RedisError) -> RedisClientError {
    RedisClientError::RedisCommand(Box::new(err))
}

/// Converts a TTL into Redis milliseconds; `None` means "no expiry".
fn ttl_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    // sub-millisecond TTLs would be rejected by Redis as zero
    Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

/// A Redis-backed cache client.
///
/// # Examples
///
/// ```
/// use kvsession::client::redis::RedisClient;
/// use kvsession::config::CacheUrl;
///
/// let client = RedisClient::new(&CacheUrl::from("redis://127.0.0.1/"), 16).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RedisClient {
    pool: Pool,
}

impl RedisClient {
    /// Creates and configures a new Redis client.
    ///
    /// This initializes a connection pool to the Redis server specified by the
    /// provided URL. No connection is opened until the first command.
    ///
    /// # Errors
    ///
    /// Returns [`RedisClientError::InvalidConnectionString`] if the provided
    /// URL is not a `redis://` or `rediss://` URL,
    /// [`RedisClientError::InvalidPoolSize`] if `pool_size` is zero and
    /// [`RedisClientError::PoolCreation`] if the connection pool could not be
    /// created.
    ///
    /// # Examples
    ///
    /// ```
    /// use kvsession::client::redis::RedisClient;
    /// use kvsession::config::CacheUrl;
    ///
    /// let client = RedisClient::new(&CacheUrl::from("redis://127.0.0.1/"), 16).unwrap();
    /// ```
    pub fn new(url: &CacheUrl, pool_size: usize) -> Result<Self, RedisClientError> {
        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(RedisClientError::InvalidConnectionString(
                url.as_str().to_string(),
            ));
        }
        // a pool without connections makes every checkout wait forever
        if pool_size == 0 {
            return Err(RedisClientError::InvalidPoolSize);
        }
        let pool = Config::from_url(url.as_str())
            .builder()
            .map_err(|e| RedisClientError::PoolCreation(Box::new(e)))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| RedisClientError::PoolCreation(Box::new(e)))?;

        Ok(Self { pool })
    }

    /// Creates a client on top of an existing connection pool.
    ///
    /// Useful when the application already owns a pool it wants to share
    /// with the session store.
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Get a connection from the Redis connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`RedisClientError::PoolConnection`] if a connection could not
    /// be obtained from the pool, including after the client has been closed.
    pub async fn get_connection(&self) -> Result<Connection, RedisClientError> {
        self.pool
            .get()
            .await
            .map_err(|e| RedisClientError::PoolConnection(Box::new(e)))
    }
}

impl CacheClient for RedisClient {
    async fn get(&self, key: &str) -> CacheClientResult<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        let data: Option<Vec<u8>> = conn.get(key).await.map_err(command_error)?;
        Ok(data)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheClientResult<()> {
        let mut conn = self.get_connection().await?;
        let mut options = SetOptions::default();
        if let Some(millis) = ttl_millis(ttl) {
            options = options.with_expiration(SetExpiry::PX(millis));
        }

        let _: () = conn
            .set_options(key, value, options)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheClientResult<()> {
        let mut conn = self.get_connection().await?;
        let _: bool = match ttl_millis(ttl) {
            Some(millis) => conn
                .pexpire(key, i64::try_from(millis).unwrap_or(i64::MAX))
                .await
                .map_err(command_error)?,
            None => conn.persist(key).await.map_err(command_error)?,
        };
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheClientResult<u64> {
        let mut conn = self.get_connection().await?;
        let count: u64 = conn.exists(key).await.map_err(command_error)?;
        Ok(count)
    }

    async fn delete(&self, keys: &[String]) -> CacheClientResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_connection().await?;
        let removed: u64 = conn.del(keys).await.map_err(command_error)?;
        Ok(removed)
    }

    async fn exec_atomic(&self, batch: Batch) -> CacheClientResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            match op {
                BatchOp::Set { key, value, ttl } => match ttl_millis(ttl) {
                    Some(millis) => {
                        pipe.pset_ex(key, value, millis).ignore();
                    }
                    None => {
                        pipe.set(key, value).ignore();
                    }
                },
                BatchOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
            }
        }

        let _: () = pipe.query_async(&mut conn).await.map_err(command_error)?;
        Ok(())
    }

    async fn close(&self) -> CacheClientResult<()> {
        debug!("closing redis connection pool");
        self.pool.close();
        Ok(())
    }
}
