//! Key-value cache client abstractions.
//!
//! The session stores never talk to a cache server directly. Instead, they
//! require the small set of primitives described by [`CacheClient`]: reading,
//! writing with a time-to-live, refreshing a time-to-live, probing for
//! existence, deleting, and applying an atomic batch of writes.
//!
//! A missing key is never an error at this boundary; implementations report
//! it as `None` (for [`CacheClient::get`]) or as a zero count.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

const ERROR_PREFIX: &str = "cache client error:";

/// Errors that can occur when talking to a cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheClientError {
    /// The underlying cache backend returned an error.
    #[error("{ERROR_PREFIX} backend error: {0}")]
    Backend(String),
    /// The client was closed and can no longer be used.
    #[error("{ERROR_PREFIX} client is closed")]
    Closed,
}

/// Convenience alias for results returned by cache client operations.
pub type CacheClientResult<T> = Result<T, CacheClientError>;

/// A single write operation that is part of a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BatchOp {
    /// Store `value` under `key`, expiring after `ttl`.
    Set {
        /// The key to write.
        key: String,
        /// The payload to store.
        value: Vec<u8>,
        /// The time-to-live. [`Duration::ZERO`] disables expiry.
        ttl: Duration,
    },
    /// Remove `key`.
    Delete {
        /// The key to remove.
        key: String,
    },
}

/// A list of writes that must be applied all-or-nothing.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use kvsession::client::Batch;
///
/// let batch = Batch::new()
///     .set("session:new", b"{}".to_vec(), Duration::from_secs(60))
///     .delete("session:old");
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a [`BatchOp::Set`] to the batch.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: Vec<u8>, ttl: Duration) -> Self {
        self.ops.push(BatchOp::Set {
            key: key.into(),
            value,
            ttl,
        });
        self
    }

    /// Appends a [`BatchOp::Delete`] to the batch.
    #[must_use]
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// Returns the operations in the order they were added.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consumes the batch and returns its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Returns the number of operations in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if the batch contains no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The primitives a key-value cache must provide to back a session store.
///
/// Implement this trait to plug a new cache into
/// [`KvManagerStore`](crate::manager::KvManagerStore).
pub trait CacheClient: Send + Sync + 'static {
    /// Get the payload stored under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// This method can return error if the cache could not be reached.
    fn get(&self, key: &str) -> impl Future<Output = CacheClientResult<Option<Vec<u8>>>> + Send;

    /// Store `value` under `key`, replacing any previous payload.
    ///
    /// A `ttl` of [`Duration::ZERO`] stores the key without expiry.
    ///
    /// # Errors
    ///
    /// This method can return error if the cache could not be reached.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = CacheClientResult<()>> + Send;

    /// Reset the time-to-live of `key` without touching its payload.
    ///
    /// A `ttl` of [`Duration::ZERO`] removes the expiry and keeps the key
    /// (Redis `PERSIST`), matching [`set`](CacheClient::set). It does not
    /// delete the key the way `EXPIRE key 0` does. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// This method can return error if the cache could not be reached.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = CacheClientResult<()>> + Send;

    /// Returns the number of the given keys that exist (0 or 1).
    ///
    /// # Errors
    ///
    /// This method can return error if the cache could not be reached.
    fn exists(&self, key: &str) -> impl Future<Output = CacheClientResult<u64>> + Send;

    /// Remove the given keys, returning how many were removed.
    ///
    /// # Errors
    ///
    /// This method can return error if the cache could not be reached.
    fn delete(&self, keys: &[String]) -> impl Future<Output = CacheClientResult<u64>> + Send;

    /// Apply every operation in `batch` as a single atomic unit.
    ///
    /// # Errors
    ///
    /// This method can return error if the cache could not be reached or
    /// rejected the batch, in which case none of the operations is applied.
    fn exec_atomic(&self, batch: Batch) -> impl Future<Output = CacheClientResult<()>> + Send;

    /// Release the underlying connections.
    ///
    /// # Errors
    ///
    /// This method can return error if the connections could not be released
    /// cleanly.
    fn close(&self) -> impl Future<Output = CacheClientResult<()>> + Send;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) trait BoxCacheClient: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CacheClientResult<Option<Vec<u8>>>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheClientResult<()>>;

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, CacheClientResult<()>>;

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CacheClientResult<u64>>;

    fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, CacheClientResult<u64>>;

    fn exec_atomic(&self, batch: Batch) -> BoxFuture<'_, CacheClientResult<()>>;

    fn close(&self) -> BoxFuture<'_, CacheClientResult<()>>;
}

impl<T: CacheClient> BoxCacheClient for T {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CacheClientResult<Option<Vec<u8>>>> {
        Box::pin(async move { <T as CacheClient>::get(self, key).await })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheClientResult<()>> {
        Box::pin(async move { <T as CacheClient>::set(self, key, value, ttl).await })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, CacheClientResult<()>> {
        Box::pin(async move { <T as CacheClient>::expire(self, key, ttl).await })
    }

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CacheClientResult<u64>> {
        Box::pin(async move { <T as CacheClient>::exists(self, key).await })
    }

    fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, CacheClientResult<u64>> {
        Box::pin(async move { <T as CacheClient>::delete(self, keys).await })
    }

    fn exec_atomic(&self, batch: Batch) -> BoxFuture<'_, CacheClientResult<()>> {
        Box::pin(async move { <T as CacheClient>::exec_atomic(self, batch).await })
    }

    fn close(&self) -> BoxFuture<'_, CacheClientResult<()>> {
        Box::pin(async move { <T as CacheClient>::close(self).await })
    }
}

/// A type-erased [`CacheClient`].
///
/// This is what [`KvManagerStore::from_config`] uses, since the concrete
/// backend is only known at runtime.
///
/// [`KvManagerStore::from_config`]: crate::manager::KvManagerStore::from_config
///
/// # Examples
///
/// ```
/// use kvsession::client::AnyClient;
/// use kvsession::client::memory::MemoryClient;
///
/// let client = AnyClient::new(MemoryClient::new());
/// ```
#[derive(derive_more::Debug, Clone)]
#[debug("AnyClient(..)")]
pub struct AnyClient(Arc<dyn BoxCacheClient>);

impl AnyClient {
    /// Wraps a concrete client.
    pub fn new(client: impl CacheClient) -> Self {
        Self(Arc::new(client))
    }
}

impl CacheClient for AnyClient {
    async fn get(&self, key: &str) -> CacheClientResult<Option<Vec<u8>>> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheClientResult<()> {
        self.0.set(key, value, ttl).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheClientResult<()> {
        self.0.expire(key, ttl).await
    }

    async fn exists(&self, key: &str) -> CacheClientResult<u64> {
        self.0.exists(key).await
    }

    async fn delete(&self, keys: &[String]) -> CacheClientResult<u64> {
        self.0.delete(keys).await
    }

    async fn exec_atomic(&self, batch: Batch) -> CacheClientResult<()> {
        self.0.exec_atomic(batch).await
    }

    async fn close(&self) -> CacheClientResult<()> {
        self.0.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{AnyClient, Batch, BatchOp, CacheClient, CacheClientError};
    use crate::client::memory::MemoryClient;

    #[test]
    fn batch_keeps_insertion_order() {
        let batch = Batch::new()
            .set("new", b"payload".to_vec(), Duration::from_secs(5))
            .delete("old");

        assert_eq!(
            batch.ops(),
            &[
                BatchOp::Set {
                    key: "new".to_string(),
                    value: b"payload".to_vec(),
                    ttl: Duration::from_secs(5),
                },
                BatchOp::Delete {
                    key: "old".to_string()
                },
            ]
        );
        assert!(!batch.is_empty());
        assert!(Batch::new().is_empty());
    }

    #[tokio::test]
    async fn any_client_delegates() {
        let client = AnyClient::new(MemoryClient::new());

        client
            .set("key", b"value".to_vec(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(client.get("key").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(client.exists("key").await.unwrap(), 1);
        assert_eq!(client.delete(&["key".to_string()]).await.unwrap(), 1);
        assert_eq!(client.get("key").await.unwrap(), None);

        client.close().await.unwrap();
        assert!(matches!(
            client.get("key").await,
            Err(CacheClientError::Closed)
        ));
    }

    #[test]
    fn any_client_debug_hides_inner() {
        let client = AnyClient::new(MemoryClient::new());
        assert_eq!(format!("{client:?}"), "AnyClient(..)");
    }
}
