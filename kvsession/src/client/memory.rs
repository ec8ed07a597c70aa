//! In-memory cache client.
//!
//! This module provides a process-local implementation of [`CacheClient`]. It
//! is primarily intended for development and testing, where running a Redis
//! server is not desirable.
//!
//! # Examples
//!
//! ```
//! use kvsession::client::memory::MemoryClient;
//! use kvsession::manager::KvManagerStore;
//!
//! let manager = KvManagerStore::new(MemoryClient::new());
//! ```
//!
//! # Expiration
//!
//! Keys are only removed lazily, when they are accessed after their deadline.
//! There is no background task to clean up expired keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::client::{Batch, BatchOp, CacheClient, CacheClientError, CacheClientResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Instant::now().checked_add(ttl)
    }
}

/// An in-memory cache client.
///
/// All clones share the same underlying map, so a clone can be kept around
/// in tests to inspect what a session store has written.
///
/// # Examples
///
/// ```
/// use kvsession::client::memory::MemoryClient;
///
/// let client = MemoryClient::new();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    map: Arc<Mutex<HashMap<String, Entry>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryClient {
    /// Creates a new, empty `MemoryClient`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kvsession::client::memory::MemoryClient;
    ///
    /// let client = MemoryClient::new();
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> CacheClientResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheClientError::Closed)
        } else {
            Ok(())
        }
    }

    /// Returns the entry for `key`, dropping it first if it has expired.
    fn live_entry<'a>(map: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        if map.get(key).is_some_and(|entry| entry.is_expired(Instant::now())) {
            map.remove(key);
        }
        map.get_mut(key)
    }
}

impl CacheClient for MemoryClient {
    async fn get(&self, key: &str) -> CacheClientResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        let mut map = self.map.lock().await;
        Ok(Self::live_entry(&mut map, key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheClientResult<()> {
        self.ensure_open()?;
        let mut map = self.map.lock().await;
        map.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheClientResult<()> {
        self.ensure_open()?;
        let mut map = self.map.lock().await;
        if let Some(entry) = Self::live_entry(&mut map, key) {
            entry.expires_at = deadline(ttl);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheClientResult<u64> {
        self.ensure_open()?;
        let mut map = self.map.lock().await;
        Ok(u64::from(Self::live_entry(&mut map, key).is_some()))
    }

    async fn delete(&self, keys: &[String]) -> CacheClientResult<u64> {
        self.ensure_open()?;
        let mut map = self.map.lock().await;
        let mut removed = 0;
        for key in keys {
            if Self::live_entry(&mut map, key).is_some() {
                map.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exec_atomic(&self, batch: Batch) -> CacheClientResult<()> {
        self.ensure_open()?;
        // a single lock acquisition makes the whole batch visible at once
        let mut map = self.map.lock().await;
        for op in batch.into_ops() {
            match op {
                BatchOp::Set { key, value, ttl } => {
                    map.insert(key, Entry::new(value, ttl));
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> CacheClientResult<()> {
        self.closed.store(true, Ordering::Release);
        self.map.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn set_and_get() {
        let client = MemoryClient::new();
        client
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(client.get("key").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(client.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_expiry() {
        let client = MemoryClient::new();
        client
            .set("key", b"value".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(client.exists("key").await.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        assert_eq!(client.get("key").await.unwrap(), None);
        assert_eq!(client.exists("key").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_never_expires() {
        let client = MemoryClient::new();
        client
            .set("key", b"value".to_vec(), Duration::ZERO)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(client.get("key").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_ttl() {
        let client = MemoryClient::new();
        client
            .set("key", b"value".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        client.expire("key", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(client.get("key").await.unwrap(), Some(b"value".to_vec()));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(client.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expire_missing_key_is_noop() {
        let client = MemoryClient::new();
        client.expire("missing", Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.exists("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_counts_removed_keys() {
        let client = MemoryClient::new();
        client.set("a", vec![1], Duration::ZERO).await.unwrap();
        client.set("b", vec![2], Duration::ZERO).await.unwrap();

        assert_eq!(client.delete(&keys(&["a", "b", "c"])).await.unwrap(), 2);
        assert_eq!(client.delete(&keys(&["a"])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn exec_atomic_applies_all_ops() {
        let client = MemoryClient::new();
        client.set("old", b"data".to_vec(), Duration::ZERO).await.unwrap();

        let batch = Batch::new()
            .set("new", b"data".to_vec(), Duration::from_secs(60))
            .delete("old");
        client.exec_atomic(batch).await.unwrap();

        assert_eq!(client.exists("old").await.unwrap(), 0);
        assert_eq!(client.get("new").await.unwrap(), Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn closed_client_rejects_operations() {
        let client = MemoryClient::new();
        client.set("key", vec![1], Duration::ZERO).await.unwrap();
        client.close().await.unwrap();

        assert!(matches!(
            client.get("key").await,
            Err(CacheClientError::Closed)
        ));
        assert!(matches!(
            client.exec_atomic(Batch::new()).await,
            Err(CacheClientError::Closed)
        ));
    }
}
