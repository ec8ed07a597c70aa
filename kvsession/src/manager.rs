//! A session manager backed by a key-value cache.
//!
//! [`KvManagerStore`] implements [`ManagerStore`] on top of any
//! [`CacheClient`]. Each session is stored under `prefix + session_id` as a
//! single payload produced by a [`SessionCodec`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use kvsession::client::memory::MemoryClient;
//! use kvsession::manager::KvManagerStore;
//! use kvsession::store::{ManagerStore, SessionStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> kvsession::Result<()> {
//! let manager = KvManagerStore::with_prefix(MemoryClient::new(), "session:");
//! let expiry = Duration::from_secs(1800);
//!
//! let session = manager.create(CancellationToken::new(), "abc", expiry).await?;
//! session.set("user_id", 42).await;
//! session.save().await?;
//!
//! let session = manager.update(CancellationToken::new(), "abc", expiry).await?;
//! assert_eq!(session.get("user_id").await, Some(42.into()));
//!
//! let session = manager
//!     .refresh(CancellationToken::new(), "abc", "def", expiry)
//!     .await?;
//! assert!(!manager.check(session.context(), "abc").await?);
//! assert!(manager.check(session.context(), "def").await?);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;
use crate::client::memory::MemoryClient;
#[cfg(feature = "redis")]
use crate::client::redis::RedisClient;
use crate::client::{AnyClient, Batch, CacheClient, CacheClientError};
use crate::codec::{JsonCodec, SessionCodec, SessionValues, decode_values};
use crate::config::{SessionStoreConfig, StoreTypeConfig};
use crate::session::KvSessionStore;
use crate::store::ManagerStore;

pub(crate) struct Shared<C, D> {
    pub(crate) client: C,
    pub(crate) prefix: String,
    pub(crate) codec: D,
}

impl<C, D> Shared<C, D> {
    pub(crate) fn key(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.prefix)
    }
}

/// A [`ManagerStore`] keeping sessions in a key-value cache.
///
/// Cloning is cheap; all clones share the same client.
///
/// # Examples
///
/// ```
/// use kvsession::client::memory::MemoryClient;
/// use kvsession::manager::KvManagerStore;
///
/// let manager = KvManagerStore::new(MemoryClient::new());
/// ```
pub struct KvManagerStore<C, D = JsonCodec> {
    shared: Arc<Shared<C, D>>,
}

impl<C: CacheClient> KvManagerStore<C> {
    /// Creates a manager storing sessions under their bare IDs, encoded as
    /// JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use kvsession::client::memory::MemoryClient;
    /// use kvsession::manager::KvManagerStore;
    ///
    /// let manager = KvManagerStore::new(MemoryClient::new());
    /// assert_eq!(manager.prefix(), "");
    /// ```
    #[must_use]
    pub fn new(client: C) -> Self {
        Self::with_codec(client, "", JsonCodec)
    }

    /// Creates a manager storing sessions under `prefix + session_id`,
    /// encoded as JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use kvsession::client::memory::MemoryClient;
    /// use kvsession::manager::KvManagerStore;
    ///
    /// let manager = KvManagerStore::with_prefix(MemoryClient::new(), "myapp:");
    /// assert_eq!(manager.prefix(), "myapp:");
    /// ```
    #[must_use]
    pub fn with_prefix(client: C, prefix: impl Into<String>) -> Self {
        Self::with_codec(client, prefix, JsonCodec)
    }
}

impl<C: CacheClient, D: SessionCodec> KvManagerStore<C, D> {
    /// Creates a manager with a custom [`SessionCodec`].
    #[must_use]
    pub fn with_codec(client: C, prefix: impl Into<String>, codec: D) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                prefix: prefix.into(),
                codec,
            }),
        }
    }

    /// Returns the prefix prepended to session IDs.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.shared.prefix
    }

    /// Returns the underlying cache client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.shared.client
    }

    fn new_session(
        &self,
        ctx: CancellationToken,
        session_id: &str,
        expiry: Duration,
        values: SessionValues,
    ) -> KvSessionStore<C, D> {
        KvSessionStore::new(Arc::clone(&self.shared), ctx, session_id, expiry, values)
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.shared.client.get(key).await?)
    }
}

impl KvManagerStore<AnyClient> {
    /// Creates a manager from a [`SessionStoreConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`](crate::Error::Client) if the configured
    /// backend could not be set up, for instance because the Redis URL is
    /// invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use kvsession::config::{SessionStoreConfig, StoreTypeConfig};
    /// use kvsession::manager::KvManagerStore;
    ///
    /// let config = SessionStoreConfig::builder()
    ///     .store(StoreTypeConfig::Memory)
    ///     .prefix("v1:")
    ///     .build();
    /// let manager = KvManagerStore::from_config(&config)?;
    /// assert_eq!(manager.prefix(), "v1:");
    /// # Ok::<(), kvsession::Error>(())
    /// ```
    pub fn from_config(config: &SessionStoreConfig) -> Result<Self> {
        let client = match &config.store {
            StoreTypeConfig::Memory => AnyClient::new(MemoryClient::new()),
            #[cfg(feature = "redis")]
            StoreTypeConfig::Redis { url, pool_size } => {
                let client = RedisClient::new(url, *pool_size).map_err(CacheClientError::from)?;
                AnyClient::new(client)
            }
        };
        debug!(store = ?config.store, prefix = %config.prefix, "session store configured");

        Ok(Self::with_prefix(client, config.prefix.clone()))
    }
}

impl<C: CacheClient, D: SessionCodec> ManagerStore for KvManagerStore<C, D> {
    type Store = KvSessionStore<C, D>;

    async fn create(
        &self,
        ctx: CancellationToken,
        session_id: &str,
        expiry: Duration,
    ) -> Result<Self::Store> {
        debug!(session_id, "creating session");
        Ok(self.new_session(ctx, session_id, expiry, SessionValues::new()))
    }

    async fn update(
        &self,
        ctx: CancellationToken,
        session_id: &str,
        expiry: Duration,
    ) -> Result<Self::Store> {
        let key = self.shared.key(session_id);
        let Some(payload) = self.load(&key).await? else {
            debug!(session_id, "session not found, starting a new one");
            return Ok(self.new_session(ctx, session_id, expiry, SessionValues::new()));
        };

        let values = decode_values(&self.shared.codec, &payload)?;
        self.shared.client.expire(&key, expiry).await?;
        debug!(session_id, values = values.len(), "session loaded");

        Ok(self.new_session(ctx, session_id, expiry, values))
    }

    async fn delete(&self, ctx: &CancellationToken, session_id: &str) -> Result<()> {
        if !self.check(ctx, session_id).await? {
            return Ok(());
        }

        debug!(session_id, "deleting session");
        // DEL of a key that expired since the check is a no-op
        self.shared
            .client
            .delete(&[self.shared.key(session_id)])
            .await?;
        Ok(())
    }

    async fn check(&self, _ctx: &CancellationToken, session_id: &str) -> Result<bool> {
        let count = self.shared.client.exists(&self.shared.key(session_id)).await?;
        Ok(count > 0)
    }

    async fn refresh(
        &self,
        ctx: CancellationToken,
        old_session_id: &str,
        session_id: &str,
        expiry: Duration,
    ) -> Result<Self::Store> {
        let old_key = self.shared.key(old_session_id);
        let Some(payload) = self.load(&old_key).await? else {
            debug!(old_session_id, session_id, "session to rotate not found, starting a new one");
            return Ok(self.new_session(ctx, session_id, expiry, SessionValues::new()));
        };

        let values = decode_values(&self.shared.codec, &payload)?;
        if old_session_id == session_id {
            self.shared.client.expire(&old_key, expiry).await?;
        } else {
            let batch = Batch::new()
                .set(self.shared.key(session_id), payload, expiry)
                .delete(old_key);
            self.shared.client.exec_atomic(batch).await?;
            debug!(old_session_id, session_id, "session rotated");
        }

        Ok(self.new_session(ctx, session_id, expiry, values))
    }

    async fn close(&self) -> Result<()> {
        debug!(prefix = %self.shared.prefix, "closing session store");
        self.shared.client.close().await?;
        Ok(())
    }
}

impl<C, D> Clone for KvManagerStore<C, D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C, D> fmt::Debug for KvManagerStore<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvManagerStore")
            .field("prefix", &self.shared.prefix)
            .finish_non_exhaustive()
    }
}
