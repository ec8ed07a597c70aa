//! The session handle returned by [`KvManagerStore`].
//!
//! [`KvManagerStore`]: crate::manager::KvManagerStore

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::Result;
use crate::client::CacheClient;
use crate::codec::{JsonCodec, SessionCodec, SessionValues, encode_values};
use crate::manager::Shared;
use crate::store::SessionStore;

/// A buffered view of one session stored in a key-value cache.
///
/// Values live in memory until [`SessionStore::save`] writes them back. The
/// handle can be shared between tasks (for instance behind an [`Arc`]):
/// reads run concurrently, while writes, [`flush`](SessionStore::flush) and
/// [`save`](SessionStore::save) are exclusive with respect to writers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use kvsession::client::memory::MemoryClient;
/// use kvsession::manager::KvManagerStore;
/// use kvsession::store::{ManagerStore, SessionStore};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> kvsession::Result<()> {
/// let manager = KvManagerStore::new(MemoryClient::new());
/// let session = manager
///     .create(CancellationToken::new(), "abc", Duration::from_secs(60))
///     .await?;
///
/// session.set("theme", "dark").await;
/// assert_eq!(session.get("theme").await, Some("dark".into()));
/// session.save().await?;
/// # Ok(())
/// # }
/// ```
pub struct KvSessionStore<C, D = JsonCodec> {
    shared: Arc<Shared<C, D>>,
    ctx: CancellationToken,
    session_id: String,
    expiry: Duration,
    values: RwLock<SessionValues>,
}

impl<C: CacheClient, D: SessionCodec> KvSessionStore<C, D> {
    pub(crate) fn new(
        shared: Arc<Shared<C, D>>,
        ctx: CancellationToken,
        session_id: &str,
        expiry: Duration,
        values: SessionValues,
    ) -> Self {
        Self {
            shared,
            ctx,
            session_id: session_id.to_string(),
            expiry,
            values: RwLock::new(values),
        }
    }

    /// Returns the time-to-live used by the next save.
    #[must_use]
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Returns the number of values currently held in memory.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    /// Returns `true` if the session currently holds no values.
    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    async fn write(&self, values: &SessionValues) -> Result<()> {
        let payload = encode_values(&self.shared.codec, values)?;
        trace!(
            session_id = %self.session_id,
            bytes = payload.len(),
            "saving session"
        );
        self.shared
            .client
            .set(&self.shared.key(&self.session_id), payload, self.expiry)
            .await?;
        Ok(())
    }
}

impl<C: CacheClient, D: SessionCodec> SessionStore for KvSessionStore<C, D> {
    fn context(&self) -> &CancellationToken {
        &self.ctx
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: impl Into<String> + Send, value: impl Into<Value> + Send) {
        let (key, value) = (key.into(), value.into());
        self.values.write().await.insert(key, value);
    }

    async fn delete(&self, key: &str) -> Option<Value> {
        self.values.write().await.remove(key)
    }

    async fn flush(&self) -> Result<()> {
        let mut values = self.values.write().await;
        *values = SessionValues::new();
        // downgrading keeps other writers out until the empty state is stored
        let values = values.downgrade();
        self.write(&values).await
    }

    async fn save(&self) -> Result<()> {
        let values = self.values.read().await;
        self.write(&values).await
    }
}

impl<C, D> fmt::Debug for KvSessionStore<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvSessionStore")
            .field("session_id", &self.session_id)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::client::memory::MemoryClient;
    use crate::manager::KvManagerStore;
    use crate::store::ManagerStore;

    const EXPIRY: Duration = Duration::from_secs(10);

    async fn make_session(
        client: &MemoryClient,
        session_id: &str,
    ) -> KvSessionStore<MemoryClient> {
        KvManagerStore::new(client.clone())
            .create(CancellationToken::new(), session_id, EXPIRY)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_session_is_empty() {
        let session = make_session(&MemoryClient::new(), "s1").await;

        assert!(session.is_empty().await);
        assert_eq!(session.get("foo").await, None);
        assert_eq!(session.session_id(), "s1");
        assert_eq!(session.expiry(), EXPIRY);
    }

    #[tokio::test]
    async fn set_is_visible_without_save() {
        let client = MemoryClient::new();
        let session = make_session(&client, "s1").await;

        session.set("foo", "bar").await;

        assert_eq!(session.get("foo").await, Some(json!("bar")));
        assert_eq!(client.get("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_returns_previous_value() {
        let session = make_session(&MemoryClient::new(), "s1").await;
        session.set("foo", "bar").await;

        assert_eq!(session.delete("foo").await, Some(json!("bar")));
        assert_eq!(session.delete("foo").await, None);
        assert_eq!(session.get("foo").await, None);
    }

    #[tokio::test]
    async fn save_writes_json_payload() {
        let client = MemoryClient::new();
        let session = make_session(&client, "s1").await;
        session.set("count", 3).await;

        session.save().await.unwrap();

        assert_eq!(client.get("s1").await.unwrap(), Some(br#"{"count":3}"#.to_vec()));
    }

    #[tokio::test]
    async fn save_empty_session_writes_empty_payload() {
        let client = MemoryClient::new();
        let session = make_session(&client, "s1").await;

        session.save().await.unwrap();

        assert_eq!(client.get("s1").await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn flush_clears_memory_and_storage() {
        let client = MemoryClient::new();
        let session = make_session(&client, "s1").await;
        session.set("foo", "bar").await;
        session.set("foo2", "bar2").await;
        session.save().await.unwrap();

        session.flush().await.unwrap();

        assert!(session.is_empty().await);
        assert_eq!(session.get("foo2").await, None);
        assert_eq!(client.get("s1").await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn context_is_kept() {
        let ctx = CancellationToken::new();
        let session = KvManagerStore::new(MemoryClient::new())
            .create(ctx.clone(), "s1", EXPIRY)
            .await
            .unwrap();

        ctx.cancel();

        assert!(session.context().is_cancelled());
    }

    #[tokio::test]
    async fn concurrent_writers_share_one_handle() {
        let session = Arc::new(make_session(&MemoryClient::new(), "s1").await);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    session.set(format!("key{i}"), i).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(session.len().await, 16);
        assert_eq!(session.get("key7").await, Some(json!(7)));
    }

    #[test]
    fn debug_shows_session_id() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let session = runtime.block_on(make_session(&MemoryClient::new(), "s1"));

        let debug = format!("{session:?}");

        assert!(debug.starts_with("KvSessionStore { session_id: \"s1\""));
    }
}
