//! Session persistence on top of a key-value cache.
//!
//! `kvsession` stores the values of web sessions in a key-value cache such as
//! Redis. It is meant to sit below a session framework, which stays in charge
//! of generating session IDs, handling cookies and deciding when to create,
//! load or rotate a session.
//!
//! The main entry points are:
//!
//! * [`KvManagerStore`](manager::KvManagerStore), implementing
//!   [`ManagerStore`](store::ManagerStore) for any
//!   [`CacheClient`](client::CacheClient),
//! * [`KvSessionStore`](session::KvSessionStore), the per-session handle
//!   implementing [`SessionStore`](store::SessionStore),
//! * [`RedisClient`](client::redis::RedisClient) and
//!   [`MemoryClient`](client::memory::MemoryClient), the bundled cache
//!   clients.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use kvsession::config::SessionStoreConfig;
//! use kvsession::manager::KvManagerStore;
//! use kvsession::store::{ManagerStore, SessionStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> kvsession::Result<()> {
//! let config = SessionStoreConfig::from_toml(
//!     r#"
//! prefix = "session:"
//!
//! [store]
//! type = "memory"
//! "#,
//! )?;
//! let manager = KvManagerStore::from_config(&config)?;
//!
//! let session = manager
//!     .create(CancellationToken::new(), "s1", Duration::from_secs(10))
//!     .await?;
//! session.set("foo", "bar").await;
//! session.save().await?;
//!
//! let session = manager
//!     .update(CancellationToken::new(), "s1", Duration::from_secs(10))
//!     .await?;
//! assert_eq!(session.get("foo").await, Some("bar".into()));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
mod error;
pub mod manager;
pub mod session;
pub mod store;

pub use error::{CodecError, Error, Result};
