//! Session store contracts.
//!
//! A session framework talks to its storage backend through two traits:
//!
//! * [`ManagerStore`] creates, loads, rotates and removes whole sessions,
//! * [`SessionStore`] is the handle for a single session, buffering its
//!   values in memory until [`SessionStore::save`] is called.
//!
//! [`KvManagerStore`](crate::manager::KvManagerStore) implements both on top
//! of any [`CacheClient`](crate::client::CacheClient), but the traits are
//! backend-agnostic.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Manages the lifecycle of sessions in a backend.
///
/// `expiry` is the time-to-live given to the session record on its next
/// write. [`Duration::ZERO`] means the record never expires.
pub trait ManagerStore: Send + Sync + 'static {
    /// The session handle produced by this manager.
    type Store: SessionStore;

    /// Returns an empty handle for `session_id` without touching the backend.
    ///
    /// An existing record for the same ID is not read; it is overwritten by
    /// the handle's first [`SessionStore::save`].
    ///
    /// # Errors
    ///
    /// Backends may return an error if they cannot allocate the handle.
    fn create(
        &self,
        ctx: CancellationToken,
        session_id: &str,
        expiry: Duration,
    ) -> impl Future<Output = Result<Self::Store>> + Send;

    /// Loads the session `session_id` and resets its time-to-live.
    ///
    /// A missing session is not an error: an empty handle is returned, just
    /// like [`ManagerStore::create`] would.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or the stored
    /// payload cannot be decoded.
    fn update(
        &self,
        ctx: CancellationToken,
        session_id: &str,
        expiry: Duration,
    ) -> impl Future<Output = Result<Self::Store>> + Send;

    /// Removes the session `session_id`. Succeeds if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn delete(
        &self,
        ctx: &CancellationToken,
        session_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns `true` if the session `session_id` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn check(
        &self,
        ctx: &CancellationToken,
        session_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Moves the session `old_session_id` to `session_id`.
    ///
    /// Once this returns successfully the old ID no longer exists and the new
    /// one holds the old values. If the old session does not exist, an empty
    /// handle bound to `session_id` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or the stored
    /// payload cannot be decoded.
    fn refresh(
        &self,
        ctx: CancellationToken,
        old_session_id: &str,
        session_id: &str,
        expiry: Duration,
    ) -> impl Future<Output = Result<Self::Store>> + Send;

    /// Releases the backend. The manager must not be used afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not be released cleanly.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// A handle to the values of a single session.
///
/// [`get`](SessionStore::get), [`set`](SessionStore::set) and
/// [`delete`](SessionStore::delete) only work on the in-memory copy. Changes
/// become visible to other handles after [`save`](SessionStore::save).
pub trait SessionStore: Send + Sync + 'static {
    /// Returns the cancellation token the handle was created with.
    fn context(&self) -> &CancellationToken;

    /// Returns the ID of the session.
    fn session_id(&self) -> &str;

    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = Option<Value>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(
        &self,
        key: impl Into<String> + Send,
        value: impl Into<Value> + Send,
    ) -> impl Future<Output = ()> + Send;

    /// Removes `key`, returning the value it held.
    fn delete(&self, key: &str) -> impl Future<Output = Option<Value>> + Send;

    /// Removes every value and immediately saves the now-empty session.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    fn flush(&self) -> impl Future<Output = Result<()>> + Send;

    /// Writes the current values to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the values cannot be encoded or the backend cannot
    /// be reached. An encoding failure leaves the stored record untouched.
    fn save(&self) -> impl Future<Output = Result<()>> + Send;
}
