//! Key → live session table with atomic check-and-insert / check-and-remove

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, ResourceKind, Result};

/// Something a session table can cancel when the key is stopped
pub trait Cancel {
    fn cancel(&self);
}

/// Cancellation capability for one background session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    token: CancellationToken,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token observed by the session's task(s)
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancel for SessionHandle {
    fn cancel(&self) {
        self.token.cancel();
    }
}

/// Table of live sessions for one kind of resource.
///
/// All operations on a table are serialized by one lock; `start` holds it
/// while the session is being launched, so two concurrent starts on the same
/// key cannot both observe it idle.
pub struct SessionTable<K, V = SessionHandle> {
    kind: ResourceKind,
    sessions: Mutex<HashMap<K, V>>,
}

impl<K, V> SessionTable<K, V>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Launch a session for `key` if it is idle.
    ///
    /// `launch` runs under the table lock and returns the value to store plus
    /// whatever the caller wants back. When it fails nothing is inserted.
    pub async fn start<T, F, Fut>(&self, key: K, launch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(V, T)>>,
    {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&key) {
            return Err(Error::busy(self.kind, key.to_string()));
        }

        let (value, output) = launch().await?;
        debug!("{} {} started", self.kind, key);
        sessions.insert(key, value);
        Ok(output)
    }

    /// Insert `value` for `key` if the key is idle, without launching anything
    pub async fn reserve(&self, key: K, value: V) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&key) {
            return Err(Error::busy(self.kind, key.to_string()));
        }
        sessions.insert(key, value);
        Ok(())
    }

    /// Remove the entry for `key`
    pub async fn remove(&self, key: &K) -> Result<V> {
        self.sessions
            .lock()
            .await
            .remove(key)
            .ok_or_else(|| Error::not_found(self.kind, key.to_string()))
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

impl<K, V> SessionTable<K, V>
where
    K: Eq + Hash + Clone + Display + Ord,
{
    /// Sorted snapshot of the live keys
    pub async fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.sessions.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<K, V> SessionTable<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Cancel,
{
    /// Remove the entry for `key` and cancel it.
    ///
    /// Returns as soon as the cancellation is signalled; the task exits at its
    /// next I/O boundary.
    pub async fn stop(&self, key: &K) -> Result<V> {
        let value = self.remove(key).await?;
        value.cancel();
        debug!("{} {} stopped", self.kind, key);
        Ok(value)
    }

    /// Cancel and remove every live session. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        for (_, value) in sessions.drain() {
            value.cancel();
        }
        count
    }
}
