//! Per-key mutual exclusion for read-modify-write record updates.
//!
//! Chunk arrivals for the same (session, upload-id) may land on
//! different worker threads concurrently; each handler must read the
//! received-set, merge one index, and write it back. A keyed lock
//! serializes that cycle per upload without serializing unrelated
//! uploads against each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of named async locks, created on first use.
///
/// Entries are never removed: dropping one while a task still waits on
/// the old mutex would let that waiter and a fresh acquirer hold the
/// same key at once. An entry is one `Arc` and mutex per distinct
/// upload key, so the map stays small over a process lifetime.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    ///
    /// The guard is owned so it can cross await points freely.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key.to_owned()).or_default())
        };
        lock.lock_owned().await
    }
}
