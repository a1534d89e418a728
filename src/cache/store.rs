//! Key-value storage backends.
//!
//! A [`Store`] is a plain key → [`Entry`] map. It knows nothing about tags:
//! keeping the tag index in step with store writes is the job of
//! [`CacheAside`](super::CacheAside).

use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use lru::LruCache;

use super::clock::Clock;
use super::entry::Entry;
use super::error::StoreError;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Abstract cache backend.
///
/// Implementations must not block or suspend; they are called while the
/// cache holds its commit lock.
pub trait Store: Send + Sync {
    /// Returns the entry only while it is live. No side effects.
    fn get(&self, key: &str) -> Result<Option<Entry>, StoreError>;

    /// Stores `entry` under `key`, replacing any previous entry.
    ///
    /// Returns the key of another entry dropped to make room, if any.
    fn set(&self, key: &str, entry: Entry) -> Result<Option<String>, StoreError>;

    /// Physically removes the entry, live or stale.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All physically present keys. For index rebuilds and debugging.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// The raw entry regardless of expiry. For index rebuilds and debugging.
    fn inspect(&self, key: &str) -> Result<Option<Entry>, StoreError>;

    /// Removes every stale entry and returns the removed keys.
    fn purge_expired(&self) -> Result<Vec<String>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// In-process store with an optional capacity.
///
/// When full, the least recently *written* entry is dropped. Reads do not
/// refresh recency so that `get` stays free of side effects.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>, capacity: NonZeroUsize) -> Self {
        Self {
            clock,
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn unbounded(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(LruCache::unbounded()),
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let now = self.clock.now();
        Ok(rw_read(&self.entries, SOURCE, "get")
            .peek(key)
            .filter(|entry| entry.is_live_at(now))
            .cloned())
    }

    fn set(&self, key: &str, entry: Entry) -> Result<Option<String>, StoreError> {
        let evicted = rw_write(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        // `push` also hands back the replaced pair when the key already existed.
        Ok(evicted.and_then(|(evicted_key, _)| (evicted_key != key).then_some(evicted_key)))
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(rw_write(&self.entries, SOURCE, "delete").pop(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn inspect(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "inspect").peek(key).cloned())
    }

    fn purge_expired(&self) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_live_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key.as_str());
        }
        Ok(stale)
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "len").len())
    }
}
