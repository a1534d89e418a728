//! Cache-aside orchestration.
//!
//! [`CacheAside`] owns a [`Store`] and its [`TagIndex`]. Every mutation of
//! the pair happens under one write lock, and every read of the store under
//! the matching read lock, so readers never observe a store write without
//! its index write.
//!
//! Concurrent misses on one key share a single fetch (see [`Flights`]). An
//! invalidation that lands while a fetch is in flight wins: the fetched
//! payload still reaches its callers but is not written back.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use super::clock::Clock;
use super::config::CacheConfig;
use super::entry::{Entry, Ttl};
use super::error::{CacheError, FetchError};
use super::flight::{Flight, FlightOutcome, Flights, Resolved};
use super::index::TagIndex;
use super::instrumentation::{CacheStats, Lookup, ServedFrom, StatsSnapshot};
use super::lock::{rw_read, rw_write};
use super::store::{MemoryStore, Store};

const SOURCE: &str = "cache::aside";

/// What to cache on a miss, and how long to wait for the remote source.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub key: String,
    pub ttl: Ttl,
    pub tags: BTreeSet<String>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(key: impl Into<String>, ttl: Ttl, timeout: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
            tags: BTreeSet::new(),
            timeout,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

pub struct CacheAside {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn Store>,
    index: RwLock<TagIndex>,
    flights: Flights,
    stats: CacheStats,
}

impl CacheAside {
    /// Wraps an existing backend, rebuilding the tag index from whatever it
    /// already holds.
    pub fn new(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn Store>,
    ) -> Result<Self, CacheError> {
        let cache = Self {
            config,
            clock,
            store,
            index: RwLock::new(TagIndex::new()),
            flights: Flights::new(),
            stats: CacheStats::default(),
        };
        cache.rebuild_index()?;
        Ok(cache)
    }

    /// A cache over a fresh [`MemoryStore`] sized from `config`.
    pub fn in_memory(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let store: Arc<dyn Store> = match config.capacity() {
            Some(capacity) => Arc::new(MemoryStore::new(Arc::clone(&clock), capacity)),
            None => Arc::new(MemoryStore::unbounded(Arc::clone(&clock))),
        };
        Self {
            config,
            clock,
            store,
            index: RwLock::new(TagIndex::new()),
            flights: Flights::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the live payload for `request.key`, fetching and caching it
    /// on a miss.
    ///
    /// `fetch` runs at most once per key at a time; callers arriving while a
    /// fetch is in flight wait for it and share its outcome. A failed or
    /// timed-out fetch is reported as [`CacheError::FetchFailed`] and leaves
    /// the store untouched.
    #[instrument(skip_all, fields(key = %request.key))]
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        request: FetchRequest,
        fetch: F,
    ) -> Result<Lookup, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
        E: Display,
    {
        let started = Instant::now();

        if !self.config.enabled {
            let payload = self
                .fetch_bounded(&request.key, request.timeout, fetch)
                .await?;
            return Ok(self.finish_lookup(payload, ServedFrom::Fallback, started));
        }

        if let Some(entry) = self.read_live(&request.key)? {
            return Ok(self.finish_lookup(entry.payload, ServedFrom::Store, started));
        }
        debug!("no live entry, falling back to remote source");

        let (flight, joined) = self.flights.join(&request.key, &request.tags);
        if joined {
            self.stats.record_join();
            debug!(flight_id = %flight.id, "joined in-flight fetch");
        }

        let outcome = flight
            .outcome(|| self.resolve(&flight, &request, fetch))
            .await;
        drop(flight);

        let resolved = outcome?;
        Ok(self.finish_lookup(resolved.payload, resolved.served_from, started))
    }

    /// Read-only view of the live entry under `key`. Never fetches.
    pub fn peek(&self, key: &str) -> Result<Option<Entry>, CacheError> {
        let entry = self.read_live(key)?;
        if entry.is_none() {
            debug!(key, "no live entry cached");
        }
        Ok(entry)
    }

    /// Deletes `key` and all of its tag memberships.
    pub fn invalidate_key(&self, key: &str) -> Result<bool, CacheError> {
        let mut index = rw_write(&self.index, SOURCE, "invalidate_key");
        self.flights.supersede_key(key);

        let removed = self.store.delete(key)?;
        let tags = index.forget_key(key);
        drop(index);

        if removed {
            self.stats.record_invalidated("key", 1);
            info!(key, tags = ?tags, "cache key invalidated");
            return Ok(true);
        }

        debug!(key, "nothing cached under key");
        if tags.is_empty() {
            return Ok(false);
        }
        self.heal_dangling(key).map_or(Ok(false), Err)
    }

    /// Deletes every key carrying any of `tags`. A key with several of the
    /// requested tags is deleted and counted once.
    pub fn invalidate_by_tags<I, S>(&self, tags: I) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: BTreeSet<String> = tags
            .into_iter()
            .map(|tag| tag.as_ref().to_string())
            .collect();

        let mut index = rw_write(&self.index, SOURCE, "invalidate_by_tags");
        let keys: BTreeSet<String> = tags
            .iter()
            .flat_map(|tag| index.keys_for_tag(tag))
            .collect();
        let superseded = self.flights.supersede_matching(&keys, &tags);

        let mut removed = 0;
        let mut dangling = None;
        for key in &keys {
            if self.store.delete(key)? {
                removed += 1;
            } else if let Some(err) = self.heal_dangling(key) {
                dangling.get_or_insert(err);
            }
            index.forget_key(key);
        }
        for tag in &tags {
            index.drop_tag(tag);
        }
        drop(index);

        self.stats.record_invalidated("tags", removed as u64);
        info!(
            tags = ?tags,
            removed,
            superseded_flights = superseded,
            "cache tags invalidated"
        );

        match dangling {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Drops every expired entry together with its tag memberships.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut index = rw_write(&self.index, SOURCE, "purge_expired");
        let purged = self.store.purge_expired()?;
        for key in &purged {
            index.forget_key(key);
        }
        drop(index);

        if !purged.is_empty() {
            self.stats.record_purged(purged.len() as u64);
            debug!(purged = purged.len(), "expired entries purged");
        }
        self.record_entries();
        Ok(purged.len())
    }

    /// Replaces the tag index with one derived from the store contents.
    pub fn rebuild_index(&self) -> Result<usize, CacheError> {
        let mut index = rw_write(&self.index, SOURCE, "rebuild_index");
        let mut rebuilt = TagIndex::new();
        for key in self.store.keys()? {
            if let Some(entry) = self.store.inspect(&key)? {
                rebuilt.retag(&key, &entry.tags);
            }
        }
        let indexed = rebuilt.key_count();
        *index = rebuilt;
        Ok(indexed)
    }

    /// Verifies that store and index agree in both directions.
    pub fn check_consistency(&self) -> Result<(), CacheError> {
        let index = rw_read(&self.index, SOURCE, "check_consistency");

        for key in self.store.keys()? {
            let Some(entry) = self.store.inspect(&key)? else {
                continue;
            };
            let indexed = index.tags_for_key(&key);
            if indexed != entry.tags || !entry.tags.iter().all(|tag| index.contains(tag, &key)) {
                return Err(CacheError::inconsistent_index(key));
            }
        }

        for tag in index.tags() {
            for key in index.keys_for_tag(tag) {
                match self.store.inspect(&key)? {
                    Some(entry) if entry.tags.contains(tag) => {}
                    _ => return Err(CacheError::inconsistent_index(key)),
                }
            }
        }

        for key in index.keys() {
            if self.store.inspect(key)?.is_none() {
                return Err(CacheError::inconsistent_index(key.clone()));
            }
        }

        Ok(())
    }

    pub fn keys_for_tag(&self, tag: &str) -> BTreeSet<String> {
        rw_read(&self.index, SOURCE, "keys_for_tag").keys_for_tag(tag)
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.store.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.store.is_empty()?)
    }

    /// Number of keys with a fetch currently in flight.
    pub fn inflight(&self) -> usize {
        self.flights.len()
    }

    fn read_live(&self, key: &str) -> Result<Option<Entry>, CacheError> {
        let _index = rw_read(&self.index, SOURCE, "read_live");
        Ok(self.store.get(key)?)
    }

    async fn resolve<F, Fut, E>(
        &self,
        flight: &Flight,
        request: &FetchRequest,
        fetch: F,
    ) -> FlightOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
        E: Display,
    {
        flight.claim();
        // A flight that closed between our miss and joining may have filled the key.
        if let Some(entry) = self.read_live(&flight.key)? {
            return Ok(Resolved {
                payload: entry.payload,
                served_from: ServedFrom::Store,
            });
        }

        debug!(flight_id = %flight.id, timeout = ?request.timeout, "fetching from remote source");
        let payload = self
            .fetch_bounded(&flight.key, request.timeout, fetch)
            .await?;
        self.commit(flight, request.ttl, payload.clone())?;

        Ok(Resolved {
            payload,
            served_from: ServedFrom::Fallback,
        })
    }

    async fn fetch_bounded<F, Fut, E>(
        &self,
        key: &str,
        timeout: Duration,
        fetch: F,
    ) -> Result<Bytes, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
        E: Display,
    {
        self.stats.record_fetch();
        let result = match tokio::time::timeout(timeout, fetch()).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(err)) => Err(FetchError::failed(err)),
            Err(_) => Err(FetchError::TimedOut(timeout)),
        };

        result.map_err(|err| {
            self.stats.record_fetch_failure(err.reason());
            warn!(key, error = %err, "remote fetch failed; nothing cached");
            CacheError::from(err)
        })
    }

    fn commit(&self, flight: &Flight, ttl: Ttl, payload: Bytes) -> Result<(), CacheError> {
        let mut index = rw_write(&self.index, SOURCE, "commit");
        if flight.is_superseded() {
            self.stats.record_superseded_write();
            info!(
                key = %flight.key,
                flight_id = %flight.id,
                "invalidated while fetching; result not cached"
            );
            return Ok(());
        }

        let entry = Entry::new(
            flight.key.clone(),
            payload,
            self.clock.now(),
            ttl,
            flight.tags.clone(),
        );
        let evicted = self.store.set(&flight.key, entry)?;
        index.retag(&flight.key, &flight.tags);
        if let Some(evicted_key) = evicted {
            index.forget_key(&evicted_key);
            self.stats.record_evicted();
            debug!(evicted_key, "entry evicted to make room");
        }
        drop(index);

        self.record_entries();
        Ok(())
    }

    fn finish_lookup(&self, payload: Bytes, served_from: ServedFrom, started: Instant) -> Lookup {
        let elapsed = started.elapsed();
        self.stats.record_lookup(served_from, elapsed);
        debug!(
            served_from = served_from.as_str(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "lookup served"
        );
        Lookup {
            payload,
            served_from,
            elapsed,
        }
    }

    /// Records an index entry that pointed at nothing. The caller has already
    /// removed it; in strict mode the violation is also returned.
    fn heal_dangling(&self, key: &str) -> Option<CacheError> {
        self.stats.record_dangling();
        warn!(key, "tag index referenced a key missing from the store; removed");
        self.config
            .strict_index
            .then(|| CacheError::inconsistent_index(key))
    }

    fn record_entries(&self) {
        if let Ok(entries) = self.store.len() {
            self.stats.record_entries(entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::error::StoreError;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn cache() -> (CacheAside, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = CacheAside::in_memory(CacheConfig::strict(), clock.clone());
        (cache, clock)
    }

    fn request(key: &str, tags: &[&str]) -> FetchRequest {
        FetchRequest::new(key, Ttl::seconds(60), TIMEOUT).with_tags(tags.iter().copied())
    }

    async fn populate(cache: &CacheAside, key: &str, tags: &[&str]) {
        let payload = Bytes::from(key.to_string());
        cache
            .get_or_fetch(request(key, tags), || async move {
                Ok::<_, StoreError>(payload)
            })
            .await
            .expect("populate");
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let (cache, _) = cache();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StoreError>(Bytes::from_static(b"payload"))
        };

        let first = cache
            .get_or_fetch(request("k", &["a"]), fetch)
            .await
            .expect("first");
        let second = cache
            .get_or_fetch(request("k", &["a"]), fetch)
            .await
            .expect("second");

        assert_eq!(first.served_from, ServedFrom::Fallback);
        assert_eq!(second.served_from, ServedFrom::Store);
        assert_eq!(second.payload, Bytes::from_static(b"payload"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cache.check_consistency().expect("consistent");
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let (cache, _) = cache();

        let err = cache
            .get_or_fetch(request("k", &["a"]), || async {
                Err::<Bytes, _>("upstream returned 502")
            })
            .await
            .expect_err("fetch should fail");

        assert_eq!(
            err,
            CacheError::FetchFailed(FetchError::Source("upstream returned 502".to_string()))
        );
        assert!(cache.peek("k").expect("peek").is_none());
        assert!(cache.keys_for_tag("a").is_empty());
        assert_eq!(cache.inflight(), 0);
        assert_eq!(cache.stats().fetch_failures, 1);
    }

    #[tokio::test]
    async fn repopulating_with_new_tags_moves_index_membership() {
        let (cache, clock) = cache();
        populate(&cache, "k", &["a", "b"]).await;
        clock.advance(Duration::from_secs(61));
        populate(&cache, "k", &["b", "c"]).await;

        assert!(cache.keys_for_tag("a").is_empty());
        assert!(cache.keys_for_tag("b").contains("k"));
        assert!(cache.keys_for_tag("c").contains("k"));
        cache.check_consistency().expect("consistent");
    }

    #[tokio::test]
    async fn invalidate_key_cleans_all_memberships() {
        let (cache, _) = cache();
        populate(&cache, "k", &["a", "b"]).await;

        assert!(cache.invalidate_key("k").expect("invalidate"));
        assert!(!cache.invalidate_key("k").expect("second invalidate"));
        assert!(cache.keys_for_tag("a").is_empty());
        assert!(cache.keys_for_tag("b").is_empty());
        cache.check_consistency().expect("consistent");
    }

    #[tokio::test]
    async fn key_in_several_requested_tags_counts_once() {
        let (cache, _) = cache();
        populate(&cache, "k", &["a", "b"]).await;

        assert_eq!(cache.invalidate_by_tags(["a", "b"]).expect("invalidate"), 1);
        assert!(cache.is_empty().expect("is_empty"));
    }

    #[tokio::test]
    async fn purge_expired_cleans_the_index() {
        let (cache, clock) = cache();
        populate(&cache, "short", &["a"]).await;
        clock.advance(Duration::from_secs(61));

        assert_eq!(cache.purge_expired().expect("purge"), 1);
        assert!(cache.keys_for_tag("a").is_empty());
        cache.check_consistency().expect("consistent");
    }

    #[tokio::test]
    async fn eviction_keeps_index_in_step() {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = CacheConfig {
            max_entries: 1,
            ..CacheConfig::strict()
        };
        let cache = CacheAside::in_memory(config, clock);
        populate(&cache, "first", &["a"]).await;
        populate(&cache, "second", &["a"]).await;

        assert_eq!(cache.keys_for_tag("a"), BTreeSet::from(["second".to_string()]));
        assert_eq!(cache.stats().evicted, 1);
        cache.check_consistency().expect("consistent");
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::strict()
        };
        let cache = CacheAside::in_memory(config, clock);
        populate(&cache, "k", &["a"]).await;
        populate(&cache, "k", &["a"]).await;

        let stats = cache.stats();
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.store_hits, 0);
        assert!(cache.is_empty().expect("is_empty"));
    }
}
