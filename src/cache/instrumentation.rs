//! Which path served a lookup, how long it took, and running totals.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, gauge, histogram};

pub const METRIC_LOOKUP_TOTAL: &str = "cachet_lookup_total";
pub const METRIC_LOOKUP_MS: &str = "cachet_lookup_ms";
pub const METRIC_FETCH_TOTAL: &str = "cachet_fetch_total";
pub const METRIC_FETCH_FAILED_TOTAL: &str = "cachet_fetch_failed_total";
pub const METRIC_INVALIDATED_TOTAL: &str = "cachet_invalidated_total";
pub const METRIC_EVICTED_TOTAL: &str = "cachet_evicted_total";
pub const METRIC_PURGED_TOTAL: &str = "cachet_purged_total";
pub const METRIC_INDEX_DANGLING_TOTAL: &str = "cachet_index_dangling_total";
pub const METRIC_ENTRIES: &str = "cachet_entries";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServedFrom {
    /// A live entry was already in the store.
    Store,
    /// The remote source was consulted (directly or via a shared flight).
    Fallback,
}

impl ServedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedFrom::Store => "store",
            ServedFrom::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ServedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CacheAside::get_or_fetch`](super::CacheAside::get_or_fetch).
#[derive(Debug, Clone)]
pub struct Lookup {
    pub payload: Bytes,
    pub served_from: ServedFrom,
    pub elapsed: Duration,
}

impl Lookup {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    store_hits: AtomicU64,
    fallbacks: AtomicU64,
    joined_flights: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    superseded_writes: AtomicU64,
    invalidated: AtomicU64,
    evicted: AtomicU64,
    purged: AtomicU64,
    dangling: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub store_hits: u64,
    pub fallbacks: u64,
    pub joined_flights: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub superseded_writes: u64,
    pub invalidated: u64,
    pub evicted: u64,
    pub purged: u64,
    pub dangling: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            store_hits: self.store_hits.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            joined_flights: self.joined_flights.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            superseded_writes: self.superseded_writes.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            dangling: self.dangling.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_lookup(&self, served_from: ServedFrom, elapsed: Duration) {
        let counter_ref = match served_from {
            ServedFrom::Store => &self.store_hits,
            ServedFrom::Fallback => &self.fallbacks,
        };
        counter_ref.fetch_add(1, Ordering::Relaxed);

        counter!(METRIC_LOOKUP_TOTAL, "served_from" => served_from.as_str()).increment(1);
        histogram!(METRIC_LOOKUP_MS, "served_from" => served_from.as_str())
            .record(elapsed.as_secs_f64() * 1000.0);
    }

    pub(crate) fn record_join(&self) {
        self.joined_flights.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_FETCH_TOTAL).increment(1);
    }

    pub(crate) fn record_fetch_failure(&self, reason: &'static str) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_FETCH_FAILED_TOTAL, "reason" => reason).increment(1);
    }

    pub(crate) fn record_superseded_write(&self) {
        self.superseded_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidated(&self, via: &'static str, count: u64) {
        self.invalidated.fetch_add(count, Ordering::Relaxed);
        counter!(METRIC_INVALIDATED_TOTAL, "via" => via).increment(count);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_EVICTED_TOTAL).increment(1);
    }

    pub(crate) fn record_purged(&self, count: u64) {
        self.purged.fetch_add(count, Ordering::Relaxed);
        counter!(METRIC_PURGED_TOTAL).increment(count);
    }

    pub(crate) fn record_dangling(&self) {
        self.dangling.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_INDEX_DANGLING_TOTAL).increment(1);
    }

    pub(crate) fn record_entries(&self, entries: usize) {
        gauge!(METRIC_ENTRIES).set(entries as f64);
    }
}
