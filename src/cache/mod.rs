//! Cachet cache-aside layer
//!
//! Wraps a slow remote source with a tagged key-value cache:
//!
//! - **Store**: key → [`Entry`] with per-entry TTL, judged against an
//!   injected [`Clock`]
//! - **Tag index**: bidirectional tag ↔ key membership, kept in step with
//!   the store under one commit lock
//! - **Single flight**: concurrent misses on a key share one remote fetch
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `cachet.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! max_entries = 1024
//! purge_interval_ms = 30000
//! strict_index = false
//! ```

mod aside;
mod clock;
mod config;
mod entry;
mod error;
mod flight;
mod index;
mod instrumentation;
mod janitor;
mod lock;
mod store;

pub use aside::{CacheAside, FetchRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{Entry, EntryStatus, Expiry, Ttl};
pub use error::{CacheError, FetchError, StoreError};
pub use index::TagIndex;
pub use instrumentation::{
    CacheStats, Lookup, METRIC_ENTRIES, METRIC_EVICTED_TOTAL, METRIC_FETCH_FAILED_TOTAL,
    METRIC_FETCH_TOTAL, METRIC_INDEX_DANGLING_TOTAL, METRIC_INVALIDATED_TOTAL, METRIC_LOOKUP_MS,
    METRIC_LOOKUP_TOTAL, METRIC_PURGED_TOTAL, ServedFrom, StatsSnapshot,
};
pub use janitor::spawn_janitor;
pub(crate) use lock::mutex_lock;
pub use store::{MemoryStore, Store};
