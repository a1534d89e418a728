//! Background purge of expired entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::aside::CacheAside;

/// Spawns a task that calls [`CacheAside::purge_expired`] every `every`.
///
/// Expired entries are already invisible to readers; the janitor only
/// reclaims their memory and index memberships. Abort the handle to stop it.
pub fn spawn_janitor(cache: Arc<CacheAside>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            match cache.purge_expired() {
                Ok(0) => {}
                Ok(purged) => debug!(target = "cachet::janitor", purged, "expired entries reclaimed"),
                Err(err) => warn!(target = "cachet::janitor", error = %err, "expired entry purge failed"),
            }
        }
    })
}
