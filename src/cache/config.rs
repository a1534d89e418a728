//! Cache configuration.
//!
//! Controls store capacity, background expiry purging and index strictness
//! via the `[cache]` table of `cachet.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAX_ENTRIES: usize = 1024;
const DEFAULT_PURGE_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup goes straight to the remote source and
    /// nothing is stored.
    pub enabled: bool,
    /// Maximum entries held by the in-memory store; zero means unbounded.
    pub max_entries: usize,
    /// Interval (ms) between background purges of expired entries; zero
    /// disables the janitor.
    pub purge_interval_ms: u64,
    /// Report dangling index references as errors instead of only healing
    /// them.
    pub strict_index: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
            purge_interval_ms: DEFAULT_PURGE_INTERVAL_MS,
            strict_index: false,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_entries: settings.max_entries,
            purge_interval_ms: settings.purge_interval_ms,
            strict_index: settings.strict_index,
        }
    }
}

impl CacheConfig {
    /// Store capacity, or `None` for an unbounded store.
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_entries)
    }

    pub fn purge_interval(&self) -> Option<Duration> {
        (self.purge_interval_ms > 0).then(|| Duration::from_millis(self.purge_interval_ms))
    }

    /// Settings suited to tests: unbounded, no janitor, strict index checks.
    pub fn strict() -> Self {
        Self {
            max_entries: 0,
            purge_interval_ms: 0,
            strict_index: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_entries, 1024);
        assert_eq!(config.purge_interval_ms, 30_000);
        assert!(!config.strict_index);
    }

    #[test]
    fn zero_capacity_means_unbounded() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert!(config.capacity().is_none());
    }

    #[test]
    fn zero_interval_disables_purging() {
        let config = CacheConfig {
            purge_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.purge_interval().is_none());
        assert_eq!(
            CacheConfig::default().purge_interval(),
            Some(Duration::from_secs(30))
        );
    }
}
