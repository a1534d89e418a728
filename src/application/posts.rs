//! The posts page: load through the cache, clear, invalidate.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use crate::application::error::AppError;
use crate::application::notify::Notifier;
use crate::application::source::PostsSource;
use crate::cache::{CacheAside, CacheError, FetchRequest, ServedFrom, Ttl};
use crate::config::PostsSettings;
use crate::domain::posts::{self, Post};

const RELOAD_HINT: &str =
    "Reload the page to retrieve the posts from cache and see the difference.";
const CLEAR_HINT: &str = "Clear the cache and try again";
const REPOPULATE_HINT: &str = "Try loading again to query the API and re-populate the cache";

/// How the posts are cached.
#[derive(Debug, Clone)]
pub struct PostsPolicy {
    pub cache_key: String,
    pub ttl: Ttl,
    pub tags: Vec<String>,
    pub fetch_timeout: Duration,
}

impl From<&PostsSettings> for PostsPolicy {
    fn from(settings: &PostsSettings) -> Self {
        Self {
            cache_key: settings.cache_key.clone(),
            ttl: settings.ttl,
            tags: settings.tags.clone(),
            fetch_timeout: settings.fetch_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub posts: Vec<Post>,
    pub served_from: ServedFrom,
    pub elapsed: Duration,
}

impl LoadReport {
    /// "cache" or "API", as shown to the reader.
    pub fn means(&self) -> &'static str {
        match self.served_from {
            ServedFrom::Store => "cache",
            ServedFrom::Fallback => "API",
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn summary(&self) -> String {
        let line = format!(
            "The duration for loading the posts has been {:.2} ms using the {}.",
            self.elapsed_ms(),
            self.means()
        );
        match self.served_from {
            ServedFrom::Fallback => format!("{line} {RELOAD_HINT}"),
            ServedFrom::Store => line,
        }
    }
}

pub struct PostsService {
    cache: Arc<CacheAside>,
    source: Arc<dyn PostsSource>,
    notifier: Arc<dyn Notifier>,
    policy: PostsPolicy,
}

impl PostsService {
    pub fn new(
        cache: Arc<CacheAside>,
        source: Arc<dyn PostsSource>,
        notifier: Arc<dyn Notifier>,
        policy: PostsPolicy,
    ) -> Self {
        Self {
            cache,
            source,
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> &PostsPolicy {
        &self.policy
    }

    /// Loads the posts, from the cache while they are live and from the API
    /// otherwise.
    #[instrument(skip(self), fields(key = %self.policy.cache_key))]
    pub async fn load(&self) -> Result<LoadReport, AppError> {
        let request = FetchRequest::new(
            self.policy.cache_key.as_str(),
            self.policy.ttl,
            self.policy.fetch_timeout,
        )
        .with_tags(self.policy.tags.iter().cloned());

        let lookup = match self
            .cache
            .get_or_fetch(request, || self.source.fetch_posts())
            .await
        {
            Ok(lookup) => lookup,
            Err(err) => {
                self.notifier
                    .error(&format!("The posts could not be loaded: {err}"));
                return Err(err.into());
            }
        };

        let posts = match posts::decode(&lookup.payload) {
            Ok(posts) => posts,
            Err(err) => {
                if lookup.served_from == ServedFrom::Store {
                    warn!(error = %err, "cached posts payload is unreadable; dropping it");
                    self.cache.invalidate_key(&self.policy.cache_key)?;
                }
                return Err(err.into());
            }
        };

        self.notifier.status(match lookup.served_from {
            ServedFrom::Store => "From cache",
            ServedFrom::Fallback => "From remote",
        });

        Ok(LoadReport {
            posts,
            served_from: lookup.served_from,
            elapsed: lookup.elapsed,
        })
    }

    /// Removes the posts from the cache, then loads them again.
    #[instrument(skip(self), fields(key = %self.policy.cache_key))]
    pub async fn clear(&self) -> Result<LoadReport, AppError> {
        let removed = self.is_cached()? && self.cache.invalidate_key(&self.policy.cache_key)?;
        if removed {
            self.notifier.status("Posts have been removed from cache.");
        } else {
            self.notifier.error("No posts in cache.");
        }

        self.load().await
    }

    /// Invalidates everything carrying the posts' tags. Returns how many
    /// entries were removed.
    #[instrument(skip(self), fields(tags = ?self.policy.tags))]
    pub fn invalidate(&self) -> Result<usize, AppError> {
        if !self.is_cached()? {
            self.notifier.status("There aren't any data in the cache");
            return Ok(0);
        }

        let removed = self.cache.invalidate_by_tags(&self.policy.tags)?;
        self.notifier.status("Invalidated cache with tags");
        Ok(removed)
    }

    pub fn is_cached(&self) -> Result<bool, CacheError> {
        Ok(self.cache.peek(&self.policy.cache_key)?.is_some())
    }

    /// The follow-up offered after a load: clear when the posts came from the
    /// cache, reload when nothing is cached any more.
    pub fn follow_up(&self, report: &LoadReport) -> Result<Option<&'static str>, AppError> {
        let cached = self.is_cached()?;
        Ok(match (report.served_from, cached) {
            (_, false) => Some(REPOPULATE_HINT),
            (ServedFrom::Store, true) => Some(CLEAR_HINT),
            (ServedFrom::Fallback, true) => None,
        })
    }
}
