//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::Ttl;

mod cli;

pub use cli::{CliArgs, Command, RunArgs, RunOverrides, Step};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachet";
const DEFAULT_MAX_ENTRIES: usize = 1024;
const DEFAULT_PURGE_INTERVAL_MS: u64 = 30_000;
const DEFAULT_POSTS_URL: &str = "http://jsonplaceholder.typicode.com/posts";
const DEFAULT_POSTS_CACHE_KEY: &str = "cache_demo_posts";
const DEFAULT_POSTS_TTL_SECS: u64 = 60;
const DEFAULT_POSTS_FETCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_POSTS_TAGS: [&str; 3] = ["tag_1", "tag_2", "tag_3"];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub posts: PostsSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: usize,
    pub purge_interval_ms: u64,
    pub strict_index: bool,
}

#[derive(Debug, Clone)]
pub struct PostsSettings {
    pub url: Url,
    pub cache_key: String,
    pub ttl: Ttl,
    pub tags: Vec<String>,
    pub fetch_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("CACHET")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("posts.tags")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Run(args)) => raw.apply_run_overrides(&args.overrides),
        None => raw.apply_run_overrides(&RunOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    posts: RawPostsSettings,
}

impl RawSettings {
    fn apply_run_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(max_entries) = overrides.cache_max_entries {
            self.cache.max_entries = Some(max_entries);
        }
        if let Some(interval) = overrides.cache_purge_interval_ms {
            self.cache.purge_interval_ms = Some(interval);
        }
        if let Some(strict) = overrides.cache_strict_index {
            self.cache.strict_index = Some(strict);
        }
        if let Some(url) = overrides.posts_url.as_ref() {
            self.posts.url = Some(url.clone());
        }
        if let Some(ttl) = overrides.posts_ttl_seconds {
            self.posts.ttl_seconds = Some(ttl);
        }
        if let Some(timeout) = overrides.posts_fetch_timeout_ms {
            self.posts.fetch_timeout_ms = Some(timeout);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            posts,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache);
        let posts = build_posts_settings(posts)?;

        Ok(Self {
            logging,
            cache,
            posts,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        max_entries: cache.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
        purge_interval_ms: cache.purge_interval_ms.unwrap_or(DEFAULT_PURGE_INTERVAL_MS),
        strict_index: cache.strict_index.unwrap_or(false),
    }
}

fn build_posts_settings(posts: RawPostsSettings) -> Result<PostsSettings, LoadError> {
    let raw_url = posts.url.unwrap_or_else(|| DEFAULT_POSTS_URL.to_string());
    let url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("posts.url", format!("`{raw_url}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "posts.url",
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }

    let cache_key = posts
        .cache_key
        .map(|key| key.trim().to_string())
        .unwrap_or_else(|| DEFAULT_POSTS_CACHE_KEY.to_string());
    if cache_key.is_empty() {
        return Err(LoadError::invalid("posts.cache_key", "must not be empty"));
    }

    let ttl = match posts.ttl_seconds.unwrap_or(DEFAULT_POSTS_TTL_SECS) {
        0 => Ttl::Forever,
        secs => Ttl::seconds(secs),
    };

    let tags: Vec<String> = match posts.tags {
        Some(tags) => tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .collect(),
        None => DEFAULT_POSTS_TAGS.iter().map(|tag| tag.to_string()).collect(),
    };
    if tags.iter().any(String::is_empty) {
        return Err(LoadError::invalid("posts.tags", "tags must not be empty"));
    }

    let fetch_timeout_ms = posts
        .fetch_timeout_ms
        .unwrap_or(DEFAULT_POSTS_FETCH_TIMEOUT_MS);
    if fetch_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "posts.fetch_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(PostsSettings {
        url,
        cache_key,
        ttl,
        tags,
        fetch_timeout: Duration::from_millis(fetch_timeout_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    max_entries: Option<usize>,
    purge_interval_ms: Option<u64>,
    strict_index: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPostsSettings {
    url: Option<String>,
    cache_key: Option<String>,
    ttl_seconds: Option<u64>,
    tags: Option<Vec<String>>,
    fetch_timeout_ms: Option<u64>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
