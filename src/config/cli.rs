use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Cachet binary.
#[derive(Debug, Parser)]
#[command(name = "cachet", version, about = "Cache-aside demo over a remote posts API")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CACHET_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Replay a sequence of page actions against the posts API.
    Run(Box<RunArgs>),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Actions to replay, in order.
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values = ["load", "load", "clear", "invalidate", "load"]
    )]
    pub steps: Vec<Step>,

    /// Print the title of each post after a load.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub show_posts: bool,

    /// Pause between steps, in milliseconds.
    #[arg(long = "pause-ms", value_name = "MILLIS", default_value_t = 0)]
    pub pause_ms: u64,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            overrides: RunOverrides::default(),
            steps: Step::page_flow(),
            show_posts: false,
            pause_ms: 0,
        }
    }
}

/// One page action of the posts demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Step {
    /// Load the posts, from the cache when possible.
    Load,
    /// Remove the posts from the cache, then load again.
    Clear,
    /// Invalidate every entry carrying the posts' tags.
    Invalidate,
    /// Report whether the posts are currently cached.
    Status,
}

impl Step {
    /// The default sequence: miss, hit, clear and reload, invalidate, miss.
    pub fn page_flow() -> Vec<Step> {
        vec![
            Step::Load,
            Step::Load,
            Step::Clear,
            Step::Invalidate,
            Step::Load,
        ]
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Enable or bypass the cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the store capacity; zero means unbounded.
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub cache_max_entries: Option<usize>,

    /// Override the expired-entry purge interval; zero disables it.
    #[arg(long = "cache-purge-interval-ms", value_name = "MILLIS")]
    pub cache_purge_interval_ms: Option<u64>,

    /// Fail operations that find a dangling tag index reference.
    #[arg(
        long = "cache-strict-index",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_strict_index: Option<bool>,

    /// Override the posts API URL.
    #[arg(long = "posts-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub posts_url: Option<String>,

    /// Override how long fetched posts stay cached; zero caches them permanently.
    #[arg(long = "posts-ttl-seconds", value_name = "SECONDS")]
    pub posts_ttl_seconds: Option<u64>,

    /// Override the remote fetch timeout.
    #[arg(long = "posts-fetch-timeout-ms", value_name = "MILLIS")]
    pub posts_fetch_timeout_ms: Option<u64>,
}
