use std::{process, sync::Arc, time::Duration};

use cachet::{
    application::{
        error::AppError,
        notify::TracingNotifier,
        posts::{LoadReport, PostsPolicy, PostsService},
        source::PostsSource,
    },
    cache::{CacheAside, CacheConfig, Clock, SystemClock, spawn_janitor},
    config,
    infra::{posts_api::HttpPostsSource, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, kind = error.presentation_message(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, kind = error.presentation_message(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Run(Box::<config::RunArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Run(args) => run_steps(settings, *args).await,
    }
}

async fn run_steps(settings: config::Settings, args: config::RunArgs) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(CacheAside::in_memory(cache_config.clone(), clock));

    let janitor_handle = cache_config
        .purge_interval()
        .filter(|_| cache_config.enabled)
        .map(|every| spawn_janitor(Arc::clone(&cache), every));

    let source: Arc<dyn PostsSource> = Arc::new(HttpPostsSource::new(settings.posts.url.clone())?);
    let service = PostsService::new(
        Arc::clone(&cache),
        source,
        Arc::new(TracingNotifier),
        PostsPolicy::from(&settings.posts),
    );

    info!(
        target = "cachet::run",
        url = %settings.posts.url,
        steps = args.steps.len(),
        cache_enabled = cache_config.enabled,
        "Starting posts demo"
    );

    let result = replay(&service, &args).await;

    if let Some(handle) = janitor_handle {
        handle.abort();
        let _ = handle.await;
    }

    let stats = cache.stats();
    info!(
        target = "cachet::run",
        store_hits = stats.store_hits,
        fallbacks = stats.fallbacks,
        fetches = stats.fetches,
        invalidated = stats.invalidated,
        "Posts demo finished"
    );

    result
}

async fn replay(service: &PostsService, args: &config::RunArgs) -> Result<(), AppError> {
    let pause = Duration::from_millis(args.pause_ms);

    for (position, step) in args.steps.iter().enumerate() {
        if position > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        println!("[{}] {:?}", position + 1, step);
        match step {
            config::Step::Load => {
                let report = service.load().await?;
                print_load(service, &report, args.show_posts)?;
            }
            config::Step::Clear => {
                let report = service.clear().await?;
                print_load(service, &report, args.show_posts)?;
            }
            config::Step::Invalidate => {
                let removed = service.invalidate()?;
                println!("    invalidated {removed} entries");
            }
            config::Step::Status => {
                let cached = service.is_cached()?;
                println!("    posts cached: {cached}");
            }
        }
    }

    Ok(())
}

fn print_load(service: &PostsService, report: &LoadReport, show_posts: bool) -> Result<(), AppError> {
    println!("    {}", report.summary());
    if show_posts {
        for post in &report.posts {
            println!("    #{:<3} {}", post.id, post.title);
        }
    }
    if let Some(hint) = service.follow_up(report)? {
        println!("    {hint}");
    }
    Ok(())
}
