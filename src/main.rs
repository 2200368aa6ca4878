use std::{process, sync::Arc};

use pagecache::{
    application::{error::AppError, site::SiteCatalog},
    cache::{
        CacheConfig, CacheState, MemoryStore, PageCache, PrefixClassifier, derive_key,
        is_script_path,
    },
    config,
    infra::{
        http::{self, HttpState},
        telemetry,
    },
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
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => {
            telemetry::init(&settings.logging)?;
            run_serve(settings).await
        }
        config::Command::Key(args) => {
            run_key(&args.path);
            Ok(())
        }
    }
}

fn run_key(path: &str) {
    if is_script_path(path) {
        println!("{path}: script path, bypasses the cache");
    } else {
        println!("{}", derive_key(path));
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let http_state = build_http_state(&settings);
    let router = http::build_router(http_state);

    info!(
        target = "pagecache::serve",
        addr = %settings.server.addr,
        cache_enabled = settings.cache.enabled,
        ttl_secs = settings.cache.ttl.as_secs(),
        statistics = settings.cache.statistics.enabled,
        "starting pagecache"
    );

    http::serve(router, settings.server.addr, settings.server.graceful_shutdown).await?;
    Ok(())
}

fn build_http_state(settings: &config::Settings) -> HttpState {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(MemoryStore::new(&cache_config));
    let cache = Arc::new(PageCache::new(cache_config, store));
    let cache_state = CacheState::new(
        cache,
        Arc::new(PrefixClassifier::default()),
        settings.auth.session_cookie.as_str(),
    );

    HttpState {
        site: Arc::new(SiteCatalog::demo()),
        cache: Some(cache_state),
    }
}
