//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{collections::BTreeSet, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{ArchiveType, PostType};

pub use cli::{CliArgs, Command, KeyArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pagecache";
const ENV_PREFIX: &str = "PAGECACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;
const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 86_400;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;
const DEFAULT_CACHE_MAX_ENTRY_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_STATISTICS_DIR: &str = "stats";
const DEFAULT_SESSION_COOKIE: &str = "pagecache_session";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
    pub homepage: bool,
    pub post_types: BTreeSet<PostType>,
    pub archives: BTreeSet<ArchiveType>,
    pub ttl: Duration,
    pub visible_to_authenticated: bool,
    pub max_entries: usize,
    pub max_entry_bytes: usize,
    pub report: ReportSettings,
    pub statistics: StatisticsSettings,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportSettings {
    pub footer: bool,
    pub widget: bool,
}

#[derive(Debug, Clone)]
pub struct StatisticsSettings {
    pub enabled: bool,
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub session_cookie: String,
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
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.post_types")
            .with_list_parse_key("cache.archives"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Key(_)) | None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(homepage) = overrides.cache_homepage {
            self.cache.homepage = Some(homepage);
        }
        if !overrides.cache_post_types.is_empty() {
            self.cache.post_types = Some(overrides.cache_post_types.clone());
        }
        if !overrides.cache_archives.is_empty() {
            self.cache.archives = Some(overrides.cache_archives.clone());
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(visible) = overrides.cache_visible_to_authenticated {
            self.cache.visible_to_authenticated = Some(visible);
        }
        if let Some(max) = overrides.cache_max_entries {
            self.cache.max_entries = Some(max);
        }
        if let Some(max) = overrides.cache_max_entry_bytes {
            self.cache.max_entry_bytes = Some(max);
        }
        if let Some(footer) = overrides.cache_report_footer {
            self.cache.report.footer = Some(footer);
        }
        if let Some(widget) = overrides.cache_report_widget {
            self.cache.report.widget = Some(widget);
        }
        if let Some(enabled) = overrides.cache_statistics_enabled {
            self.cache.statistics.enabled = Some(enabled);
        }
        if let Some(directory) = overrides.cache_statistics_directory.as_ref() {
            self.cache.statistics.directory = Some(directory.clone());
        }
        if let Some(cookie) = overrides.auth_session_cookie.as_ref() {
            self.auth.session_cookie = Some(cookie.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            auth: build_auth_settings(auth)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let post_types = parse_set(cache.post_types, "cache.post_types")?;
    let archives = parse_set(cache.archives, "cache.archives")?;

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }
    if ttl_seconds > MAX_CACHE_TTL_SECS {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            format!("must not exceed {MAX_CACHE_TTL_SECS} (ten years)"),
        ));
    }

    let max_entry_bytes = cache
        .max_entry_bytes
        .unwrap_or(DEFAULT_CACHE_MAX_ENTRY_BYTES);
    if max_entry_bytes == 0 {
        return Err(LoadError::invalid(
            "cache.max_entry_bytes",
            "must be greater than zero",
        ));
    }

    let directory = cache
        .statistics
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATISTICS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.statistics.directory",
            "path must not be empty",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(false),
        homepage: cache.homepage.unwrap_or(true),
        post_types,
        archives,
        ttl: Duration::from_secs(ttl_seconds),
        visible_to_authenticated: cache.visible_to_authenticated.unwrap_or(false),
        max_entries: cache
            .max_entries
            .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES)
            .max(1),
        max_entry_bytes,
        report: ReportSettings {
            footer: cache.report.footer.unwrap_or(false),
            widget: cache.report.widget.unwrap_or(false),
        },
        statistics: StatisticsSettings {
            enabled: cache.statistics.enabled.unwrap_or(false),
            directory,
        },
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let session_cookie = auth
        .session_cookie
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
    if session_cookie.is_empty() {
        return Err(LoadError::invalid(
            "auth.session_cookie",
            "cookie name must not be empty",
        ));
    }

    Ok(AuthSettings { session_cookie })
}

fn parse_set<T>(values: Option<Vec<String>>, key: &'static str) -> Result<BTreeSet<T>, LoadError>
where
    T: FromStr<Err = String> + Ord,
{
    values
        .unwrap_or_default()
        .iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse::<T>().map_err(|reason| LoadError::invalid(key, reason)))
        .collect()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
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
    homepage: Option<bool>,
    post_types: Option<Vec<String>>,
    archives: Option<Vec<String>>,
    ttl_seconds: Option<u64>,
    visible_to_authenticated: Option<bool>,
    max_entries: Option<usize>,
    max_entry_bytes: Option<usize>,
    report: RawReportSettings,
    statistics: RawStatisticsSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReportSettings {
    footer: Option<bool>,
    widget: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStatisticsSettings {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    session_cookie: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
