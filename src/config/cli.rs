use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pagecache binary.
#[derive(Debug, Parser)]
#[command(name = "pagecache", version, about = "Full-page HTTP response cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PAGECACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service with the page cache in front of the site.
    Serve(Box<ServeArgs>),
    /// Print the cache key derived for a request path.
    Key(KeyArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    /// Request path, e.g. `/posts/hello`.
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

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

    /// Master switch for page caching.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Cache the homepage.
    #[arg(
        long = "cache-homepage",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_homepage: Option<bool>,

    /// Singular content types to cache (post, page).
    #[arg(long = "cache-post-types", value_name = "TYPES", value_delimiter = ',')]
    pub cache_post_types: Vec<String>,

    /// Archive listings to cache (category, tag, date, author).
    #[arg(long = "cache-archives", value_name = "TYPES", value_delimiter = ',')]
    pub cache_archives: Vec<String>,

    /// Override the cache lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Serve cached pages to authenticated visitors.
    #[arg(
        long = "cache-visible-to-authenticated",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_visible_to_authenticated: Option<bool>,

    /// Override the in-memory entry limit.
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub cache_max_entries: Option<usize>,

    /// Override the largest page body that is stored, in bytes.
    #[arg(long = "cache-max-entry-bytes", value_name = "BYTES")]
    pub cache_max_entry_bytes: Option<usize>,

    /// Append the diagnostics footer to pages.
    #[arg(
        long = "cache-report-footer",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_report_footer: Option<bool>,

    /// Mark the diagnostics widget as active.
    #[arg(
        long = "cache-report-widget",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_report_widget: Option<bool>,

    /// Record per-page usage statistics.
    #[arg(
        long = "cache-statistics-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_statistics_enabled: Option<bool>,

    /// Override the statistics directory.
    #[arg(long = "cache-statistics-directory", value_name = "PATH")]
    pub cache_statistics_directory: Option<PathBuf>,

    /// Override the cookie that marks a visitor as authenticated.
    #[arg(long = "auth-session-cookie", value_name = "NAME")]
    pub auth_session_cookie: Option<String>,
}
