//! Cache configuration.
//!
//! Runtime options consumed by the page cache, resolved from the `[cache]`
//! section of `pagecache.toml`.

use std::{collections::BTreeSet, num::NonZeroUsize, path::PathBuf, time::Duration};

use super::policy::{ArchiveType, PostType};

// Default values for cache configuration
const DEFAULT_TTL_SECS: u64 = 86_400;
const DEFAULT_MAX_ENTRIES: usize = 1024;
const DEFAULT_MAX_ENTRY_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_STATISTICS_DIR: &str = "stats";

/// Page cache options.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch.
    pub enabled: bool,
    /// Cache the homepage.
    pub cache_homepage: bool,
    /// Singular content types eligible for caching.
    pub post_types: BTreeSet<PostType>,
    /// Archive listings eligible for caching.
    pub archives: BTreeSet<ArchiveType>,
    /// Lifetime of a stored page.
    pub ttl: Duration,
    /// Serve cached pages to authenticated visitors.
    pub visible_to_authenticated: bool,
    /// Maximum pages held by the in-memory backend.
    pub max_entries: usize,
    /// Captured bodies above this size are served but not stored.
    pub max_entry_bytes: usize,
    /// Inject the diagnostics footer report.
    pub footer_report: bool,
    /// A diagnostics widget is active on the site.
    pub widget_active: bool,
    /// Record usage statistics on store.
    pub statistics: bool,
    /// Root directory for usage statistics.
    pub statistics_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_homepage: true,
            post_types: BTreeSet::new(),
            archives: BTreeSet::new(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            visible_to_authenticated: false,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            footer_report: false,
            widget_active: false,
            statistics: false,
            statistics_dir: PathBuf::from(DEFAULT_STATISTICS_DIR),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            cache_homepage: settings.homepage,
            post_types: settings.post_types.clone(),
            archives: settings.archives.clone(),
            ttl: settings.ttl,
            visible_to_authenticated: settings.visible_to_authenticated,
            max_entries: settings.max_entries,
            max_entry_bytes: settings.max_entry_bytes,
            footer_report: settings.report.footer,
            widget_active: settings.report.widget,
            statistics: settings.statistics.enabled,
            statistics_dir: settings.statistics.directory.clone(),
        }
    }
}

impl CacheConfig {
    /// Returns true if a diagnostics report is spliced into responses.
    pub fn reports_enabled(&self) -> bool {
        self.footer_report || self.widget_active
    }

    /// Returns the backend capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
