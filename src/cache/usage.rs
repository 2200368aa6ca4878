//! Usage statistics.
//!
//! Every successful store writes `<dir>/<label>/<key>.json` holding the byte
//! size of the stored page. Files are overwritten on re-store and never read
//! back by the cache.

use std::path::PathBuf;

use tracing::debug;

use super::{error::CacheError, keys::CacheKey, policy::ContentLabel};

/// Size of one stored page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    pub label: ContentLabel,
    pub byte_size: u64,
}

impl UsageRecord {
    /// Measure `content` in bytes, not characters.
    pub fn measure(label: ContentLabel, content: &[u8]) -> Self {
        Self {
            label,
            byte_size: content.len() as u64,
        }
    }
}

/// Writes usage records below a statistics directory.
#[derive(Debug, Clone)]
pub struct UsageLogger {
    directory: PathBuf,
}

impl UsageLogger {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Path of the record for `key` in the `label` bucket.
    pub fn record_path(&self, label: ContentLabel, key: &CacheKey) -> PathBuf {
        self.directory
            .join(label.as_str())
            .join(format!("{}.json", key.as_str()))
    }

    /// Write `record` for `key`, replacing any earlier record.
    pub async fn record(&self, key: &CacheKey, record: UsageRecord) -> Result<PathBuf, CacheError> {
        let path = self.record_path(record.label, key);
        if let Some(bucket) = path.parent() {
            tokio::fs::create_dir_all(bucket).await?;
        }
        tokio::fs::write(&path, record.byte_size.to_string()).await?;

        debug!(
            cache = "page",
            key = %key,
            label = %record.label,
            bytes = record.byte_size,
            path = %path.display(),
            "usage recorded"
        );
        Ok(path)
    }
}
