use thiserror::Error;

/// Failures inside the page cache.
///
/// None of these reach the visitor: the pipeline logs them and degrades to
/// an uncached, freshly rendered response.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage unavailable: {message}")]
    StorageUnavailable { message: String },
    #[error("stored content for `{key}` is malformed: {reason}")]
    MalformedStoredContent { key: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedStoredContent {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
