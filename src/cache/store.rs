//! Page storage.
//!
//! The pipeline talks to storage only through [`PageStore`]. Expiry is the
//! backend's job: a `get` after the TTL has elapsed must report the page as
//! absent.

use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use time::OffsetDateTime;

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Key-value backend holding rendered pages.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Fetch the page stored under `key`, if present and not expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError>;

    /// Store `content` under `key` for `ttl`, replacing any previous page.
    async fn set(&self, key: &CacheKey, content: Bytes, ttl: Duration) -> Result<(), CacheError>;
}

/// A stored page.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub content: Bytes,
    pub ttl: Duration,
    pub stored_at: OffsetDateTime,
    /// `None` when `ttl` reaches past the clock's range; such entries only
    /// leave the store through LRU eviction.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(key: CacheKey, content: Bytes, ttl: Duration, now: Instant) -> Self {
        Self {
            key,
            content,
            ttl,
            stored_at: OffsetDateTime::now_utc(),
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-process page store with LRU eviction and TTL expiry.
pub struct MemoryStore {
    entries: RwLock<LruCache<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    /// Create a new store sized from the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }

    /// Snapshot of the live entry stored under `key`.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lookup(key, Instant::now())
    }

    /// Get the number of stored pages, expired ones included.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &CacheKey, now: Instant) -> Option<CacheEntry> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let live = entries.get(key).map(|entry| !entry.is_expired(now))?;
        if live {
            entries.peek(key).cloned()
        } else {
            entries.pop(key);
            None
        }
    }

    fn insert(&self, key: &CacheKey, content: Bytes, ttl: Duration, now: Instant) {
        let entry = CacheEntry::new(key.clone(), content, ttl, now);
        rw_write(&self.entries, SOURCE, "set").put(key.clone(), entry);
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        Ok(self.entry(key).map(|entry| entry.content))
    }

    async fn set(&self, key: &CacheKey, content: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, content, ttl, Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::cache::keys::derive_key;

    #[tokio::test]
    async fn roundtrip() {
        let store = MemoryStore::new(&CacheConfig::default());
        let key = derive_key("/posts/hello");

        assert!(store.get(&key).await.expect("get").is_none());

        store
            .set(&key, Bytes::from("<html></html>"), Duration::from_secs(60))
            .await
            .expect("set");

        let cached = store.get(&key).await.expect("get").expect("stored page");
        assert_eq!(cached, Bytes::from("<html></html>"));

        let entry = store.entry(&key).expect("entry");
        assert_eq!(entry.key, key);
        assert_eq!(entry.ttl, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn set_overwrites_previous_page() {
        let store = MemoryStore::new(&CacheConfig::default());
        let key = derive_key("/");

        store
            .set(&key, Bytes::from("one"), Duration::from_secs(60))
            .await
            .expect("set");
        store
            .set(&key, Bytes::from("two"), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(store.len(), 1);
        let cached = store.get(&key).await.expect("get");
        assert_eq!(cached, Some(Bytes::from("two")));
    }

    #[test]
    fn expired_entries_are_absent_and_dropped() {
        let store = MemoryStore::new(&CacheConfig::default());
        let key = derive_key("/tag/rust");
        let now = Instant::now();

        store.insert(&key, Bytes::from("page"), Duration::from_secs(10), now);

        assert!(store.lookup(&key, now + Duration::from_secs(9)).is_some());
        assert!(store.lookup(&key, now + Duration::from_secs(10)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn lru_eviction() {
        let config = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let store = MemoryStore::new(&config);
        let ttl = Duration::from_secs(60);
        let now = Instant::now();
        let (a, b, c) = (derive_key("/a"), derive_key("/b"), derive_key("/c"));

        store.insert(&a, Bytes::from("a"), ttl, now);
        store.insert(&b, Bytes::from("b"), ttl, now);
        store.insert(&c, Bytes::from("c"), ttl, now);

        assert!(store.lookup(&a, now).is_none()); // Evicted
        assert!(store.lookup(&b, now).is_some());
        assert!(store.lookup(&c, now).is_some());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = MemoryStore::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        let key = derive_key("/");
        store.insert(&key, Bytes::from("page"), Duration::from_secs(60), Instant::now());
        assert!(store.entry(&key).is_some());
    }

    #[tokio::test]
    async fn unbounded_ttl_never_expires() {
        let store = MemoryStore::new(&CacheConfig::default());
        let key = derive_key("/posts/forever");

        store
            .set(&key, Bytes::from("page"), Duration::MAX)
            .await
            .expect("set");
        store
            .set(&key, Bytes::from("page"), Duration::from_secs(i64::MAX as u64))
            .await
            .expect("set");

        let far_future = Instant::now() + Duration::from_secs(100 * 365 * 24 * 60 * 60);
        assert!(store.lookup(&key, far_future).is_some());
    }
}
