//! Full-page response cache.
//!
//! A rendered page is captured on its way out, stored under a key derived
//! from the request path, and replayed to later anonymous visitors until its
//! TTL expires. Every response can carry a diagnostics report describing the
//! cached copy, the live render, or both.
//!
//! ## Configuration
//!
//! Cache behaviour is controlled via the `[cache]` table of `pagecache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! homepage = true
//! post_types = ["post", "page"]
//! archives = ["category", "tag"]
//! ttl_seconds = 86400
//!
//! [cache.report]
//! footer = true
//! ```

mod capture;
mod config;
mod diagnostics;
mod error;
mod keys;
mod lock;
mod middleware;
mod pipeline;
mod policy;
mod route;
mod splice;
mod store;
mod usage;

pub use capture::{FrameOwner, OutputStack};
pub use config::CacheConfig;
pub use diagnostics::{
    Diagnostics, DiagnosticsSnapshot, FixedProbe, Phase, ProcessProbe, QueryCounter,
    ResourceProbe, stored_snapshot,
};
pub use error::CacheError;
pub use keys::{CacheKey, derive_key, is_script_path};
pub use middleware::{CACHE_STATUS_HEADER, CacheState, page_cache_layer};
pub use pipeline::{Lookup, PageCache, RequestContext};
pub use policy::{ArchiveType, ContentLabel, Decision, PostType, Visitor, evaluate};
pub use route::{PrefixClassifier, RouteClassifier, RouteKind};
pub use splice::{SPLICE_MARKER, splice_before_body_close};
pub use store::{CacheEntry, MemoryStore, PageStore};
pub use usage::{UsageLogger, UsageRecord};

pub(crate) use pipeline::{
    METRIC_BYPASS, METRIC_HIT, METRIC_MISS, METRIC_STORE, METRIC_STORE_FAILED,
    METRIC_STORED_BYTES,
};
