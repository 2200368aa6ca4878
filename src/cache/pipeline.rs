//! Capture/replay pipeline.
//!
//! A request moves through explicit stages, each invoked by the host adapter:
//!
//! ```text
//! begin ─► before_render ─┬─ Hit ─► emit stored page, stop
//!                         └─ Miss ─► capture ─► (host renders) ─► classify
//!                                    ─► after_render (store)
//!                                    ─► finalize (report) ─► emit
//! ```
//!
//! All per-request state lives in [`RequestContext`]; [`PageCache`] itself is
//! shared and immutable.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::{
    capture::{FrameOwner, OutputStack},
    config::CacheConfig,
    diagnostics::{
        Diagnostics, Phase, ProcessProbe, QueryCounter, ResourceProbe, format_date,
        stored_snapshot,
    },
    error::CacheError,
    keys::{CacheKey, is_script_path},
    policy::{self, ContentLabel, Visitor},
    route::RouteKind,
    splice::{has_marker, splice_before_body_close},
    store::PageStore,
    usage::{UsageLogger, UsageRecord},
};

pub(crate) const METRIC_HIT: &str = "pagecache_hit_total";
pub(crate) const METRIC_MISS: &str = "pagecache_miss_total";
pub(crate) const METRIC_BYPASS: &str = "pagecache_bypass_total";
pub(crate) const METRIC_STORE: &str = "pagecache_store_total";
pub(crate) const METRIC_STORE_FAILED: &str = "pagecache_store_failed_total";
pub(crate) const METRIC_STORED_BYTES: &str = "pagecache_stored_bytes";

/// Per-request state threaded through the pipeline stages.
#[derive(Debug)]
pub struct RequestContext {
    pub request_path: String,
    pub cache_key: CacheKey,
    pub visitor: Visitor,
    pub is_cacheable: bool,
    pub label: ContentLabel,
    pub diagnostics: Diagnostics,
}

impl RequestContext {
    fn new(request_path: &str, visitor: Visitor) -> Self {
        Self {
            request_path: request_path.to_string(),
            cache_key: CacheKey::derive(request_path),
            visitor,
            is_cacheable: false,
            label: ContentLabel::None,
            diagnostics: Diagnostics::start(),
        }
    }

    /// Counter the renderer bumps once per storage query.
    pub fn queries(&self) -> QueryCounter {
        self.diagnostics.queries().clone()
    }
}

/// Result of the cache lookup at request start.
#[derive(Debug)]
pub enum Lookup {
    /// The stored page, ready to emit. No rendering must follow.
    Hit(Bytes),
    /// Render normally.
    Miss,
}

/// The page cache: policy, storage and reporting for one site.
pub struct PageCache {
    config: CacheConfig,
    store: Arc<dyn PageStore>,
    usage: Option<UsageLogger>,
    probe: Arc<dyn ResourceProbe>,
}

impl PageCache {
    pub fn new(config: CacheConfig, store: Arc<dyn PageStore>) -> Self {
        let usage = config
            .statistics
            .then(|| UsageLogger::new(config.statistics_dir.clone()));
        Self {
            config,
            store,
            usage,
            probe: Arc::new(ProcessProbe),
        }
    }

    /// Replace the memory probe used for diagnostics.
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Start a request.
    ///
    /// Returns `None` for script paths, which bypass the cache entirely.
    pub fn begin(&self, request_path: &str, visitor: Visitor) -> Option<RequestContext> {
        if is_script_path(request_path) {
            debug!(cache = "page", path = request_path, "script path, cache skipped");
            return None;
        }
        Some(RequestContext::new(request_path, visitor))
    }

    /// Whether `visitor` may be served a cached page.
    ///
    /// Checked at serve time on every request, independently of the policy.
    pub fn is_visible(&self, visitor: Visitor) -> bool {
        !visitor.authenticated || self.config.visible_to_authenticated
    }

    /// Look the page up and, on a hit, prepare it for replay.
    #[instrument(skip_all, fields(path = %ctx.request_path))]
    pub async fn before_render(&self, ctx: &mut RequestContext) -> Lookup {
        if !self.is_visible(ctx.visitor) {
            return Lookup::Miss;
        }

        let stored = match self.store.get(&ctx.cache_key).await {
            Ok(Some(stored)) if !stored.is_empty() => stored,
            Ok(_) => {
                counter!(METRIC_MISS).increment(1);
                debug!(cache = "page", outcome = "miss", key = %ctx.cache_key, "cache miss");
                return Lookup::Miss;
            }
            Err(err) => {
                counter!(METRIC_MISS).increment(1);
                warn!(
                    cache = "page",
                    outcome = "miss",
                    key = %ctx.cache_key,
                    error = %err,
                    "storage read failed, rendering uncached"
                );
                return Lookup::Miss;
            }
        };

        counter!(METRIC_HIT).increment(1);
        debug!(cache = "page", outcome = "hit", key = %ctx.cache_key, "serving cached page");
        Lookup::Hit(self.replay(ctx, stored))
    }

    fn replay(&self, ctx: &mut RequestContext, stored: Bytes) -> Bytes {
        let cached_at = stored_snapshot(&stored).map(|snapshot| snapshot.timestamp);
        let snapshot = ctx.diagnostics.record(Phase::Before, self.probe.as_ref());
        snapshot.cached_at = cached_at;
        let comment = snapshot.served_comment();
        ctx.diagnostics.note(comment);

        let mut page = BytesMut::from(&stored[..]);
        page.extend_from_slice(ctx.diagnostics.take_comment().as_bytes());
        let mut page = page.freeze();

        if !has_marker(&page) {
            let err = CacheError::malformed(ctx.cache_key.as_str(), "no closing body tag");
            debug!(cache = "page", error = %err, "report not injected");
        }

        if self.config.footer_report
            && let Some(footer) = ctx.diagnostics.footer_html()
        {
            page = splice_before_body_close(page, &footer);
        }
        if let Some(script) = ctx.diagnostics.take_payload_script() {
            page = splice_before_body_close(page, &script);
        }
        page
    }

    /// Whether the render for `ctx` goes through a capture frame.
    ///
    /// Nothing is captured while the cache is disabled. Authenticated
    /// visitors are never captured and are counted as bypasses.
    pub fn wants_capture(&self, ctx: &RequestContext) -> bool {
        if !self.config.enabled {
            return false;
        }
        if ctx.visitor.authenticated {
            counter!(METRIC_BYPASS).increment(1);
            debug!(
                cache = "page",
                outcome = "bypass",
                path = %ctx.request_path,
                "authenticated visitor, capture skipped"
            );
            return false;
        }
        true
    }

    /// Open the capture frame for a render.
    ///
    /// Output of renders that are not captured goes straight to the sink.
    pub fn capture(&self, ctx: &RequestContext, output: &mut OutputStack) {
        if self.wants_capture(ctx) {
            output.begin_capture();
        }
    }

    /// Apply the cacheability policy for the rendered route.
    pub fn classify(&self, ctx: &mut RequestContext, route: RouteKind) {
        let decision = policy::evaluate(&self.config, ctx.visitor, route);
        ctx.is_cacheable = decision.cacheable;
        ctx.label = decision.label;
    }

    /// Collect the captured page and store it when cacheable.
    ///
    /// Storage failures are logged and never affect the response.
    #[instrument(skip_all, fields(path = %ctx.request_path, label = %ctx.label))]
    pub async fn after_render(&self, ctx: &mut RequestContext, output: &mut OutputStack) {
        if !output.is_capturing() {
            return;
        }
        output.flush_nested();

        if !ctx.is_cacheable {
            return;
        }
        let Some(captured) = output.contents() else {
            return;
        };
        if captured.len() > self.config.max_entry_bytes {
            debug!(
                cache = "page",
                key = %ctx.cache_key,
                bytes = captured.len(),
                limit = self.config.max_entry_bytes,
                "page exceeds entry limit, not stored"
            );
            return;
        }

        let ttl = self.config.ttl;
        let snapshot = ctx.diagnostics.record(Phase::Before, self.probe.as_ref());
        snapshot.expires_at = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
            .map(format_date);
        let comment = snapshot.stored_comment();

        let mut page = BytesMut::with_capacity(captured.len() + comment.len());
        page.extend_from_slice(captured);
        page.extend_from_slice(comment.as_bytes());
        let page = page.freeze();

        if let Err(err) = self.store.set(&ctx.cache_key, page.clone(), ttl).await {
            counter!(METRIC_STORE_FAILED).increment(1);
            warn!(
                cache = "page",
                outcome = "store_failed",
                key = %ctx.cache_key,
                error = %err,
                "storage write failed, page not cached"
            );
            return;
        }

        counter!(METRIC_STORE).increment(1);
        histogram!(METRIC_STORED_BYTES).record(page.len() as f64);
        debug!(
            cache = "page",
            outcome = "stored",
            key = %ctx.cache_key,
            bytes = page.len(),
            ttl_secs = ttl.as_secs(),
            "page stored"
        );

        if let Some(usage) = &self.usage
            && let Err(err) = usage
                .record(&ctx.cache_key, UsageRecord::measure(ctx.label, &page))
                .await
        {
            warn!(cache = "page", key = %ctx.cache_key, error = %err, "failed to record usage");
        }
    }

    /// Splice the live report into the captured page and emit the output.
    pub fn finalize(&self, ctx: &mut RequestContext, mut output: OutputStack) -> Bytes {
        if self.config.reports_enabled() && output.is_capturing() {
            output.flush_nested();
            if let Some(captured) = output.get_clean() {
                ctx.diagnostics.record(Phase::After, self.probe.as_ref());

                let mut page = Bytes::from(captured);
                if self.config.footer_report
                    && let Some(footer) = ctx.diagnostics.footer_html()
                {
                    page = splice_before_body_close(page, &footer);
                }
                if let Some(script) = ctx.diagnostics.take_payload_script() {
                    page = splice_before_body_close(page, &script);
                }

                output.push(FrameOwner::Capture);
                output.write(&page);
            }
        }
        output.finish()
    }
}
