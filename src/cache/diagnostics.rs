//! Diagnostics recorder.
//!
//! Collects timing, memory and query-count facts for the current request and
//! renders them three ways: an HTML comment block, a footer fragment and a
//! JSON payload keyed by phase for the client-side report widget.
//!
//! Phases:
//! - [`Phase::Before`] describes the cached copy. It is recorded when a page
//!   is stored, and again when a page is served from the cache.
//! - [`Phase::After`] describes a fresh render of the live request.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt::Write as _,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use askama::Template;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use tracing::warn;

const SOURCE: &str = "cache::diagnostics";

/// Prefix of the machine-readable line closing a stored comment block.
pub const SNAPSHOT_LINE_PREFIX: &str = "pagecache-snapshot: ";

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Lifecycle point a snapshot was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    After,
}

/// Per-request counter of storage queries issued while rendering.
///
/// Cloned into the downstream handler, which calls [`QueryCounter::record`]
/// once per query.
#[derive(Debug, Clone, Default)]
pub struct QueryCounter(Arc<AtomicU64>);

impl QueryCounter {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Source of process memory readings.
pub trait ResourceProbe: Send + Sync {
    /// Current memory usage of the process in bytes.
    fn memory_bytes(&self) -> u64;
}

/// Reads resident set size from `/proc/self/status`; reports 0 elsewhere.
///
/// The read is synchronous. procfs files are generated in memory by the
/// kernel and never touch disk, so the call does not park the runtime worker.
/// A request takes at most two readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProbe;

impl ResourceProbe for ProcessProbe {
    fn memory_bytes(&self) -> u64 {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_vm_rss(&status))
            .unwrap_or(0)
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
        .map(|kib| kib * 1024)
}

/// Probe returning a constant reading.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub u64);

impl ResourceProbe for FixedProbe {
    fn memory_bytes(&self) -> u64 {
        self.0
    }
}

/// One phase-labelled set of metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub phase: Phase,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<String>,
    pub memory_usage_mb: f64,
    pub sql_queries: u64,
    pub elapsed_seconds: f64,
}

impl DiagnosticsSnapshot {
    fn measure(
        phase: Phase,
        elapsed: Duration,
        sql_queries: u64,
        probe: &dyn ResourceProbe,
    ) -> Self {
        Self {
            phase,
            timestamp: format_date(OffsetDateTime::now_utc()),
            expires_at: None,
            cached_at: None,
            memory_usage_mb: round_to(probe.memory_bytes() as f64 / BYTES_PER_MB, 4),
            sql_queries,
            elapsed_seconds: round_to(elapsed.as_secs_f64(), 3),
        }
    }

    /// Comment block appended to a page before it is stored.
    ///
    /// The last line carries the snapshot as JSON so it can be recovered from
    /// the stored copy with [`stored_snapshot`].
    pub fn stored_comment(&self) -> String {
        let mut block = String::from("\n<!--\nThis page is cached by pagecache.\n");
        block.push_str("....... Before .......\n");
        let _ = writeln!(block, "Time to cache: {}", self.timestamp);
        if let Some(expires_at) = &self.expires_at {
            let _ = writeln!(block, "Expires at: {expires_at}");
        }
        let _ = writeln!(block, "Memory usage: {} MB", self.memory_usage_mb);
        let _ = writeln!(block, "SQL queries: {}", self.sql_queries);
        let _ = writeln!(block, "Page generated in {} seconds.", self.elapsed_seconds);
        match serde_json::to_string(self) {
            Ok(json) => {
                let _ = writeln!(block, "{SNAPSHOT_LINE_PREFIX}{json}");
            }
            Err(err) => warn!(
                target_module = SOURCE,
                error = %err,
                "failed to serialize stored snapshot"
            ),
        }
        block.push_str("-->\n");
        block
    }

    /// Comment block appended to a page replayed from the cache.
    pub fn served_comment(&self) -> String {
        let mut block = String::from("\n<!--\n....... Served from cache .......\n");
        let _ = writeln!(block, "Now: {}", self.timestamp);
        if let Some(cached_at) = &self.cached_at {
            let _ = writeln!(block, "Cached at: {cached_at}");
        }
        let _ = writeln!(block, "Memory usage: {} MB", self.memory_usage_mb);
        let _ = writeln!(block, "SQL queries: {}", self.sql_queries);
        let _ = writeln!(block, "Page served in {} seconds.", self.elapsed_seconds);
        block.push_str("-->\n");
        block
    }
}

/// Recover the snapshot appended to a stored page, if any.
pub fn stored_snapshot(content: &[u8]) -> Option<DiagnosticsSnapshot> {
    let text = std::str::from_utf8(content).ok()?;
    let start = text.rfind(SNAPSHOT_LINE_PREFIX)? + SNAPSHOT_LINE_PREFIX.len();
    let line = text[start..].lines().next()?;
    serde_json::from_str(line).ok()
}

/// Per-request diagnostics state.
///
/// Both the comment buffer and the snapshot set are drained when rendered, so
/// a rendered report only ever describes the current response.
#[derive(Debug)]
pub struct Diagnostics {
    started: Instant,
    queries: QueryCounter,
    messages: Vec<String>,
    snapshots: BTreeMap<Phase, DiagnosticsSnapshot>,
}

impl Diagnostics {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            queries: QueryCounter::default(),
            messages: Vec::new(),
            snapshots: BTreeMap::new(),
        }
    }

    pub fn queries(&self) -> &QueryCounter {
        &self.queries
    }

    /// Take a snapshot for `phase`, replacing any earlier one.
    pub fn record(&mut self, phase: Phase, probe: &dyn ResourceProbe) -> &mut DiagnosticsSnapshot {
        let snapshot =
            DiagnosticsSnapshot::measure(phase, self.started.elapsed(), self.queries.get(), probe);
        match self.snapshots.entry(phase) {
            Entry::Occupied(mut slot) => {
                slot.insert(snapshot);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(snapshot),
        }
    }

    pub fn snapshot(&self, phase: Phase) -> Option<&DiagnosticsSnapshot> {
        self.snapshots.get(&phase)
    }

    /// Queue a comment block for the next [`Diagnostics::take_comment`].
    pub fn note(&mut self, block: String) {
        self.messages.push(block);
    }

    pub fn take_comment(&mut self) -> String {
        std::mem::take(&mut self.messages).concat()
    }

    /// Serialize and drain the snapshot set as `{"before": .., "after": ..}`.
    pub fn take_payload(&mut self) -> String {
        let snapshots = std::mem::take(&mut self.snapshots);
        serde_json::to_string(&snapshots).unwrap_or_else(|err| {
            warn!(
                target_module = SOURCE,
                error = %err,
                "failed to serialize diagnostics payload"
            );
            "{}".to_string()
        })
    }

    /// Footer report describing the most recent snapshot.
    pub fn footer_html(&self) -> Option<String> {
        let (cache_status, current) = match self.snapshot(Phase::After) {
            Some(after) => ("No", Some(after)),
            None => ("Yes", self.snapshot(Phase::Before)),
        };
        let template = FooterTemplate {
            cache_status,
            memory_usage: display_or_dash(current.map(|s| s.memory_usage_mb)),
            sql_queries: display_or_dash(current.map(|s| s.sql_queries)),
            generation_time: display_or_dash(current.map(|s| s.elapsed_seconds)),
        };
        render(template, "footer")
    }

    /// Script element carrying the drained payload.
    pub fn take_payload_script(&mut self) -> Option<String> {
        let payload = escape_script_json(&self.take_payload());
        render(PayloadTemplate { payload }, "payload")
    }
}

#[derive(Template)]
#[template(path = "diagnostics/footer.html")]
struct FooterTemplate {
    cache_status: &'static str,
    memory_usage: String,
    sql_queries: String,
    generation_time: String,
}

#[derive(Template)]
#[template(path = "diagnostics/payload.html")]
struct PayloadTemplate {
    payload: String,
}

fn render<T: Template>(template: T, fragment: &'static str) -> Option<String> {
    match template.render() {
        Ok(html) => Some(html),
        Err(err) => {
            warn!(
                target_module = SOURCE,
                fragment,
                error = %err,
                "failed to render diagnostics fragment"
            );
            None
        }
    }
}

fn display_or_dash<T: ToString>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn escape_script_json(json: &str) -> String {
    json.replace('<', "\\u003c")
}

pub(crate) fn format_date(at: OffsetDateTime) -> String {
    at.format(DATE_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
