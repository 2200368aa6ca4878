use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header::COOKIE},
    middleware,
    response::Html,
    routing,
};
use http_body_util::BodyExt;
use pagecache::{
    application::site::SiteCatalog,
    cache::{
        ArchiveType, CACHE_STATUS_HEADER, CacheConfig, CacheKey, CacheState, FixedProbe,
        MemoryStore, PageCache, PostType, PrefixClassifier, page_cache_layer, stored_snapshot,
    },
    infra::http::{HttpState, build_router},
};
use tower::ServiceExt;

const SESSION_COOKIE: &str = "pagecache_session";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
}

fn harness(config: CacheConfig) -> Harness {
    let store = Arc::new(MemoryStore::new(&config));
    let cache = PageCache::new(config, store.clone())
        .with_probe(Arc::new(FixedProbe(8 * 1024 * 1024)));
    let state = HttpState {
        site: Arc::new(SiteCatalog::demo()),
        cache: Some(CacheState::new(
            Arc::new(cache),
            Arc::new(PrefixClassifier::default()),
            SESSION_COOKIE,
        )),
    };
    Harness {
        app: build_router(state),
        store,
    }
}

fn enabled() -> CacheConfig {
    CacheConfig {
        enabled: true,
        ..Default::default()
    }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Reply {
    fn cache_status(&self) -> Option<&str> {
        self.headers
            .get(CACHE_STATUS_HEADER)
            .and_then(|value| value.to_str().ok())
    }

    fn payload(&self) -> serde_json::Value {
        let start =
            self.body.find("var report = ").expect("payload script") + "var report = ".len();
        let end = start + self.body[start..].find(";\n").expect("payload end");
        serde_json::from_str(&self.body[start..end]).expect("payload json")
    }
}

async fn send(app: &Router, method: Method, path: &str, cookie: Option<&str>) -> Reply {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    Reply {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).expect("utf8 body"),
    }
}

async fn get(app: &Router, path: &str) -> Reply {
    send(app, Method::GET, path, None).await
}

#[tokio::test]
async fn homepage_is_stored_then_replayed() {
    let harness = harness(enabled());

    let first = get(&harness.app, "/").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.cache_status(), Some("miss"));
    assert!(!first.body.contains("This page is cached by pagecache."));
    assert_eq!(harness.store.len(), 1);

    let second = get(&harness.app, "/").await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.cache_status(), Some("hit"));
    assert_eq!(
        second.headers.get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/html; charset=utf-8")
    );
    assert!(second.body.contains("Latest posts"));
    assert!(second.body.contains("This page is cached by pagecache."));
    assert!(second.body.contains("Served from cache"));

    let payload = second.payload();
    assert!(payload.get("before").is_some());
    assert!(payload.get("after").is_none());
    assert_eq!(payload["before"]["memory_usage_mb"], 8.0);
}

#[tokio::test]
async fn stored_copy_records_render_metrics() {
    let harness = harness(enabled());
    get(&harness.app, "/").await;

    let entry = harness
        .store
        .entry(&CacheKey::derive("/"))
        .expect("homepage stored");
    let text = std::str::from_utf8(&entry.content).expect("utf8");
    assert!(text.contains("SQL queries: 1"));
    assert!(text.contains("Expires at: "));

    let snapshot = stored_snapshot(&entry.content).expect("snapshot line");
    assert_eq!(snapshot.sql_queries, 1);
}

#[tokio::test]
async fn authenticated_visitors_bypass_the_cache() {
    let harness = harness(enabled());
    let cookie = format!("{SESSION_COOKIE}=abc123");

    let anonymous = get(&harness.app, "/").await;
    assert_eq!(anonymous.cache_status(), Some("miss"));

    let authenticated = send(&harness.app, Method::GET, "/", Some(&cookie)).await;
    assert_eq!(authenticated.status, StatusCode::OK);
    assert_eq!(authenticated.cache_status(), Some("bypass"));
    assert!(!authenticated.body.contains("This page is cached by pagecache."));
}

#[tokio::test]
async fn authenticated_renders_are_never_stored() {
    let harness = harness(enabled());
    let cookie = format!("{SESSION_COOKIE}=abc123");

    send(&harness.app, Method::GET, "/", Some(&cookie)).await;
    assert!(harness.store.is_empty());

    let anonymous = get(&harness.app, "/").await;
    assert_eq!(anonymous.cache_status(), Some("miss"));
}

#[tokio::test]
async fn not_found_pages_are_not_cached() {
    let harness = harness(CacheConfig {
        post_types: BTreeSet::from([PostType::Post]),
        archives: BTreeSet::from([ArchiveType::Tag]),
        ..enabled()
    });

    for _ in 0..2 {
        let reply = get(&harness.app, "/posts/does-not-exist").await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.cache_status(), Some("miss"));
    }
    let reply = get(&harness.app, "/tag/unknown").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn script_paths_pass_through_untouched() {
    let harness = harness(enabled());

    let reply = get(&harness.app, "/index.php").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.cache_status().is_none());
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn non_get_requests_pass_through_untouched() {
    let harness = harness(enabled());

    let reply = send(&harness.app, Method::POST, "/", None).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(reply.cache_status().is_none());
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn disabled_content_types_are_not_stored() {
    let harness = harness(enabled());

    let reply = get(&harness.app, "/posts/hello-world").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(harness.store.is_empty());

    let reply = get(&harness.app, "/posts/hello-world").await;
    assert_eq!(reply.cache_status(), Some("miss"));
}

#[tokio::test]
async fn enabled_content_types_are_stored() {
    let harness = harness(CacheConfig {
        post_types: BTreeSet::from([PostType::Page]),
        archives: BTreeSet::from([ArchiveType::Author]),
        ..enabled()
    });

    get(&harness.app, "/pages/about").await;
    get(&harness.app, "/author/editor").await;
    assert_eq!(harness.store.len(), 2);

    assert_eq!(get(&harness.app, "/pages/about").await.cache_status(), Some("hit"));
    assert_eq!(get(&harness.app, "/author/editor").await.cache_status(), Some("hit"));
}

#[tokio::test]
async fn caching_disabled_stores_nothing() {
    let harness = harness(CacheConfig::default());

    get(&harness.app, "/").await;
    let reply = get(&harness.app, "/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.cache_status().is_none());
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn expired_pages_are_rendered_again() {
    let harness = harness(CacheConfig {
        ttl: Duration::from_millis(50),
        ..enabled()
    });

    get(&harness.app, "/").await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    let reply = get(&harness.app, "/").await;
    assert_eq!(reply.cache_status(), Some("miss"));
}

#[tokio::test]
async fn footer_report_is_spliced_before_body_close() {
    let harness = harness(CacheConfig {
        footer_report: true,
        ..enabled()
    });

    let fresh = get(&harness.app, "/").await;
    let report_at = fresh.body.find("class=\"pagecache-report\"").expect("footer");
    let body_close = fresh.body.find("</body>").expect("body close");
    assert!(report_at < body_close);

    let payload = fresh.payload();
    assert!(payload.get("before").is_some());
    assert!(payload.get("after").is_some());

    let cached = get(&harness.app, "/").await;
    assert_eq!(cached.cache_status(), Some("hit"));
    assert!(cached.body.contains("class=\"pagecache-report\""));
    assert_eq!(cached.body.matches("class=\"pagecache-report\"").count(), 1);
}

#[tokio::test]
async fn statistics_disabled_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(CacheConfig {
        statistics_dir: dir.path().to_path_buf(),
        ..enabled()
    });

    get(&harness.app, "/").await;
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[tokio::test]
async fn statistics_record_stored_page_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let harness = harness(CacheConfig {
        statistics: true,
        statistics_dir: dir.path().to_path_buf(),
        ..enabled()
    });

    get(&harness.app, "/").await;

    let key = CacheKey::derive("/");
    let entry = harness.store.entry(&key).expect("stored");
    let record = dir.path().join("homepage").join(format!("{key}.json"));
    let recorded = std::fs::read_to_string(record).expect("usage record");
    assert_eq!(recorded, entry.content.len().to_string());
}

#[tokio::test]
async fn cache_hit_skips_the_renderer() {
    let renders = Arc::new(AtomicUsize::new(0));
    let config = enabled();
    let store = Arc::new(MemoryStore::new(&config));
    let state = CacheState::new(
        Arc::new(PageCache::new(config, store)),
        Arc::new(PrefixClassifier::default()),
        SESSION_COOKIE,
    );
    let counted = renders.clone();
    let app = Router::new()
        .route(
            "/",
            routing::get(move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Html("<html><body><p>rendered</p></body></html>")
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state, page_cache_layer));

    assert_eq!(get(&app, "/").await.cache_status(), Some("miss"));
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    let cached = get(&app, "/").await;
    assert_eq!(cached.cache_status(), Some("hit"));
    assert!(cached.body.contains("<p>rendered</p>"));
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}
