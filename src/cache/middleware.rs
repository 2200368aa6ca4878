//! Page cache middleware.
//!
//! Adapts the pipeline stages to an axum request: the downstream handler is
//! the renderer and its response body is the captured output.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE},
        response::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{instrument, warn};

use super::{
    capture::OutputStack,
    pipeline::{Lookup, PageCache},
    policy::Visitor,
    route::{RouteClassifier, RouteKind},
};

/// Response header reporting how the page cache handled a request.
pub const CACHE_STATUS_HEADER: &str = "x-pagecache";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Multiple of `max_entry_bytes` a render may reach and still be buffered.
const COLLECT_LIMIT_FACTOR: usize = 4;

/// Shared state for [`page_cache_layer`].
#[derive(Clone)]
pub struct CacheState {
    pub cache: Arc<PageCache>,
    pub classifier: Arc<dyn RouteClassifier>,
    pub session_cookie: Arc<str>,
}

impl CacheState {
    pub fn new(
        cache: Arc<PageCache>,
        classifier: Arc<dyn RouteClassifier>,
        session_cookie: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            cache,
            classifier,
            session_cookie: session_cookie.into(),
        }
    }

    /// A visitor carrying a non-empty session cookie is authenticated.
    pub fn visitor(&self, headers: &HeaderMap) -> Visitor {
        let authenticated = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == &*self.session_cookie && !value.trim().is_empty());
        Visitor { authenticated }
    }
}

/// Middleware serving pages from the cache and capturing fresh renders.
///
/// Only GET requests enter the pipeline. The downstream handler receives a
/// [`super::QueryCounter`] in its request extensions and may declare its
/// [`RouteKind`] through the response extensions.
///
/// Bodies are only buffered for renders that are captured: anonymous visitors
/// with the cache enabled, and successful HTML responses. Everything else is
/// streamed through untouched.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(state): State<CacheState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let visitor = state.visitor(request.headers());
    let Some(mut ctx) = state.cache.begin(&path, visitor) else {
        return next.run(request).await;
    };

    if let Lookup::Hit(page) = state.cache.before_render(&mut ctx).await {
        return hit_response(page);
    }

    let capturing = state.cache.wants_capture(&ctx);
    request.extensions_mut().insert(ctx.queries());
    let mut response = next.run(request).await;

    if !capturing {
        if state.cache.config().enabled {
            mark(response.headers_mut(), visitor);
        }
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let limit = collect_limit(state.cache.config().max_entry_bytes);
    if !is_capturable(&parts, limit) {
        mark(&mut parts.headers, visitor);
        return Response::from_parts(parts, body);
    }

    let rendered = match axum::body::to_bytes(body, limit).await {
        Ok(rendered) => rendered,
        Err(err) => {
            warn!(cache = "page", error = %err, "failed to collect response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut output = OutputStack::new();
    state.cache.capture(&ctx, &mut output);
    output.write(&rendered);

    let route = route_for(&parts, state.classifier.as_ref(), &path);
    state.cache.classify(&mut ctx, route);
    state.cache.after_render(&mut ctx, &mut output).await;
    let page = state.cache.finalize(&mut ctx, output);

    parts.headers.remove(CONTENT_LENGTH);
    mark(&mut parts.headers, visitor);
    Response::from_parts(parts, Body::from(page))
}

fn hit_response(page: Bytes) -> Response {
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE)),
            (
                HeaderName::from_static(CACHE_STATUS_HEADER),
                HeaderValue::from_static("hit"),
            ),
        ],
        page,
    )
        .into_response()
}

/// Upper bound on a buffered body. Pages between the entry limit and this
/// bound are served with reports but not stored.
fn collect_limit(max_entry_bytes: usize) -> usize {
    max_entry_bytes.saturating_mul(COLLECT_LIMIT_FACTOR)
}

/// Only successful HTML responses within the collect limit are buffered.
fn is_capturable(parts: &Parts, limit: usize) -> bool {
    parts.status == StatusCode::OK
        && is_html(&parts.headers)
        && declared_length(&parts.headers).is_none_or(|length| length <= limit)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn mark(headers: &mut HeaderMap, visitor: Visitor) {
    let status = if visitor.authenticated { "bypass" } else { "miss" };
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status));
}

/// Route of a captured response: the handler's declaration, else the path.
fn route_for(parts: &Parts, classifier: &dyn RouteClassifier, path: &str) -> RouteKind {
    parts
        .extensions
        .get::<RouteKind>()
        .copied()
        .unwrap_or_else(|| classifier.classify(path))
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_none_or(|value| value.trim_start().starts_with("text/html"))
}
