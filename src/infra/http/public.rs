use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::site::{EntryKind, Listing, SiteCatalog},
    cache::{CacheState, QueryCounter, RouteKind, page_cache_layer},
    presentation::views::{
        EntryTemplate, EntryView, LayoutContext, ListingTemplate, ListingView, PostCard,
        render_not_found_response, render_template_response,
    },
};

use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub site: Arc<SiteCatalog>,
    pub cache: Option<CacheState>,
}

pub fn build_router(state: HttpState) -> Router {
    // Rendered site pages, served through the page cache
    let cached_routes = Router::new()
        .route("/", get(index))
        .route("/posts/{slug}", get(post_detail))
        .route("/pages/{slug}", get(page_detail))
        .route("/category/{name}", get(category_archive))
        .route("/tag/{name}", get(tag_archive))
        .route("/date/{year}", get(date_archive))
        .route("/author/{name}", get(author_archive))
        .fallback(fallback_router);

    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            page_cache_layer,
        ))
    } else {
        cached_routes
    };

    let static_routes = Router::new().route("/_health", get(health));

    cached_routes
        .merge(static_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

type Queries = Option<Extension<QueryCounter>>;

fn counter(queries: Queries) -> QueryCounter {
    queries.map(|Extension(counter)| counter).unwrap_or_default()
}

async fn index(State(state): State<HttpState>, queries: Queries) -> Response {
    render_listing(&state, Listing::All, &counter(queries), false)
}

async fn post_detail(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    queries: Queries,
) -> Response {
    render_entry(&state, EntryKind::Post, &slug, &counter(queries))
}

async fn page_detail(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    queries: Queries,
) -> Response {
    render_entry(&state, EntryKind::Page, &slug, &counter(queries))
}

async fn category_archive(
    State(state): State<HttpState>,
    Path(name): Path<String>,
    queries: Queries,
) -> Response {
    render_listing(&state, Listing::Category(name), &counter(queries), true)
}

async fn tag_archive(
    State(state): State<HttpState>,
    Path(name): Path<String>,
    queries: Queries,
) -> Response {
    render_listing(&state, Listing::Tag(name), &counter(queries), true)
}

async fn date_archive(
    State(state): State<HttpState>,
    Path(year): Path<String>,
    queries: Queries,
) -> Response {
    match year.parse::<i32>() {
        Ok(year) => render_listing(&state, Listing::Year(year), &counter(queries), true),
        Err(_) => render_not_found_response(state.site.title()),
    }
}

async fn author_archive(
    State(state): State<HttpState>,
    Path(name): Path<String>,
    queries: Queries,
) -> Response {
    render_listing(&state, Listing::Author(name), &counter(queries), true)
}

async fn fallback_router(State(state): State<HttpState>) -> Response {
    render_not_found_response(state.site.title())
}

async fn health() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

fn render_listing(
    state: &HttpState,
    listing: Listing,
    queries: &QueryCounter,
    require_results: bool,
) -> Response {
    let posts: Vec<PostCard> = state
        .site
        .list(&listing, queries)
        .into_iter()
        .map(PostCard::from)
        .collect();
    if require_results && posts.is_empty() {
        return render_not_found_response(state.site.title());
    }

    let content = ListingView {
        heading: listing.heading(),
        posts,
    };
    let view = LayoutContext::new(state.site.title(), content);
    render_template_response(ListingTemplate { view }, StatusCode::OK)
}

fn render_entry(
    state: &HttpState,
    kind: EntryKind,
    slug: &str,
    queries: &QueryCounter,
) -> Response {
    let Some(entry) = state.site.find(kind, slug, queries) else {
        return render_not_found_response(state.site.title());
    };

    let view = LayoutContext::new(state.site.title(), EntryView::from(entry));
    let mut response = render_template_response(EntryTemplate { view }, StatusCode::OK);
    let route = match kind {
        EntryKind::Post => RouteKind::Post,
        EntryKind::Page => RouteKind::Page,
    };
    response.extensions_mut().insert(route);
    response
}
