use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::application::{
    error::{ErrorReport, HttpError},
    site::{EntryKind, SiteEntry},
};

const PUBLISHED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(site_title: &str) -> Response {
    let view = LayoutContext::new(site_title, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
}

pub struct LayoutContext<T> {
    pub site_title: String,
    pub navigation: Vec<NavigationLinkView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(site_title: &str, content: T) -> Self {
        Self {
            site_title: site_title.to_string(),
            navigation: default_navigation(),
            content,
        }
    }
}

fn default_navigation() -> Vec<NavigationLinkView> {
    [("Home", "/"), ("About", "/pages/about")]
        .into_iter()
        .map(|(label, href)| NavigationLinkView {
            label: label.to_string(),
            href: href.to_string(),
        })
        .collect()
}

#[derive(Clone)]
pub struct TagBadge {
    pub href: String,
    pub label: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub href: String,
    pub title: String,
    pub excerpt: String,
    pub published: String,
}

impl From<&SiteEntry> for PostCard {
    fn from(entry: &SiteEntry) -> Self {
        Self {
            href: entry_href(entry),
            title: entry.title.clone(),
            excerpt: entry.body.clone(),
            published: format_published(entry.published),
        }
    }
}

pub struct ListingView {
    pub heading: String,
    pub posts: Vec<PostCard>,
}

#[derive(Template)]
#[template(path = "site/listing.html")]
pub struct ListingTemplate {
    pub view: LayoutContext<ListingView>,
}

pub struct EntryView {
    pub title: String,
    pub body: String,
    pub published: String,
    pub author: String,
    pub author_href: String,
    pub category: Option<TagBadge>,
    pub tags: Vec<TagBadge>,
}

impl From<&SiteEntry> for EntryView {
    fn from(entry: &SiteEntry) -> Self {
        Self {
            title: entry.title.clone(),
            body: entry.body.clone(),
            published: format_published(entry.published),
            author: entry.author.clone(),
            author_href: format!("/author/{}", entry.author),
            category: entry.category.as_ref().map(|name| TagBadge {
                href: format!("/category/{name}"),
                label: name.clone(),
            }),
            tags: entry
                .tags
                .iter()
                .map(|tag| TagBadge {
                    href: format!("/tag/{tag}"),
                    label: format!("#{tag}"),
                })
                .collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "site/entry.html")]
pub struct EntryTemplate {
    pub view: LayoutContext<EntryView>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "site/error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

fn entry_href(entry: &SiteEntry) -> String {
    match entry.kind {
        EntryKind::Post => format!("/posts/{}", entry.slug),
        EntryKind::Page => format!("/pages/{}", entry.slug),
    }
}

fn format_published(date: Date) -> String {
    date.format(PUBLISHED_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn post() -> SiteEntry {
        SiteEntry {
            kind: EntryKind::Post,
            slug: "hello".to_string(),
            title: "Hello".to_string(),
            body: "Body".to_string(),
            author: "ada".to_string(),
            category: Some("news".to_string()),
            tags: vec!["rust".to_string()],
            published: date!(2024 - 03 - 04),
        }
    }

    #[test]
    fn published_dates_are_human_readable() {
        assert_eq!(format_published(date!(2024 - 03 - 04)), "March 4, 2024");
    }

    #[test]
    fn entry_view_links_archives() {
        let view = EntryView::from(&post());
        assert_eq!(view.author_href, "/author/ada");
        assert_eq!(view.category.expect("category").href, "/category/news");
        assert_eq!(view.tags[0].label, "#rust");
    }

    #[test]
    fn pages_render_with_body_close() {
        let view = LayoutContext::new("demo", EntryView::from(&post()));
        let html = render_template(EntryTemplate { view }).expect("rendered");
        assert!(html.0.contains("<h1>Hello</h1>"));
        assert!(html.0.contains("</body>"));
    }

    #[test]
    fn not_found_carries_report() {
        let response = render_not_found_response("demo");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
