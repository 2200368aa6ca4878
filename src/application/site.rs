//! Demo content host.
//!
//! A small in-memory catalog of posts and pages rendered behind the page
//! cache. Every lookup counts as one storage query on the request's
//! [`QueryCounter`].

use time::{Date, macros::date};

use crate::cache::QueryCounter;

/// Singular content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Post,
    Page,
}

#[derive(Debug, Clone)]
pub struct SiteEntry {
    pub kind: EntryKind,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub published: Date,
}

/// Filter for archive listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    All,
    Category(String),
    Tag(String),
    Year(i32),
    Author(String),
}

impl Listing {
    fn matches(&self, entry: &SiteEntry) -> bool {
        if entry.kind != EntryKind::Post {
            return false;
        }
        match self {
            Listing::All => true,
            Listing::Category(name) => entry.category.as_deref() == Some(name.as_str()),
            Listing::Tag(name) => entry.tags.iter().any(|tag| tag == name),
            Listing::Year(year) => entry.published.year() == *year,
            Listing::Author(name) => entry.author == *name,
        }
    }

    pub fn heading(&self) -> String {
        match self {
            Listing::All => "Latest posts".to_string(),
            Listing::Category(name) => format!("Category: {name}"),
            Listing::Tag(name) => format!("Tagged #{name}"),
            Listing::Year(year) => format!("Posts from {year}"),
            Listing::Author(name) => format!("Posts by {name}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteCatalog {
    title: String,
    entries: Vec<SiteEntry>,
}

impl SiteCatalog {
    pub fn new(title: impl Into<String>, entries: Vec<SiteEntry>) -> Self {
        let mut entries = entries;
        entries.sort_by(|a, b| b.published.cmp(&a.published));
        Self {
            title: title.into(),
            entries,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Find a post or page by slug.
    pub fn find(&self, kind: EntryKind, slug: &str, queries: &QueryCounter) -> Option<&SiteEntry> {
        queries.record();
        self.entries
            .iter()
            .find(|entry| entry.kind == kind && entry.slug == slug)
    }

    /// Posts matching `listing`, newest first.
    pub fn list(&self, listing: &Listing, queries: &QueryCounter) -> Vec<&SiteEntry> {
        queries.record();
        self.entries
            .iter()
            .filter(|entry| listing.matches(entry))
            .collect()
    }

    /// Sample content served by the binary.
    pub fn demo() -> Self {
        Self::new(
            "pagecache demo",
            vec![
                demo_entry(
                    EntryKind::Post,
                    "hello-world",
                    "Hello, world",
                    "The first post on this site.",
                    Some("news"),
                    &["intro"],
                    date!(2024 - 03 - 14),
                ),
                demo_entry(
                    EntryKind::Post,
                    "caching-pages",
                    "Caching whole pages",
                    "Rendered pages are stored and replayed until they expire.",
                    Some("engineering"),
                    &["cache", "http"],
                    date!(2025 - 06 - 02),
                ),
                demo_entry(
                    EntryKind::Page,
                    "about",
                    "About",
                    "This site demonstrates a full-page response cache.",
                    None,
                    &[],
                    date!(2024 - 01 - 01),
                ),
            ],
        )
    }
}

fn demo_entry(
    kind: EntryKind,
    slug: &str,
    title: &str,
    body: &str,
    category: Option<&str>,
    tags: &[&str],
    published: Date,
) -> SiteEntry {
    SiteEntry {
        kind,
        slug: slug.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        author: "editor".to_string(),
        category: category.map(str::to_string),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        published,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listings_filter_posts_only() {
        let catalog = SiteCatalog::demo();
        let queries = QueryCounter::default();

        let all = catalog.list(&Listing::All, &queries);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].slug, "caching-pages");

        assert_eq!(catalog.list(&Listing::Tag("cache".into()), &queries).len(), 1);
        assert_eq!(catalog.list(&Listing::Year(2024), &queries).len(), 1);
        assert_eq!(catalog.list(&Listing::Author("editor".into()), &queries).len(), 2);
        assert!(catalog.list(&Listing::Category("missing".into()), &queries).is_empty());
        assert_eq!(queries.get(), 5);
    }

    #[test]
    fn find_respects_kind() {
        let catalog = SiteCatalog::demo();
        let queries = QueryCounter::default();

        assert!(catalog.find(EntryKind::Page, "about", &queries).is_some());
        assert!(catalog.find(EntryKind::Post, "about", &queries).is_none());
        assert_eq!(queries.get(), 2);
    }
}
