//! Route classification.
//!
//! The host decides what kind of page a request renders. The pipeline only
//! sees the resulting [`RouteKind`].

/// Kind of page served for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Homepage,
    Post,
    Page,
    Category,
    Tag,
    Date,
    Author,
    NotFound,
    Other,
}

/// Maps a request path to a [`RouteKind`].
pub trait RouteClassifier: Send + Sync {
    fn classify(&self, path: &str) -> RouteKind;
}

/// Classifier driven by path prefixes.
///
/// `/` is the homepage; otherwise the longest matching prefix wins and
/// unmatched paths are [`RouteKind::Other`].
#[derive(Debug, Clone)]
pub struct PrefixClassifier {
    prefixes: Vec<(String, RouteKind)>,
}

impl PrefixClassifier {
    pub fn empty() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, kind: RouteKind) -> Self {
        self.prefixes.push((prefix.into(), kind));
        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }
}

impl Default for PrefixClassifier {
    fn default() -> Self {
        Self::empty()
            .with_prefix("/posts/", RouteKind::Post)
            .with_prefix("/pages/", RouteKind::Page)
            .with_prefix("/category/", RouteKind::Category)
            .with_prefix("/tag/", RouteKind::Tag)
            .with_prefix("/date/", RouteKind::Date)
            .with_prefix("/author/", RouteKind::Author)
    }
}

impl RouteClassifier for PrefixClassifier {
    fn classify(&self, path: &str) -> RouteKind {
        if path.is_empty() || path == "/" {
            return RouteKind::Homepage;
        }

        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()) && path.len() > prefix.len())
            .map(|(_, kind)| *kind)
            .unwrap_or(RouteKind::Other)
    }
}
