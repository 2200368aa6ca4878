//! Cacheability policy.
//!
//! Decides once per request whether the rendered page is stored, and which
//! content-type bucket it belongs to. Rules are evaluated in a fixed order and
//! the first match wins:
//!
//! 1. caching disabled → not cacheable
//! 2. authenticated visitor → not cacheable
//! 3. not found → not cacheable
//! 4. homepage → cacheable unless homepage caching is off
//! 5. enabled single post / page
//! 6. enabled category / tag / date / author archive
//! 7. anything else → not cacheable

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{config::CacheConfig, route::RouteKind};

/// Content-type bucket of a cached page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentLabel {
    Homepage,
    Post,
    Page,
    Category,
    Tag,
    Date,
    Author,
    None,
}

impl ContentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentLabel::Homepage => "homepage",
            ContentLabel::Post => "post",
            ContentLabel::Page => "page",
            ContentLabel::Category => "category",
            ContentLabel::Tag => "tag",
            ContentLabel::Date => "date",
            ContentLabel::Author => "author",
            ContentLabel::None => "none",
        }
    }
}

impl fmt::Display for ContentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Singular content types that may be enabled for caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Post,
    Page,
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "post" => Ok(PostType::Post),
            "page" => Ok(PostType::Page),
            other => Err(format!("unknown post type `{other}`")),
        }
    }
}

/// Archive listings that may be enabled for caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    Category,
    Tag,
    Date,
    Author,
}

impl FromStr for ArchiveType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "category" => Ok(ArchiveType::Category),
            "tag" => Ok(ArchiveType::Tag),
            "date" => Ok(ArchiveType::Date),
            "author" => Ok(ArchiveType::Author),
            other => Err(format!("unknown archive type `{other}`")),
        }
    }
}

/// Who is asking for the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visitor {
    pub authenticated: bool,
}

impl Visitor {
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
        }
    }

    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
        }
    }
}

/// Outcome of policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub cacheable: bool,
    pub label: ContentLabel,
}

impl Decision {
    const fn skip() -> Self {
        Self {
            cacheable: false,
            label: ContentLabel::None,
        }
    }

    const fn cache(label: ContentLabel) -> Self {
        Self {
            cacheable: true,
            label,
        }
    }
}

/// Evaluate the cacheability of a request.
pub fn evaluate(config: &CacheConfig, visitor: Visitor, route: RouteKind) -> Decision {
    if !config.enabled || visitor.authenticated {
        return Decision::skip();
    }

    match route {
        RouteKind::NotFound | RouteKind::Other => Decision::skip(),
        // The homepage returns here even when disabled, so it is never also
        // classified as a page.
        RouteKind::Homepage => Decision {
            cacheable: config.cache_homepage,
            label: ContentLabel::Homepage,
        },
        RouteKind::Post if config.post_types.contains(&PostType::Post) => {
            Decision::cache(ContentLabel::Post)
        }
        RouteKind::Page if config.post_types.contains(&PostType::Page) => {
            Decision::cache(ContentLabel::Page)
        }
        RouteKind::Category if config.archives.contains(&ArchiveType::Category) => {
            Decision::cache(ContentLabel::Category)
        }
        RouteKind::Tag if config.archives.contains(&ArchiveType::Tag) => {
            Decision::cache(ContentLabel::Tag)
        }
        RouteKind::Date if config.archives.contains(&ArchiveType::Date) => {
            Decision::cache(ContentLabel::Date)
        }
        RouteKind::Author if config.archives.contains(&ArchiveType::Author) => {
            Decision::cache(ContentLabel::Author)
        }
        _ => Decision::skip(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const ALL_ROUTES: [RouteKind; 9] = [
        RouteKind::Homepage,
        RouteKind::Post,
        RouteKind::Page,
        RouteKind::Category,
        RouteKind::Tag,
        RouteKind::Date,
        RouteKind::Author,
        RouteKind::NotFound,
        RouteKind::Other,
    ];

    fn everything_enabled() -> CacheConfig {
        CacheConfig {
            enabled: true,
            cache_homepage: true,
            post_types: BTreeSet::from([PostType::Post, PostType::Page]),
            archives: BTreeSet::from([
                ArchiveType::Category,
                ArchiveType::Tag,
                ArchiveType::Date,
                ArchiveType::Author,
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn disabled_master_switch_caches_nothing() {
        let config = CacheConfig {
            enabled: false,
            ..everything_enabled()
        };
        for route in ALL_ROUTES {
            assert!(!evaluate(&config, Visitor::anonymous(), route).cacheable);
        }
    }

    #[test]
    fn authenticated_visitor_is_never_cacheable() {
        let config = everything_enabled();
        for route in ALL_ROUTES {
            let decision = evaluate(&config, Visitor::authenticated(), route);
            assert!(!decision.cacheable, "{route:?} cached for logged-in visitor");
        }
    }

    #[test]
    fn not_found_is_never_cacheable() {
        let decision = evaluate(&everything_enabled(), Visitor::anonymous(), RouteKind::NotFound);
        assert_eq!(decision, Decision::skip());
    }

    #[test]
    fn homepage_is_cached_by_default() {
        let decision = evaluate(&everything_enabled(), Visitor::anonymous(), RouteKind::Homepage);
        assert_eq!(decision, Decision::cache(ContentLabel::Homepage));
    }

    #[test]
    fn homepage_opt_out_keeps_label_and_short_circuits() {
        let config = CacheConfig {
            cache_homepage: false,
            ..everything_enabled()
        };
        let decision = evaluate(&config, Visitor::anonymous(), RouteKind::Homepage);
        assert!(!decision.cacheable);
        assert_eq!(decision.label, ContentLabel::Homepage);
    }

    #[test]
    fn singular_types_follow_enabled_set() {
        let config = CacheConfig {
            post_types: BTreeSet::from([PostType::Post]),
            ..everything_enabled()
        };
        assert_eq!(
            evaluate(&config, Visitor::anonymous(), RouteKind::Post),
            Decision::cache(ContentLabel::Post)
        );
        assert_eq!(
            evaluate(&config, Visitor::anonymous(), RouteKind::Page),
            Decision::skip()
        );
    }

    #[test]
    fn archives_follow_enabled_set() {
        let config = CacheConfig {
            archives: BTreeSet::from([ArchiveType::Tag, ArchiveType::Author]),
            ..everything_enabled()
        };
        let visitor = Visitor::anonymous();
        assert_eq!(
            evaluate(&config, visitor, RouteKind::Tag).label,
            ContentLabel::Tag
        );
        assert_eq!(
            evaluate(&config, visitor, RouteKind::Author).label,
            ContentLabel::Author
        );
        assert!(!evaluate(&config, visitor, RouteKind::Category).cacheable);
        assert!(!evaluate(&config, visitor, RouteKind::Date).cacheable);
    }

    #[test]
    fn other_routes_are_not_cacheable() {
        let decision = evaluate(&everything_enabled(), Visitor::anonymous(), RouteKind::Other);
        assert_eq!(decision, Decision::skip());
    }

    #[test]
    fn parse_type_names() {
        assert_eq!("post".parse::<PostType>(), Ok(PostType::Post));
        assert_eq!(" page ".parse::<PostType>(), Ok(PostType::Page));
        assert!("attachment".parse::<PostType>().is_err());
        assert_eq!("date".parse::<ArchiveType>(), Ok(ArchiveType::Date));
        assert!("month".parse::<ArchiveType>().is_err());
    }
}
