use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default refresh interval in minutes for collections that do not set one.
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: i64 = 60;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The owner already has a collection with this normalized URL
    /// (unique index on (owner_id, url)).
    #[error("duplicate feed URL for owner")]
    DuplicateUrl,

    /// A batch renumber write touched a different number of rows than planned.
    #[error("sibling renumbering touched {actual} rows, expected {expected}")]
    RenumberMismatch { expected: u64, actual: u64 },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Map unique-index violations on the owner/url pair to [`StoreError::DuplicateUrl`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.message().contains("idx_collections_owner_url") {
                return StoreError::DuplicateUrl;
            }
        }
        StoreError::Other(err)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Fixed icon set for collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Icon {
    #[default]
    Rss,
    Code,
    News,
    Science,
    Tech,
    Star,
    Globe,
    Book,
}

impl Icon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Icon::Rss => "rss",
            Icon::Code => "code",
            Icon::News => "news",
            Icon::Science => "science",
            Icon::Tech => "tech",
            Icon::Star => "star",
            Icon::Globe => "globe",
            Icon::Book => "book",
        }
    }

    /// Parse a stored or client-supplied icon name. `None` for unknown names;
    /// the caller decides whether that is a validation error or a default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rss" => Some(Icon::Rss),
            "code" => Some(Icon::Code),
            "news" => Some(Icon::News),
            "science" => Some(Icon::Science),
            "tech" => Some(Icon::Tech),
            "star" => Some(Icon::Star),
            "globe" => Some(Icon::Globe),
            "book" => Some(Icon::Book),
            _ => None,
        }
    }
}

/// Display hint for rendering a collection's item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Card,
    Magazine,
    List,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Card => "card",
            Layout::Magazine => "magazine",
            Layout::List => "list",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(Layout::Card),
            "magazine" => Some(Layout::Magazine),
            "list" => Some(Layout::List),
            _ => None,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A node in the feed-source forest.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub slug: String,
    pub icon: Icon,
    pub parent_id: Option<i64>,
    /// Display position among siblings; dense and zero-based per parent.
    pub sort_order: i64,
    pub description: Option<String>,
    /// Normalized feed address, if this collection tracks a remote feed.
    pub url: Option<String>,
    /// Unix timestamp of the last successful refresh.
    pub date_updated: Option<i64>,
    /// Minutes between refreshes.
    pub refresh_interval: i64,
    pub layout: Layout,
}

/// Row tuple for collection selects.
pub(crate) type CollectionRow = (
    i64,            // id
    i64,            // owner_id
    String,         // title
    String,         // slug
    String,         // icon
    Option<i64>,    // parent_id
    i64,            // sort_order
    Option<String>, // description
    Option<String>, // url
    Option<i64>,    // date_updated
    i64,            // refresh_interval
    String,         // layout
);

pub(crate) const COLLECTION_COLUMNS: &str = "id, owner_id, title, slug, icon, parent_id, \
     sort_order, description, url, date_updated, refresh_interval, layout";

impl Collection {
    pub(crate) fn from_row(row: CollectionRow) -> Self {
        let (
            id,
            owner_id,
            title,
            slug,
            icon,
            parent_id,
            sort_order,
            description,
            url,
            date_updated,
            refresh_interval,
            layout,
        ) = row;
        Collection {
            id,
            owner_id,
            title,
            slug,
            icon: Icon::parse(&icon).unwrap_or_default(),
            parent_id,
            sort_order,
            description,
            url,
            date_updated,
            refresh_interval,
            layout: Layout::parse(&layout).unwrap_or_default(),
        }
    }
}

/// One fetched article belonging to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub collection_id: i64,
    /// Deduplication key within the collection.
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub full_text: Option<String>,
    pub thumbnail_url: Option<String>,
    pub date_published: Option<i64>,
    /// Last time the upstream entry changed.
    pub date_updated: i64,
    /// `None` means unread.
    pub date_read: Option<i64>,
    pub categories: Vec<String>,
    pub comments: Option<String>,
    /// Estimated reading time in minutes, always at least 1.
    pub reading_time: i64,
}

/// Row tuple for item selects.
pub(crate) type ItemRow = (
    i64,            // id
    i64,            // collection_id
    String,         // url
    String,         // title
    Option<String>, // summary
    Option<String>, // full_text
    Option<String>, // thumbnail_url
    Option<i64>,    // date_published
    i64,            // date_updated
    Option<i64>,    // date_read
    Option<String>, // categories (JSON array)
    Option<String>, // comments
    i64,            // reading_time
);

pub(crate) const ITEM_COLUMNS: &str = "id, collection_id, url, title, summary, full_text, \
     thumbnail_url, date_published, date_updated, date_read, categories, comments, reading_time";

impl Item {
    pub(crate) fn from_row(row: ItemRow) -> Self {
        let (
            id,
            collection_id,
            url,
            title,
            summary,
            full_text,
            thumbnail_url,
            date_published,
            date_updated,
            date_read,
            categories,
            comments,
            reading_time,
        ) = row;
        Item {
            id,
            collection_id,
            url,
            title,
            summary,
            full_text,
            thumbnail_url,
            date_published,
            date_updated,
            date_read,
            categories: categories
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok())
                .unwrap_or_default(),
            comments,
            reading_time,
        }
    }
}

/// A normalized candidate item produced by the feed parser, ready for
/// reconciliation against stored state.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub full_text: Option<String>,
    pub thumbnail_url: Option<String>,
    pub date_published: Option<i64>,
    /// Upstream change timestamp; falls back to fetch time on first insert.
    pub date_updated: Option<i64>,
    pub categories: Vec<String>,
    pub comments: Option<String>,
    pub reading_time: i64,
}

/// Fields for inserting a collection. Slug, order, and url normalization are
/// resolved by the caller before this reaches storage.
#[derive(Debug, Clone)]
pub struct StoredCollection {
    pub owner_id: i64,
    pub title: String,
    pub slug: String,
    pub icon: Icon,
    pub parent_id: Option<i64>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub refresh_interval: i64,
    pub layout: Layout,
}

/// Replacement fields for an update; `sort_order` is set only when the
/// parent changed and the node is appended to its new sibling group.
#[derive(Debug, Clone)]
pub struct CollectionUpdate {
    pub title: String,
    pub slug: String,
    pub icon: Icon,
    pub parent_id: Option<i64>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub refresh_interval: i64,
    pub sort_order: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_round_trip() {
        for icon in [
            Icon::Rss,
            Icon::Code,
            Icon::News,
            Icon::Science,
            Icon::Tech,
            Icon::Star,
            Icon::Globe,
            Icon::Book,
        ] {
            assert_eq!(Icon::parse(icon.as_str()), Some(icon));
        }
    }

    #[test]
    fn test_icon_unknown_name() {
        assert_eq!(Icon::parse("sparkles"), None);
    }

    #[test]
    fn test_layout_round_trip() {
        for layout in [Layout::Card, Layout::Magazine, Layout::List] {
            assert_eq!(Layout::parse(layout.as_str()), Some(layout));
        }
        assert_eq!(Layout::parse("mosaic"), None);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Icon::default(), Icon::Rss);
        assert_eq!(Layout::default(), Layout::Card);
    }
}
