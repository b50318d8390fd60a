//! Utility functions shared across the crate.
//!
//! - **Slug derivation**: deterministic URL-safe slugs from collection titles
//! - **URL normalization**: canonical form for feed URLs, used as the
//!   owner-scoped deduplication key

mod slug;
mod url;

pub use slug::slugify;
pub use url::{normalize_url, UrlError};
