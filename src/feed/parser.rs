use anyhow::Result;
use feed_rs::parser;

use crate::storage::ParsedItem;

/// Reading speed used for the reading-time estimate.
const WORDS_PER_MINUTE: usize = 200;

/// Outcome of parsing a feed document: normalized candidate items plus the
/// number of entries skipped because they carried no link (the item URL is
/// the deduplication key, so link-less entries cannot be reconciled).
pub struct ParseResult {
    pub items: Vec<ParsedItem>,
    pub skipped: usize,
}

/// Parses RSS/Atom bytes into normalized candidate items.
///
/// Missing optional fields fall back: title to "Untitled", summary stays the
/// entry description, full text to the content body or the summary. Zero
/// entries is a valid empty result, not an error.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult> {
    let feed = parser::parse(bytes)?;

    let mut skipped = 0;
    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(url) = entry.links.first().map(|l| l.href.clone()) else {
            skipped += 1;
            continue;
        };
        let comments = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("replies"))
            .map(|l| l.href.clone());

        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string());
        let summary = entry.summary.map(|s| s.content);
        let full_text = entry
            .content
            .and_then(|c| c.body)
            .or_else(|| summary.clone());

        let date_published = entry.published.or(entry.updated).map(|d| d.timestamp());
        let date_updated = entry.updated.or(entry.published).map(|d| d.timestamp());

        let thumbnail_url = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.first())
            .next()
            .map(|t| t.image.uri.clone());

        let categories = entry
            .categories
            .into_iter()
            .map(|c| c.label.unwrap_or(c.term))
            .collect();

        let reading_time = estimate_reading_time(full_text.as_deref().unwrap_or(""));

        items.push(ParsedItem {
            url,
            title,
            summary,
            full_text,
            thumbnail_url,
            date_published,
            date_updated,
            categories,
            comments,
            reading_time,
        });
    }

    Ok(ParseResult { items, skipped })
}

/// Estimated minutes to read `text`, rounded up and never zero.
pub fn estimate_reading_time(text: &str) -> i64 {
    let words = text.split_whitespace().count();
    (words.div_ceil(WORDS_PER_MINUTE)).max(1) as i64
}
