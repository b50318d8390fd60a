use std::time::Duration;

use super::fetcher::{fetch_bytes, FetchError};

/// Feed-level metadata returned by a probe, used to let a user confirm a
/// candidate URL before adding it. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct FeedInfo {
    pub title: String,
    pub description: Option<String>,
}

/// Fetches a candidate URL and parses only its feed-level metadata.
///
/// The owner-scoped duplicate check happens in the operation layer before
/// this runs; here a URL either yields `FeedInfo` or a [`FetchError`].
pub async fn probe_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    size_limit: usize,
) -> Result<FeedInfo, FetchError> {
    let bytes = fetch_bytes(client, url, timeout, size_limit).await?;

    let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(FeedInfo {
        title: feed
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string()),
        description: feed.description.map(|t| t.content),
    })
}
