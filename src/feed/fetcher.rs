use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;

use super::parser::{parse_feed, ParseResult};

/// Errors that can occur while retrieving and parsing a remote feed.
///
/// A feed that parses to zero items is Ok, not an error — only
/// unreachable/invalid feeds produce a `FetchError`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("response too large")]
    ResponseTooLarge,
    /// Body could not be parsed as RSS or Atom
    #[error("parse error: {0}")]
    Parse(String),
    /// Reconciliation write failed after a successful fetch
    #[error("storage error: {0}")]
    Storage(String),
}

/// Fetches and parses one feed document.
///
/// The request is bounded by `timeout`; the body read is bounded by
/// `size_limit` bytes. A stuck or oversized fetch fails this collection only
/// and must not delay unrelated collections — the caller fans out one task
/// per collection.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    size_limit: usize,
) -> Result<ParseResult, FetchError> {
    let bytes = fetch_bytes(client, url, timeout, size_limit).await?;

    let result = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    if result.skipped > 0 {
        tracing::warn!(
            feed = %url,
            skipped = result.skipped,
            "entries without links skipped"
        );
    }
    Ok(result)
}

/// Retrieve a feed body with timeout, status check, and size cap.
pub(crate) async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    size_limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let response = tokio::time::timeout(timeout, client.get(url).send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, size_limit).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust Content-Length when present
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
