use thiserror::Error;
use url::Url;

/// Errors that can occur while normalizing a feed URL.
#[derive(Debug, Error)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Normalizes a feed URL into its canonical stored form.
///
/// The canonical form is what duplicate detection compares on, so two
/// spellings of the same feed address must normalize identically:
///
/// - scheme and host lowercased
/// - default ports stripped
/// - fragment dropped
/// - a bare trailing slash on the root path removed
/// - a missing scheme defaults to `http://`
///
/// # Errors
///
/// Returns [`UrlError`] if the input cannot be parsed, uses a non-HTTP(S)
/// scheme, or has no host.
///
/// # Examples
///
/// ```
/// use roost::util::normalize_url;
///
/// assert_eq!(
///     normalize_url("HTTPS://Example.COM:443/feed#latest").unwrap(),
///     "https://example.com/feed"
/// );
/// assert_eq!(normalize_url("example.com").unwrap(), "http://example.com");
/// ```
pub fn normalize_url(input: &str) -> Result<String, UrlError> {
    let trimmed = input.trim();

    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("http://{trimmed}"))?,
        Err(e) => return Err(e.into()),
    };

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    // The url crate already lowercases scheme and host and omits known
    // default ports when serializing.
    let mut normalized = url.to_string();
    if url.path() == "/" && url.query().is_none() && normalized.ends_with('/') {
        normalized.pop();
    }

    Ok(normalized)
}
