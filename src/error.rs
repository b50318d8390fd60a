use thiserror::Error;

use crate::feed::FetchError;
use crate::storage::StoreError;
use crate::util::UrlError;

/// Operation-level errors the request layer maps to transport statuses.
///
/// The first three variants are expected outcomes rejected before any write;
/// `Fetch` is aggregated into batch refresh results; `Integrity` means a
/// storage invariant broke unexpectedly and the enclosing transaction was
/// rolled back.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input (bad URL, unknown icon, move into own descendant).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Referenced collection or item does not exist or is not owned by the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The owner already has a collection with this normalized feed URL.
    #[error("duplicate feed URL")]
    DuplicateFeed,

    /// Feed unreachable, non-2xx, or unparsable.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Storage-level invariant violated; the operation was rolled back.
    #[error("storage integrity violation: {0}")]
    Integrity(String),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateUrl => Error::DuplicateFeed,
            other => Error::Integrity(other.to_string()),
        }
    }
}

impl From<UrlError> for Error {
    fn from(e: UrlError) -> Self {
        Error::Validation(e.to_string())
    }
}

/// Convenience alias used across the operation surface.
pub type Result<T> = std::result::Result<T, Error>;
