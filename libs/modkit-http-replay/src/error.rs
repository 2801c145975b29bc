use std::path::PathBuf;
use thiserror::Error;

/// Boxed error type used at the tower service boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Record-and-replay error types
///
/// A store miss is never an error: it is reported as a synthesized `404`
/// response. These variants cover everything else that can fail while
/// capturing, persisting, or assembling a stored response.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReplayError {
    /// Filesystem operation on the store directory failed
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata or body (de)serialization failed
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Header name is not a valid HTTP token
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Header value contains forbidden bytes
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Fixture URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri { url: String, reason: String },

    /// Container was built without a target URL or key
    #[error("Response container has no request key; call `url()` or `key()` first")]
    MissingKey,

    /// Reading a live response body failed
    #[error("Failed to read response body: {0}")]
    Body(#[source] BoxError),
}

impl ReplayError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
