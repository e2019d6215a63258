//! Error types for the site access layer.

/// Errors that can occur while driving the page fetcher.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read
    /// (network error, TLS failure, connection reset).
    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The site answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },
    /// The page did not become ready within the wait bound.
    #[error("timed out after {seconds}s waiting for {url}")]
    Timeout { url: String, seconds: u64 },
    /// A base endpoint or detail URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The fetcher resource itself could not be created.
    #[error("failed to launch page fetcher: {0}")]
    Launch(String),
    /// An operation needing a loaded page was called before any navigation.
    #[error("no page loaded")]
    NoPage,
}
