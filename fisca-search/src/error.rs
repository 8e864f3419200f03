//! Error types for the fisca-search crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. No API keys or query strings appear in
//! error messages.

/// Errors that can occur while searching, ranking or enriching documents.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A backend refused the request or answered with an unusable payload.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend or extractor call did not finish within its time budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse a backend response or a fetched page.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search, ranking or enrichment configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl SearchError {
    /// Map a `reqwest` failure, keeping timeouts distinguishable.
    pub(crate) fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{context}: {err}"))
        } else {
            Self::Http(format!("{context}: {err}"))
        }
    }
}

/// Convenience type alias for fisca-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
