//! Error taxonomy for crawling and fetching.
//!
//! None of these errors escape a crawl: the crawler maps them onto per-item
//! skips or a per-source terminal status. They exist so the retry policy can
//! tell transient failures (worth another attempt) from permanent ones.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// Malformed date, number or document structure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Network failure or timeout.
    #[error("network error: {0}")]
    Fetch(String),

    /// The site answered with a blocking-class status (403, 429, 503).
    #[error("blocked by remote (status {status})")]
    Blocked { status: u16 },

    /// Any other non-success status.
    #[error("unexpected HTTP status {status}")]
    Http { status: u16 },

    /// Credentials were rejected or the login flow broke.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A request could not be built (bad URL, bad query).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A whole source gave up after exhausting retries.
    #[error("source aborted: {0}")]
    SourceAborted(String),
}

impl CrawlError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CrawlError::Fetch(_) | CrawlError::Blocked { .. } => true,
            CrawlError::Http { status } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, CrawlError::Blocked { .. })
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        CrawlError::Fetch(err.to_string())
    }
}

impl From<url::ParseError> for CrawlError {
    fn from(err: url::ParseError) -> Self {
        CrawlError::InvalidRequest(err.to_string())
    }
}

/// Map a response status onto the taxonomy; `None` means success.
pub fn classify_status(status: u16) -> Option<CrawlError> {
    match status {
        200..=299 => None,
        403 | 429 | 503 => Some(CrawlError::Blocked { status }),
        _ => Some(CrawlError::Http { status }),
    }
}
