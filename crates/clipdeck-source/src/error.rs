//! Source error types.

use clipdeck_media::MediaError;
use thiserror::Error;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors that can occur while resolving or fetching source media.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Source not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl SourceError {
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    /// Whether the upstream may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(_) | SourceError::Fetch(_) => true,
            SourceError::Http { status, .. } => *status >= 500 || *status == 429,
            SourceError::Media(e) => e.is_retryable(),
            _ => false,
        }
    }
}
