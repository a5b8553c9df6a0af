//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Longest error text persisted on a job.
pub const MAX_ERROR_TEXT_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not accepting work: {0}")]
    NotReady(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Archive failed: {0}")]
    ArchiveFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] clipdeck_media::MediaError),

    #[error("Store error: {0}")]
    Store(#[from] clipdeck_store::StoreError),

    #[error("Source error: {0}")]
    Source(#[from] clipdeck_source::SourceError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    /// The job was cancelled or otherwise finalized elsewhere.
    pub fn is_superseded(&self) -> bool {
        matches!(self, WorkerError::Store(e) if e.is_terminal_job())
    }

    /// Error text as stored on a failed job.
    pub fn error_text(&self) -> String {
        truncate_error_text(&self.to_string())
    }
}

/// Truncate to [`MAX_ERROR_TEXT_CHARS`] characters.
pub fn truncate_error_text(text: &str) -> String {
    match text.char_indices().nth(MAX_ERROR_TEXT_CHARS) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
