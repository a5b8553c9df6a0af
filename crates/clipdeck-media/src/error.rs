//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Maximum characters of captured stderr carried in an error message.
const STDERR_TAIL_CHARS: usize = 800;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {}: {}", describe_exit(.exit_code, .signal), stderr_tail(.stderr))]
    ProcessExit {
        program: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("Cut points are not keyframe aligned")]
    NotKeyframeAligned,

    #[error("Unexpected tool output: {0}")]
    InvalidOutput(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    pub fn process_exit(
        program: impl Into<String>,
        exit_code: Option<i32>,
        signal: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ProcessExit {
            program: program.into(),
            exit_code,
            signal,
            stderr: stderr.into(),
        }
    }

    pub fn timeout(program: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            program: program.into(),
            secs,
        }
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Spawn failures and non-zero exits count toward a retry budget;
    /// timeouts and everything else do not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediaError::Spawn { .. } | MediaError::ProcessExit { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MediaError::Timeout { .. })
    }

    /// Captured diagnostics, when the failure came from a finished process.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::ProcessExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn describe_exit(exit_code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*exit_code, *signal) {
        (Some(code), _) => format!("exited with status {}", code),
        (None, Some(sig)) => format!("killed by signal {}", sig),
        (None, None) => "exited abnormally".to_string(),
    }
}

/// Last non-empty portion of stderr, trimmed to a bounded length.
pub fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let spawn = MediaError::spawn("ffmpeg", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(spawn.is_retryable());
        assert!(MediaError::process_exit("ffmpeg", Some(1), None, "").is_retryable());
        assert!(!MediaError::timeout("ffmpeg", 5).is_retryable());
        assert!(!MediaError::NotKeyframeAligned.is_retryable());
    }

    #[test]
    fn test_exit_message_carries_diagnostics() {
        let err = MediaError::process_exit("ffmpeg", Some(1), None, "\nInvalid data found\n");
        assert_eq!(err.to_string(), "ffmpeg exited with status 1: Invalid data found");

        let killed = MediaError::process_exit("ffmpeg", None, Some(9), "");
        assert!(killed.to_string().contains("killed by signal 9"));
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = "x".repeat(5000);
        let tail = stderr_tail(&long);
        assert!(tail.starts_with("..."));
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS + 3);
    }
}
