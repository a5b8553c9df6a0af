//! Media server client configuration.

use std::time::Duration;

use crate::error::{SourceError, SourceResult};

/// Configuration for the media server client.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Base URL, e.g. `http://media.local:8096`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    /// Timeout for metadata requests
    pub request_timeout: Duration,
    /// Timeout for byte-stream downloads
    pub download_timeout: Duration,
}

impl SourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(2 * 60 * 60),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Create config from environment variables.
    ///
    /// Fails when `CLIPDECK_MEDIA_SERVER_URL` is unset; the media server is
    /// optional, so callers usually treat that as "not configured".
    pub fn from_env() -> SourceResult<Self> {
        let base_url = std::env::var("CLIPDECK_MEDIA_SERVER_URL")
            .map_err(|_| SourceError::not_configured("CLIPDECK_MEDIA_SERVER_URL not set"))?;

        let mut config = Self::new(base_url);
        config.api_token = std::env::var("CLIPDECK_MEDIA_SERVER_TOKEN").ok();
        config.request_timeout = Duration::from_secs(
            std::env::var("CLIPDECK_MEDIA_SERVER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );
        config.download_timeout = Duration::from_secs(
            std::env::var("CLIPDECK_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2 * 60 * 60),
        );
        Ok(config)
    }
}
