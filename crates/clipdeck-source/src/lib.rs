//! Source media acquisition.
//!
//! This crate provides:
//! - The [`MediaSource`] trait: resolve a resource, then download it
//! - [`HttpMediaSource`] for a media server with a bearer-token item API
//! - [`VideoHostSource`] for public video URLs via yt-dlp
//! - [`SourceRouter`], which dispatches on the resource's locator and serves
//!   local files directly

pub mod config;
pub mod error;
pub mod http;
pub mod types;
pub mod video_host;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use clipdeck_models::{Resource, SourceLocator};

pub use config::SourceConfig;
pub use error::{SourceError, SourceResult};
pub use http::HttpMediaSource;
pub use types::{AcquiredMedia, ItemInfo, ResolvedSource};
pub use video_host::VideoHostSource;

/// A place source media comes from.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Look up metadata and where the bytes can be read from.
    async fn resolve(&self, resource: &Resource) -> SourceResult<ResolvedSource>;

    /// Fetch the media into `dest_dir`, returning the written file.
    async fn download(&self, resolved: &ResolvedSource, dest_dir: &Path) -> SourceResult<PathBuf>;
}

/// Routes each resource to the source matching its locator.
#[derive(Clone, Default)]
pub struct SourceRouter {
    media_server: Option<Arc<dyn MediaSource>>,
    video_host: Option<Arc<dyn MediaSource>>,
}

impl SourceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media_server(mut self, source: Arc<dyn MediaSource>) -> Self {
        self.media_server = Some(source);
        self
    }

    pub fn with_video_host(mut self, source: Arc<dyn MediaSource>) -> Self {
        self.video_host = Some(source);
        self
    }

    fn route(&self, locator: &SourceLocator) -> SourceResult<Option<&Arc<dyn MediaSource>>> {
        match locator {
            SourceLocator::LocalFile { .. } => Ok(None),
            SourceLocator::MediaServer { .. } => self
                .media_server
                .as_ref()
                .map(Some)
                .ok_or_else(|| SourceError::not_configured("no media server configured")),
            SourceLocator::VideoHost { .. } => self
                .video_host
                .as_ref()
                .map(Some)
                .ok_or_else(|| SourceError::not_configured("no video host source configured")),
        }
    }
}

#[async_trait]
impl MediaSource for SourceRouter {
    async fn resolve(&self, resource: &Resource) -> SourceResult<ResolvedSource> {
        match self.route(&resource.source)? {
            Some(source) => source.resolve(resource).await,
            None => {
                let SourceLocator::LocalFile { path } = &resource.source else {
                    return Err(SourceError::validation("unroutable source"));
                };
                if !path.is_file() {
                    return Err(SourceError::validation(format!(
                        "local file {} does not exist",
                        path.display()
                    )));
                }
                let mut resolved = ResolvedSource::new(resource.source.clone());
                resolved.local_path = Some(path.clone());
                Ok(resolved)
            }
        }
    }

    async fn download(&self, resolved: &ResolvedSource, dest_dir: &Path) -> SourceResult<PathBuf> {
        match self.route(&resolved.locator)? {
            Some(source) => source.download(resolved, dest_dir).await,
            None => Err(SourceError::validation(
                "local files are read in place, not downloaded",
            )),
        }
    }
}

/// Resolve a resource and make its media readable.
///
/// Prefers a directly accessible local file; otherwise downloads into
/// `temp_dir`, which the caller owns and may clean up.
pub async fn acquire(
    source: &dyn MediaSource,
    resource: &Resource,
    temp_dir: &Path,
) -> SourceResult<(ResolvedSource, AcquiredMedia)> {
    let resolved = source.resolve(resource).await?;

    if let Some(path) = resolved.accessible_local_path() {
        info!(
            resource_id = %resource.id,
            "Using local source file {}",
            path.display()
        );
        let media = AcquiredMedia::Local(path.clone());
        return Ok((resolved, media));
    }

    if resolved.download_url.is_none() {
        return Err(SourceError::validation(format!(
            "resource {} has no accessible file and no download location",
            resource.id
        )));
    }

    let path = source.download(&resolved, temp_dir).await?;
    Ok((resolved, AcquiredMedia::Downloaded(path)))
}
