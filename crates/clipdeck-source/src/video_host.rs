//! Video-host source backed by yt-dlp.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clipdeck_media::{download_video, fetch_video_info, CommandExecutor, ExecOptions, MediaTools};
use clipdeck_models::{Resource, SourceLocator};

use crate::error::{SourceError, SourceResult};
use crate::types::ResolvedSource;
use crate::MediaSource;

/// Fetches public video-host URLs through the process executor.
#[derive(Clone)]
pub struct VideoHostSource {
    executor: Arc<dyn CommandExecutor>,
    tools: MediaTools,
    info_options: ExecOptions,
    download_options: ExecOptions,
}

impl VideoHostSource {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        tools: MediaTools,
        info_options: ExecOptions,
        download_options: ExecOptions,
    ) -> Self {
        Self {
            executor,
            tools,
            info_options,
            download_options,
        }
    }
}

fn video_url(locator: &SourceLocator) -> SourceResult<&str> {
    match locator {
        SourceLocator::VideoHost { url } => Ok(url),
        _ => Err(SourceError::validation("not a video host source")),
    }
}

#[async_trait]
impl MediaSource for VideoHostSource {
    async fn resolve(&self, resource: &Resource) -> SourceResult<ResolvedSource> {
        let url = video_url(&resource.source)?;
        if url::Url::parse(url).is_err() {
            return Err(SourceError::validation(format!("invalid video URL: {url}")));
        }

        let info = fetch_video_info(
            self.executor.as_ref(),
            &self.tools,
            url,
            &self.info_options,
        )
        .await?;

        let mut resolved = ResolvedSource::new(resource.source.clone());
        resolved.title = info.title;
        resolved.duration_secs = info.duration;
        resolved.download_url = Some(url.to_string());
        Ok(resolved)
    }

    async fn download(&self, resolved: &ResolvedSource, dest_dir: &Path) -> SourceResult<PathBuf> {
        let url = video_url(&resolved.locator)?;
        Ok(download_video(
            self.executor.as_ref(),
            &self.tools,
            url,
            dest_dir,
            &self.download_options,
        )
        .await?)
    }
}
