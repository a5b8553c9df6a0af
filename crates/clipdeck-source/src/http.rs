//! Media server client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use clipdeck_models::{Resource, SourceLocator};

use crate::config::SourceConfig;
use crate::error::{SourceError, SourceResult};
use crate::types::{ItemInfo, ResolvedSource};
use crate::MediaSource;

/// Client for a media server exposing `GET /api/items/{id}`.
#[derive(Debug, Clone)]
pub struct HttpMediaSource {
    client: Client,
    config: SourceConfig,
    base: Url,
}

impl HttpMediaSource {
    pub fn new(config: SourceConfig) -> SourceResult<Self> {
        let mut base = Url::parse(&config.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            base,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> SourceResult<Self> {
        Self::new(SourceConfig::from_env()?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub fn item_url(&self, item_id: &str) -> SourceResult<Url> {
        Ok(self.base.join(&format!("api/items/{item_id}"))?)
    }

    /// Fetch an item document.
    pub async fn fetch_item(&self, item_id: &str) -> SourceResult<ItemInfo> {
        let url = self.item_url(item_id)?;
        debug!("Fetching media server item {}", url);

        let response = self
            .authorize(self.client.get(url.clone()))
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: body.chars().take(500).collect(),
            });
        }

        let item: ItemInfo = response
            .json()
            .await
            .map_err(|e| SourceError::validation(format!("malformed item document: {e}")))?;

        if item.id != item_id {
            return Err(SourceError::validation(format!(
                "requested item {item_id} but server returned {}",
                item.id
            )));
        }
        if item.local_path.is_none() && item.download_url.is_none() {
            return Err(SourceError::validation(format!(
                "item {item_id} has neither a local path nor a download URL"
            )));
        }
        Ok(item)
    }

    /// Stream `url` into `dest`. Returns bytes written.
    pub async fn download_to(&self, url: &str, dest: &Path) -> SourceResult<u64> {
        let url = self.base.join(url)?;
        info!("Downloading {} -> {}", url, dest.display());

        // The token is only for the media server; signed URLs on other hosts go bare.
        let mut request = self.client.get(url.clone());
        if url.origin() == self.base.origin() {
            request = self.authorize(request);
        } else {
            debug!("Download {} is cross-origin, sending without credentials", url);
        }
        let mut response = request
            .timeout(self.config.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: String::new(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = dest.with_extension("download");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;

        let copied: SourceResult<()> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(match e {
                SourceError::Network(err) => SourceError::fetch(format!(
                    "download of {url} interrupted after {written} bytes: {err}"
                )),
                other => other,
            });
        }
        drop(file);

        if written == 0 {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SourceError::fetch(format!("{url} returned an empty body")));
        }

        tokio::fs::rename(&partial, dest).await?;
        info!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

/// File name for a download: item id plus the URL's extension, if any.
fn download_file_name(item_id: &str, url: &str) -> String {
    let ext = Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .map(|e| e.to_string_lossy().to_string())
        })
        .or_else(|| {
            Path::new(url.split('?').next().unwrap_or(url))
                .extension()
                .map(|e| e.to_string_lossy().to_string())
        })
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "media".to_string());
    let safe_id: String = item_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    format!("source-{safe_id}.{ext}")
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn resolve(&self, resource: &Resource) -> SourceResult<ResolvedSource> {
        let SourceLocator::MediaServer { item_id } = &resource.source else {
            return Err(SourceError::validation(format!(
                "resource {} is not a media server item",
                resource.id
            )));
        };

        let item = self.fetch_item(item_id).await?;
        let mut resolved = ResolvedSource::new(resource.source.clone());
        resolved.title = Some(item.title).filter(|t| !t.is_empty());
        resolved.duration_secs = item.duration_secs;
        resolved.local_path = item.local_path;
        resolved.download_url = item.download_url;
        Ok(resolved)
    }

    async fn download(&self, resolved: &ResolvedSource, dest_dir: &Path) -> SourceResult<PathBuf> {
        let SourceLocator::MediaServer { item_id } = &resolved.locator else {
            return Err(SourceError::validation("not a media server source"));
        };
        let url = resolved.download_url.as_deref().ok_or_else(|| {
            SourceError::validation(format!("item {item_id} has no download URL"))
        })?;

        let dest = dest_dir.join(download_file_name(item_id, url));
        self.download_to(url, &dest).await?;
        Ok(dest)
    }
}
