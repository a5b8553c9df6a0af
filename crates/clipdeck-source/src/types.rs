//! Source resolution types.

use clipdeck_models::SourceLocator;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Item document returned by the media server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// What a source knows about a resource's media before acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub locator: SourceLocator,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
    /// Readable file on this machine
    pub local_path: Option<PathBuf>,
    /// Remote location to fetch from when no local file is available
    pub download_url: Option<String>,
}

impl ResolvedSource {
    pub fn new(locator: SourceLocator) -> Self {
        Self {
            locator,
            title: None,
            duration_secs: None,
            local_path: None,
            download_url: None,
        }
    }

    /// Local path, if it is readable right now.
    pub fn accessible_local_path(&self) -> Option<&PathBuf> {
        self.local_path.as_ref().filter(|p| p.is_file())
    }
}

/// Where acquired media ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquiredMedia {
    /// Direct access to a file the pipeline does not own
    Local(PathBuf),
    /// File fetched into the managed temp dir; removable after transcoding
    Downloaded(PathBuf),
}

impl AcquiredMedia {
    pub fn path(&self) -> &PathBuf {
        match self {
            AcquiredMedia::Local(p) | AcquiredMedia::Downloaded(p) => p,
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, AcquiredMedia::Downloaded(_))
    }
}
