//! On-disk layout of a resource's artifacts.

use std::path::{Path, PathBuf};

use clipdeck_media::frames::SIDECAR_FILE;
use clipdeck_models::{RangeId, ResourceId};

pub const CANONICAL_FILE: &str = "canonical.mp4";

/// `data_dir/<resource_id>/` and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    root: PathBuf,
}

impl ResourceLayout {
    pub fn new(data_dir: &Path, resource_id: &ResourceId) -> Self {
        Self {
            root: data_dir.join(resource_id.as_str()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.root.join(CANONICAL_FILE)
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn sidecar_path(&self) -> PathBuf {
        self.frames_dir().join(SIDECAR_FILE)
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.root.join("clips")
    }

    /// Deterministic per range, so regenerations overwrite in place.
    pub fn clip_path(&self, range_id: &RangeId) -> PathBuf {
        self.clips_dir().join(format!("{}.mp4", range_id.as_str()))
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    /// The resource's export archive; a new export overwrites it.
    pub fn archive_path(&self, package_name: &str) -> PathBuf {
        self.exports_dir().join(format!("{package_name}.tar.gz"))
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.clips_dir()).await?;
        tokio::fs::create_dir_all(self.exports_dir()).await?;
        Ok(())
    }
}
