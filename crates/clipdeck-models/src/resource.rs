//! Resource (source media) models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{JobStatus, ResourceId};

/// Where a resource's source media lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceLocator {
    /// Item on a remote media server
    MediaServer { item_id: String },
    /// Public video host URL (fetched through yt-dlp)
    VideoHost { url: String },
    /// File already on this machine
    LocalFile { path: PathBuf },
}

/// The parent media entity jobs operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Resource {
    pub id: ResourceId,

    /// Workspace name
    pub name: String,

    /// Content title
    #[serde(default)]
    pub title: String,

    pub source: SourceLocator,

    /// Duration in seconds, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Canonical transcoded file, once produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_path: Option<PathBuf>,

    /// Mirrors the status of the most recent job
    #[serde(default)]
    pub processing_status: JobStatus,

    /// Mirrors the progress of the most recent job
    #[serde(default)]
    pub processing_progress: u8,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    pub fn new(name: impl Into<String>, title: impl Into<String>, source: SourceLocator) -> Self {
        let now = Utc::now();
        Self {
            id: ResourceId::new(),
            name: name.into(),
            title: title.into(),
            source,
            duration_secs: None,
            canonical_path: None,
            processing_status: JobStatus::Pending,
            processing_progress: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
