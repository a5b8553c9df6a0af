//! Job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{JobId, RangeId, ResourceId};

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created by a trigger, not yet claimed
    #[default]
    Pending,
    /// Claimed and running
    Processing,
    /// Finished successfully
    Completed,
    /// Aborted by an error (or interrupted by a restart)
    Failed,
    /// Superseded before completion
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Pending or processing.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Full resource pipeline: acquire, transcode, shots, frames, clips
    ResourceProcessing,
    /// Re-derivation of one range's clip after an edit
    RangeExport,
    /// Multi-clip export package build
    ExportPackage,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::ResourceProcessing,
        JobKind::RangeExport,
        JobKind::ExportPackage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ResourceProcessing => "resource_processing",
            JobKind::RangeExport => "range_export",
            JobKind::ExportPackage => "export_package",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Resource the job operates on
    pub resource_id: ResourceId,

    /// Job kind
    pub kind: JobKind,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Error message (if failed or cancelled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Opaque kind-specific payload
    #[serde(default)]
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(resource_id: ResourceId, kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            resource_id,
            kind,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            payload,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Create a pending range export job carrying the range id in its payload.
    pub fn new_range_export(resource_id: ResourceId, range_id: &RangeId) -> Self {
        Self::new(
            resource_id,
            JobKind::RangeExport,
            serde_json::json!({ "range_id": range_id }),
        )
    }

    /// Range targeted by a range export job.
    pub fn range_id(&self) -> Option<RangeId> {
        self.payload
            .get("range_id")
            .and_then(|v| v.as_str())
            .map(RangeId::from)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
