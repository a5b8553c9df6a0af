//! Patch and filter types.

use chrono::{DateTime, Utc};
use clipdeck_models::{Job, JobKind, JobStatus, RangeId, Resource, ResourceId};
use std::path::PathBuf;

/// Partial job update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    /// `Some(None)` clears the error.
    pub error: Option<Option<String>>,
    /// Replaces the payload, e.g. to record a job's output.
    pub payload: Option<serde_json::Value>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Move to processing.
    pub fn processing() -> Self {
        Self::new().status(JobStatus::Processing)
    }

    /// Finish successfully at 100%.
    pub fn completed() -> Self {
        Self::new().status(JobStatus::Completed).progress(100)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new().status(JobStatus::Failed).error(message)
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new().status(JobStatus::Cancelled).error(reason)
    }

    /// Apply to `job` at time `now`.
    ///
    /// Progress never moves backwards; timestamps follow status transitions.
    pub fn apply(&self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            if status == JobStatus::Processing && job.started_at.is_none() {
                job.started_at = Some(now);
            }
            if status.is_terminal() {
                job.finished_at = Some(now);
            }
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = job.progress.max(progress.min(100));
        }
        if let Some(error) = &self.error {
            job.error = error.clone();
        }
        if let Some(payload) = &self.payload {
            job.payload = payload.clone();
        }
        job.updated_at = now;
    }
}

/// Partial resource update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePatch {
    pub processing_status: Option<JobStatus>,
    pub processing_progress: Option<u8>,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
    pub canonical_path: Option<PathBuf>,
}

impl ResourcePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.processing_status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.processing_progress = Some(progress.min(100));
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn canonical_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.canonical_path = Some(path.into());
        self
    }

    pub fn apply(&self, resource: &mut Resource, now: DateTime<Utc>) {
        if let Some(status) = self.processing_status {
            resource.processing_status = status;
        }
        if let Some(progress) = self.processing_progress {
            resource.processing_progress = progress;
        }
        if let Some(title) = &self.title {
            resource.title = title.clone();
        }
        if let Some(duration) = self.duration_secs {
            resource.duration_secs = Some(duration);
        }
        if let Some(path) = &self.canonical_path {
            resource.canonical_path = Some(path.clone());
        }
        resource.updated_at = now;
    }
}

/// Job query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    pub resource_id: Option<ResourceId>,
    pub range_id: Option<RangeId>,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn resource(mut self, resource_id: ResourceId) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn range(mut self, range_id: RangeId) -> Self {
        self.range_id = Some(range_id);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self.kind.map_or(true, |k| job.kind == k)
            && self
                .resource_id
                .as_ref()
                .map_or(true, |r| &job.resource_id == r)
            && self
                .range_id
                .as_ref()
                .map_or(true, |r| job.range_id().as_ref() == Some(r))
    }
}
