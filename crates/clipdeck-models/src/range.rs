//! Range (bookmark) models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Job, JobKind, JobStatus, RangeId, ResourceId};

/// A user-defined start/end pair within a resource's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Range {
    pub id: RangeId,
    pub resource_id: ResourceId,

    /// Start offset in seconds
    pub start: f64,

    /// End offset in seconds
    pub end: f64,

    #[serde(default)]
    pub label: String,

    /// Position within the resource's range list
    #[serde(default)]
    pub order_index: u32,

    /// Derived clip artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<PathBuf>,

    pub created_at: DateTime<Utc>,

    /// Last edit
    pub updated_at: DateTime<Utc>,
}

impl Range {
    pub fn new(resource_id: ResourceId, start: f64, end: f64, label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RangeId::new(),
            resource_id,
            start,
            end,
            label: label.into(),
            order_index: 0,
            clip_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_order_index(mut self, order_index: u32) -> Self {
        self.order_index = order_index;
        self
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Whether the derived clip reflects the latest edit.
    ///
    /// The clip is current only when the most recent completed export job for
    /// this range finished after the range was last edited.
    pub fn clip_is_current<'a>(&self, jobs: impl IntoIterator<Item = &'a Job>) -> bool {
        let latest_completed = jobs
            .into_iter()
            .filter(|job| {
                job.kind == JobKind::RangeExport
                    && job.status == JobStatus::Completed
                    && job.range_id().as_ref() == Some(&self.id)
            })
            .filter_map(|job| job.finished_at)
            .max();

        match latest_completed {
            Some(finished) => self.clip_path.is_some() && finished > self.updated_at,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn completed_export(range: &Range, finished_at: DateTime<Utc>) -> Job {
        let mut job = Job::new_range_export(range.resource_id.clone(), &range.id);
        job.status = JobStatus::Completed;
        job.finished_at = Some(finished_at);
        job
    }

    #[test]
    fn test_clip_current_after_export() {
        let mut range = Range::new(ResourceId::from("res"), 1.0, 4.0, "intro");
        range.clip_path = Some(PathBuf::from("/tmp/clip.mp4"));
        let job = completed_export(&range, range.updated_at + Duration::seconds(2));
        assert!(range.clip_is_current([&job]));
    }

    #[test]
    fn test_clip_stale_after_edit() {
        let mut range = Range::new(ResourceId::from("res"), 1.0, 4.0, "intro");
        range.clip_path = Some(PathBuf::from("/tmp/clip.mp4"));
        let job = completed_export(&range, range.updated_at - Duration::seconds(2));
        assert!(!range.clip_is_current([&job]));
    }

    #[test]
    fn test_clip_ignores_other_ranges_and_failed_jobs() {
        let mut range = Range::new(ResourceId::from("res"), 1.0, 4.0, "intro");
        range.clip_path = Some(PathBuf::from("/tmp/clip.mp4"));
        let other = Range::new(ResourceId::from("res"), 5.0, 6.0, "other");
        let other_job = completed_export(&other, range.updated_at + Duration::seconds(2));
        let mut failed = completed_export(&range, range.updated_at + Duration::seconds(2));
        failed.status = JobStatus::Failed;
        assert!(!range.clip_is_current([&other_job, &failed]));
    }

    #[test]
    fn test_duration_never_negative() {
        let range = Range::new(ResourceId::from("res"), 5.0, 3.0, "");
        assert_eq!(range.duration(), 0.0);
    }
}
