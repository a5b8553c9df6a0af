//! Startup recovery of interrupted work.
//!
//! Jobs still marked processing when the process starts belong to a run that
//! died without finishing them. The sweep:
//! - Marks every processing job failed with [`INTERRUPTED_MESSAGE`]
//! - Mirrors the failure onto the resources of interrupted processing jobs
//! - Repairs resources left processing with no processing job behind them
//!
//! Pending jobs are left alone. The sweep writes nothing when the store is
//! already consistent, so running it twice is harmless.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use clipdeck_models::{JobKind, JobStatus, ResourceId, StatusSummary};
use clipdeck_store::{JobFilter, JobPatch, ResourcePatch, Store};

use crate::error::WorkerResult;
use crate::metrics;

pub const INTERRUPTED_MESSAGE: &str = "Interrupted by server restart";

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub jobs_failed: usize,
    pub resources_reset: usize,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.jobs_failed == 0 && self.resources_reset == 0
    }
}

/// Run the recovery sweep once.
pub async fn run_recovery_sweep(store: &dyn Store) -> WorkerResult<RecoveryReport> {
    let failed = store
        .update_jobs(
            &JobFilter::all().status(JobStatus::Processing),
            JobPatch::failed(INTERRUPTED_MESSAGE),
        )
        .await?;

    for job in &failed {
        warn!(
            job_id = %job.id,
            resource_id = %job.resource_id,
            kind = %job.kind,
            "Marked interrupted job failed"
        );
        metrics::record_job(job.kind, JobStatus::Failed);
    }

    let interrupted: HashSet<ResourceId> = failed
        .iter()
        .filter(|job| job.kind == JobKind::ResourceProcessing)
        .map(|job| job.resource_id.clone())
        .collect();

    let mut resources_reset = 0;
    for resource in store.list_resources().await? {
        let stuck = resource.processing_status == JobStatus::Processing;
        let mirror = interrupted.contains(&resource.id)
            && (resource.processing_status != JobStatus::Failed
                || resource.processing_progress != 0);
        if !stuck && !mirror {
            continue;
        }

        store
            .update_resource(
                &resource.id,
                ResourcePatch::new().status(JobStatus::Failed).progress(0),
            )
            .await?;
        resources_reset += 1;
        warn!(resource_id = %resource.id, "Reset interrupted resource to failed");
    }

    let report = RecoveryReport {
        jobs_failed: failed.len(),
        resources_reset,
    };
    if report.is_clean() {
        info!("Recovery sweep found nothing to repair");
    } else {
        metrics::record_recovered_jobs(report.jobs_failed);
        info!(
            "Recovery sweep complete: {} jobs failed, {} resources reset",
            report.jobs_failed, report.resources_reset
        );
    }
    Ok(report)
}

/// Job counts per status and per kind and status.
pub async fn status_summary(store: &dyn Store) -> WorkerResult<StatusSummary> {
    let jobs = store.list_jobs(&JobFilter::all()).await?;
    Ok(StatusSummary::from_jobs(&jobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipdeck_models::{Job, Resource, SourceLocator};
    use clipdeck_store::MemoryStore;

    async fn seed(store: &MemoryStore, processing: usize) -> Resource {
        let mut resource = Resource::new(
            "workspace",
            "title",
            SourceLocator::LocalFile {
                path: "/tmp/in.mp4".into(),
            },
        );
        resource.processing_status = JobStatus::Processing;
        resource.processing_progress = 55;
        store.insert_resource(&resource).await.unwrap();

        for i in 0..processing {
            let kind = if i == 0 {
                JobKind::ResourceProcessing
            } else {
                JobKind::ExportPackage
            };
            let mut job = Job::new(resource.id.clone(), kind, serde_json::Value::Null);
            job.status = JobStatus::Processing;
            store.insert_job(&job).await.unwrap();
        }

        let pending = Job::new(
            resource.id.clone(),
            JobKind::RangeExport,
            serde_json::Value::Null,
        );
        store.insert_job(&pending).await.unwrap();
        resource
    }

    #[tokio::test]
    async fn test_sweep_fails_processing_jobs() {
        let store = MemoryStore::new();
        let resource = seed(&store, 3).await;

        let report = run_recovery_sweep(&store).await.unwrap();
        assert_eq!(report.jobs_failed, 3);
        assert_eq!(report.resources_reset, 1);

        let failed = store
            .list_jobs(&JobFilter::all().status(JobStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 3);
        assert!(failed
            .iter()
            .all(|j| j.error.as_deref() == Some(INTERRUPTED_MESSAGE)));

        let pending = store
            .list_jobs(&JobFilter::all().status(JobStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let resource = store.get_resource(&resource.id).await.unwrap().unwrap();
        assert_eq!(resource.processing_status, JobStatus::Failed);
        assert_eq!(resource.processing_progress, 0);
    }

    #[tokio::test]
    async fn test_second_sweep_is_noop() {
        let store = MemoryStore::new();
        seed(&store, 2).await;

        run_recovery_sweep(&store).await.unwrap();
        let before = store.list_jobs(&JobFilter::all()).await.unwrap();

        let report = run_recovery_sweep(&store).await.unwrap();
        assert!(report.is_clean());

        let after = store.list_jobs(&JobFilter::all()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let store = MemoryStore::new();
        seed(&store, 2).await;
        run_recovery_sweep(&store).await.unwrap();

        let summary = status_summary(&store).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.count(JobStatus::Failed), 2);
        assert_eq!(summary.count(JobStatus::Pending), 1);
        assert_eq!(
            summary.count_kind(JobKind::ResourceProcessing, JobStatus::Failed),
            1
        );
    }
}
