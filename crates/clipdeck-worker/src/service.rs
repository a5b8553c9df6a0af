//! Pipeline service facade.
//!
//! Trigger and poll entry points for the surrounding application. Built once
//! at startup with its dependencies injected; every job runs on its own task.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{error, info, warn};

use clipdeck_media::ChildRegistry;
use clipdeck_models::{
    ExportOptions, Job, JobId, JobKind, Range, RangeId, Resource, ResourceId,
    StatusSummary,
};

use crate::claims::ClaimTable;
use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::export::run_export_job;
use crate::metrics;
use crate::pipeline::run_resource_job;
use crate::recovery::{run_recovery_sweep, status_summary, RecoveryReport};
use crate::regeneration::RegenerationScheduler;

/// A user edit of a range. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeEdit {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub label: Option<String>,
}

pub struct PipelineService {
    ctx: PipelineContext,
    processing_claims: ClaimTable,
    export_claims: ClaimTable,
    scheduler: RegenerationScheduler,
    registry: Option<ChildRegistry>,
    accepting: AtomicBool,
}

impl PipelineService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            scheduler: RegenerationScheduler::new(ctx.clone()),
            ctx,
            processing_claims: ClaimTable::new("processing"),
            export_claims: ClaimTable::new("export"),
            registry: None,
            accepting: AtomicBool::new(false),
        }
    }

    /// Registry of live children to terminate on shutdown.
    pub fn with_child_registry(mut self, registry: ChildRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run the recovery sweep, then start accepting triggers.
    pub async fn startup(&self) -> WorkerResult<RecoveryReport> {
        tokio::fs::create_dir_all(&self.ctx.config.data_dir).await?;
        tokio::fs::create_dir_all(&self.ctx.config.temp_dir).await?;

        let report = run_recovery_sweep(self.ctx.store.as_ref()).await?;
        self.accepting.store(true, Ordering::SeqCst);
        info!(
            jobs_failed = report.jobs_failed,
            resources_reset = report.resources_reset,
            "Pipeline service accepting work"
        );
        Ok(report)
    }

    fn ensure_accepting(&self) -> WorkerResult<()> {
        if self.accepting.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(WorkerError::NotReady(
                "service has not started or is shutting down".to_string(),
            ))
        }
    }

    async fn require_resource(&self, resource_id: &ResourceId) -> WorkerResult<Resource> {
        self.ctx
            .store
            .get_resource(resource_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("resource {}", resource_id)))
    }

    async fn require_range(&self, range_id: &RangeId) -> WorkerResult<Range> {
        self.ctx
            .store
            .get_range(range_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("range {}", range_id)))
    }

    /// Start processing a resource.
    ///
    /// Returns `None` without persisting anything if the resource is already
    /// being processed.
    pub async fn start_resource_processing(
        &self,
        resource_id: &ResourceId,
    ) -> WorkerResult<Option<JobId>> {
        self.ensure_accepting()?;
        self.require_resource(resource_id).await?;

        let Some(claim) = self.processing_claims.try_claim(resource_id) else {
            info!(resource_id = %resource_id, "Processing already in flight, trigger dropped");
            metrics::record_dropped_trigger(JobKind::ResourceProcessing);
            return Ok(None);
        };

        let job = Job::new(
            resource_id.clone(),
            JobKind::ResourceProcessing,
            serde_json::Value::Null,
        );
        self.ctx.store.insert_job(&job).await?;
        let job_id = job.id.clone();

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let _claim = claim;
            let job_id = job.id.clone();
            if let Err(e) = run_resource_job(&ctx, job).await {
                error!(job_id = %job_id, "Failed to record processing outcome: {}", e);
            }
        });

        Ok(Some(job_id))
    }

    /// Debounced regeneration of a range's clip. Returns the pending job id.
    pub async fn schedule_range_export(&self, range_id: &RangeId) -> WorkerResult<JobId> {
        self.ensure_accepting()?;
        let range = self.require_range(range_id).await?;
        self.scheduler.schedule(&range).await
    }

    /// Apply an edit to a range and schedule its regeneration.
    pub async fn edit_range(&self, range_id: &RangeId, edit: RangeEdit) -> WorkerResult<JobId> {
        self.ensure_accepting()?;
        let mut range = self.require_range(range_id).await?;

        if let Some(start) = edit.start {
            range.start = start;
        }
        if let Some(end) = edit.end {
            range.end = end;
        }
        if let Some(label) = edit.label {
            range.label = label;
        }
        if !range.start.is_finite() || !range.end.is_finite() || range.start < 0.0 {
            return Err(WorkerError::validation("range offsets must be finite and non-negative"));
        }
        if range.end <= range.start {
            return Err(WorkerError::validation(format!(
                "range end {:.3}s must be after start {:.3}s",
                range.end, range.start
            )));
        }

        range.updated_at = Utc::now();
        self.ctx.store.upsert_range(&range).await?;
        self.scheduler.schedule(&range).await
    }

    /// Delete a range, cancelling its pending export and removing its clip.
    pub async fn delete_range(&self, range_id: &RangeId) -> WorkerResult<()> {
        self.scheduler.delete_range(range_id).await
    }

    /// Build an export package.
    ///
    /// Returns `None` if an export of this resource is already in flight.
    pub async fn start_export_package(
        &self,
        resource_id: &ResourceId,
        options: ExportOptions,
    ) -> WorkerResult<Option<JobId>> {
        self.ensure_accepting()?;
        self.require_resource(resource_id).await?;

        let Some(claim) = self.export_claims.try_claim(resource_id) else {
            info!(resource_id = %resource_id, "Export already in flight, trigger dropped");
            metrics::record_dropped_trigger(JobKind::ExportPackage);
            return Ok(None);
        };

        let job = Job::new(
            resource_id.clone(),
            JobKind::ExportPackage,
            serde_json::to_value(&options)?,
        );
        self.ctx.store.insert_job(&job).await?;
        let job_id = job.id.clone();

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let _claim = claim;
            let job_id = job.id.clone();
            if let Err(e) = run_export_job(&ctx, job, options).await {
                error!(job_id = %job_id, "Failed to record export outcome: {}", e);
            }
        });

        Ok(Some(job_id))
    }

    pub async fn job_status(&self, job_id: &JobId) -> WorkerResult<Option<Job>> {
        Ok(self.ctx.store.get_job(job_id).await?)
    }

    pub async fn resource_status(&self, resource_id: &ResourceId) -> WorkerResult<Option<Resource>> {
        Ok(self.ctx.store.get_resource(resource_id).await?)
    }

    pub async fn status_summary(&self) -> WorkerResult<StatusSummary> {
        status_summary(self.ctx.store.as_ref()).await
    }

    /// Whether the range's clip reflects its latest edit.
    pub async fn range_clip_is_current(&self, range_id: &RangeId) -> WorkerResult<bool> {
        let range = self.require_range(range_id).await?;
        let jobs = self
            .ctx
            .store
            .list_jobs(
                &clipdeck_store::JobFilter::all()
                    .kind(JobKind::RangeExport)
                    .range(range.id.clone()),
            )
            .await?;
        Ok(range.clip_is_current(&jobs))
    }

    pub fn is_processing(&self, resource_id: &ResourceId) -> bool {
        self.processing_claims.is_claimed(resource_id)
    }

    pub fn is_exporting(&self, resource_id: &ResourceId) -> bool {
        self.export_claims.is_claimed(resource_id)
    }

    /// Stop accepting work, abort pending timers and terminate children.
    ///
    /// Jobs still processing when the process exits are repaired by the next
    /// startup's recovery sweep.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.scheduler.shutdown().await;

        if let Some(registry) = &self.registry {
            if !registry.is_empty() {
                warn!("Terminating {} running processes", registry.len());
            }
            registry.terminate_all(self.ctx.config.kill_grace).await;
        }
        info!("Pipeline service stopped");
    }
}
