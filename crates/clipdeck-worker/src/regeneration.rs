//! Debounced per-range clip regeneration.
//!
//! Every edit persists a pending `range_export` job right away and cancels
//! whatever export was still pending or running for that range. A timer per
//! range restarts on each edit; only the job of the last edit runs once the
//! range has been quiet for the debounce window. A superseded export that is
//! already running is left to finish; its late result cannot flip the
//! cancelled job because the store refuses updates to terminal jobs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use clipdeck_media::{remove_file_if_exists, trim_range};
use clipdeck_models::{EncodingConfig, Job, JobId, JobKind, JobStatus, Range, RangeId, ResourceId};
use clipdeck_store::{JobFilter, JobPatch};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressReporter;

pub const SUPERSEDED_MESSAGE: &str = "superseded by newer edit";
pub const DELETED_MESSAGE: &str = "range deleted";
pub const SHUTDOWN_MESSAGE: &str = "cancelled by shutdown";

type TimerKey = (ResourceId, RangeId);

struct PendingRegeneration {
    job_id: JobId,
    handle: JoinHandle<()>,
}

/// Owns the debounce timers of every range.
#[derive(Clone)]
pub struct RegenerationScheduler {
    ctx: PipelineContext,
    timers: Arc<Mutex<HashMap<TimerKey, PendingRegeneration>>>,
}

impl RegenerationScheduler {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule a regeneration of `range`'s clip. Returns the new job's id.
    pub async fn schedule(&self, range: &Range) -> WorkerResult<JobId> {
        let key = (range.resource_id.clone(), range.id.clone());

        // Held across the whole operation so concurrent edits of one range
        // cannot interleave cancel and insert.
        let mut timers = self.timers.lock().await;

        let superseded = cancel_range_jobs(&self.ctx, range, SUPERSEDED_MESSAGE).await?;
        if let Some(previous) = timers.remove(&key) {
            previous.handle.abort();
        }

        let job = Job::new_range_export(range.resource_id.clone(), &range.id);
        self.ctx.store.insert_job(&job).await?;
        let job_id = job.id.clone();

        debug!(
            range_id = %range.id,
            job_id = %job_id,
            superseded = superseded,
            "Range export scheduled"
        );

        let ctx = self.ctx.clone();
        let table = Arc::clone(&self.timers);
        let timer_key = key.clone();
        let debounce = self.ctx.config.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            {
                let mut timers = table.lock().await;
                match timers.get(&timer_key) {
                    Some(entry) if entry.job_id == job.id => {
                        timers.remove(&timer_key);
                    }
                    _ => return,
                }
            }

            if let Err(e) = run_range_export(&ctx, job).await {
                warn!("Range export could not record its outcome: {}", e);
            }
        });

        timers.insert(
            key,
            PendingRegeneration {
                job_id: job_id.clone(),
                handle,
            },
        );
        Ok(job_id)
    }

    /// Drop the range, its pending work and its clip.
    pub async fn delete_range(&self, range_id: &RangeId) -> WorkerResult<()> {
        let range = self
            .ctx
            .store
            .get_range(range_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("range {}", range_id)))?;
        let key = (range.resource_id.clone(), range.id.clone());

        let mut timers = self.timers.lock().await;
        if let Some(pending) = timers.remove(&key) {
            pending.handle.abort();
        }
        cancel_range_jobs(&self.ctx, &range, DELETED_MESSAGE).await?;
        self.ctx.store.delete_range(range_id).await?;
        drop(timers);

        let clip = range
            .clip_path
            .clone()
            .unwrap_or_else(|| self.ctx.layout(&range.resource_id).clip_path(&range.id));
        match remove_file_if_exists(&clip).await {
            Ok(true) => info!(range_id = %range_id, "Removed clip {}", clip.display()),
            Ok(false) => {}
            Err(e) => warn!(range_id = %range_id, "Failed to remove clip {}: {}", clip.display(), e),
        }
        Ok(())
    }

    /// Number of ranges waiting out their debounce window.
    pub async fn pending(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Abort every pending timer and cancel the jobs they would have run.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, pending) in timers.drain() {
            pending.handle.abort();
            match self
                .ctx
                .store
                .update_job(&pending.job_id, JobPatch::cancelled(SHUTDOWN_MESSAGE))
                .await
            {
                Ok(_) => metrics::record_job(JobKind::RangeExport, JobStatus::Cancelled),
                Err(e) if e.is_terminal_job() => {}
                Err(e) => warn!(job_id = %pending.job_id, "Failed to cancel pending export: {}", e),
            }
        }
    }
}

async fn cancel_range_jobs(
    ctx: &PipelineContext,
    range: &Range,
    reason: &str,
) -> WorkerResult<usize> {
    let filter = JobFilter::all()
        .kind(JobKind::RangeExport)
        .resource(range.resource_id.clone())
        .range(range.id.clone());
    let cancelled = ctx
        .store
        .update_jobs(&filter, JobPatch::cancelled(reason))
        .await?;
    for job in &cancelled {
        debug!(job_id = %job.id, range_id = %range.id, "Cancelled range export: {}", reason);
        metrics::record_job(JobKind::RangeExport, JobStatus::Cancelled);
    }
    Ok(cancelled.len())
}

/// Re-derive one range's clip from the canonical file.
pub async fn run_range_export(ctx: &PipelineContext, job: Job) -> WorkerResult<JobStatus> {
    let logger = JobLogger::new(&job);
    let span = logger.create_span();

    async move {
        match ctx.store.update_job(&job.id, JobPatch::processing()).await {
            Ok(_) => {}
            Err(e) if e.is_terminal_job() => {
                logger.log_stage("claim", "Export superseded before it started");
                return Ok(JobStatus::Cancelled);
            }
            Err(e) => return Err(e.into()),
        }
        logger.log_start("regenerating range clip");

        let progress = ProgressReporter::new(ctx.store.clone(), job.id.clone());
        let result = export_range(ctx, &job, &progress).await;

        let (patch, status) = match &result {
            Ok(()) => (JobPatch::completed(), JobStatus::Completed),
            Err(e) if e.is_superseded() => {
                logger.log_stage("export", "Export superseded while running");
                return Ok(JobStatus::Cancelled);
            }
            Err(e) => {
                let text = e.error_text();
                logger.log_error(&text);
                (JobPatch::failed(text), JobStatus::Failed)
            }
        };

        match ctx.store.update_job(&job.id, patch).await {
            Ok(_) => {
                metrics::record_job(JobKind::RangeExport, status);
                if status == JobStatus::Completed {
                    logger.log_completion("range clip regenerated");
                }
                Ok(status)
            }
            Err(e) if e.is_terminal_job() => {
                logger.log_warning("Export finished after being superseded; result discarded");
                Ok(JobStatus::Cancelled)
            }
            Err(e) => Err(e.into()),
        }
    }
    .instrument(span)
    .await
}

async fn export_range(
    ctx: &PipelineContext,
    job: &Job,
    progress: &ProgressReporter,
) -> WorkerResult<()> {
    let range_id = job
        .range_id()
        .ok_or_else(|| WorkerError::validation("range export job without range_id"))?;

    // Read at fire time so the latest edit wins.
    let range = ctx
        .store
        .get_range(&range_id)
        .await?
        .ok_or_else(|| WorkerError::not_found(format!("range {}", range_id)))?;
    let resource = ctx
        .store
        .get_resource(&range.resource_id)
        .await?
        .ok_or_else(|| WorkerError::not_found(format!("resource {}", range.resource_id)))?;
    let canonical = resource
        .canonical_path
        .clone()
        .filter(|p| p.is_file())
        .ok_or_else(|| {
            WorkerError::validation(format!(
                "resource {} has no canonical file yet",
                resource.id
            ))
        })?;

    progress.set(10).await?;

    let end = match resource.duration_secs {
        Some(duration) => range.end.min(duration),
        None => range.end,
    };
    let output = ctx.layout(&resource.id).clip_path(&range.id);

    let outcome = trim_range(
        ctx.executor.as_ref(),
        &ctx.tools,
        &canonical,
        &output,
        range.start,
        end,
        &EncodingConfig::canonical(),
        &ctx.config.trim_options(),
    )
    .await?;

    ctx.store
        .set_range_clip_path(&range.id, Some(outcome.output))
        .await?;
    info!(
        range_id = %range.id,
        mode = outcome.mode.as_str(),
        "Range clip written"
    );
    progress.set(90).await?;
    Ok(())
}
