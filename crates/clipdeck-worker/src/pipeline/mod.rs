//! Resource processing orchestration.
//!
//! Runs the ordered stage sequence for one resource job: acquire the source,
//! transcode the canonical file, detect shots, sample preview frames and cut
//! one clip per range. Any stage error fails the job; artifacts of earlier
//! stages are left in place.

pub mod stages;

use std::time::Instant;

use tracing::{warn, Instrument};

use clipdeck_models::{Job, JobStatus};
use clipdeck_store::{JobPatch, ResourcePatch};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressReporter;

/// Overall percentage bands per stage.
pub mod bands {
    pub const ACQUIRE: (u8, u8) = (0, 10);
    pub const TRANSCODE: (u8, u8) = (10, 70);
    pub const SHOTS: (u8, u8) = (70, 80);
    pub const FRAMES: (u8, u8) = (80, 90);
    pub const CLIPS: (u8, u8) = (90, 100);
}

/// Run a resource processing job to a terminal state.
///
/// Stage failures are recorded on the job and the resource; only store
/// failures while recording the outcome are returned.
pub async fn run_resource_job(ctx: &PipelineContext, job: Job) -> WorkerResult<JobStatus> {
    let logger = JobLogger::new(&job);
    let span = logger.create_span();

    async move {
        let started = Instant::now();
        logger.log_start("processing resource");

        ctx.store.update_job(&job.id, JobPatch::processing()).await?;
        ctx.store
            .update_resource(
                &job.resource_id,
                ResourcePatch::new().status(JobStatus::Processing).progress(0),
            )
            .await?;

        match process_resource(ctx, &job, &logger).await {
            Ok(()) => {
                ctx.store.update_job(&job.id, JobPatch::completed()).await?;
                ctx.store
                    .update_resource(
                        &job.resource_id,
                        ResourcePatch::new().status(JobStatus::Completed).progress(100),
                    )
                    .await?;
                metrics::record_job(job.kind, JobStatus::Completed);
                metrics::record_stage_duration("total", started.elapsed().as_secs_f64());
                logger.log_completion(&format!(
                    "resource processed in {:.1}s",
                    started.elapsed().as_secs_f64()
                ));
                Ok(JobStatus::Completed)
            }
            Err(e) => {
                let text = e.error_text();
                logger.log_error(&text);
                record_failure(ctx, &job, &text).await?;
                metrics::record_job(job.kind, JobStatus::Failed);
                Ok(JobStatus::Failed)
            }
        }
    }
    .instrument(span)
    .await
}

async fn record_failure(ctx: &PipelineContext, job: &Job, text: &str) -> WorkerResult<()> {
    match ctx.store.update_job(&job.id, JobPatch::failed(text)).await {
        Ok(_) => {}
        Err(e) if e.is_terminal_job() => {
            warn!(job_id = %job.id, "Job already finalized, not marking failed");
        }
        Err(e) => return Err(e.into()),
    }
    ctx.store
        .update_resource(
            &job.resource_id,
            ResourcePatch::new().status(JobStatus::Failed),
        )
        .await?;
    Ok(())
}

async fn process_resource(
    ctx: &PipelineContext,
    job: &Job,
    logger: &JobLogger,
) -> WorkerResult<()> {
    let resource = ctx
        .store
        .get_resource(&job.resource_id)
        .await?
        .ok_or_else(|| WorkerError::not_found(format!("resource {}", job.resource_id)))?;

    let layout = ctx.layout(&resource.id);
    layout.ensure_dirs().await?;

    let progress =
        ProgressReporter::with_resource(ctx.store.clone(), job.id.clone(), resource.id.clone());

    // Step 1: acquire
    let stage = Instant::now();
    logger.log_stage("acquire", "Acquiring source media");
    let band = progress.band(bands::ACQUIRE.0, bands::ACQUIRE.1);
    let acquired = stages::acquire(ctx, job, &resource, &band).await?;
    metrics::record_stage_duration("acquire", stage.elapsed().as_secs_f64());

    // Step 2: canonical transcode
    let stage = Instant::now();
    logger.log_stage("transcode", "Transcoding canonical file");
    let band = progress.band(bands::TRANSCODE.0, bands::TRANSCODE.1);
    let info = stages::transcode(ctx, job, &resource, &acquired, &layout, &band).await?;
    metrics::record_stage_duration("transcode", stage.elapsed().as_secs_f64());

    // Step 3: shot detection
    let stage = Instant::now();
    logger.log_stage("shots", "Detecting shot boundaries");
    let band = progress.band(bands::SHOTS.0, bands::SHOTS.1);
    let boundaries = stages::detect_shots(ctx, &resource.id, &layout, &band).await?;
    metrics::record_stage_duration("shots", stage.elapsed().as_secs_f64());

    // Step 4: preview frames
    let stage = Instant::now();
    logger.log_stage("frames", "Sampling preview frames");
    let band = progress.band(bands::FRAMES.0, bands::FRAMES.1);
    stages::sample_frames(ctx, &layout, &info, &boundaries, &band).await?;
    metrics::record_stage_duration("frames", stage.elapsed().as_secs_f64());

    // Step 5: per-range clips
    let stage = Instant::now();
    logger.log_stage("clips", "Generating range clips");
    let band = progress.band(bands::CLIPS.0, bands::CLIPS.1);
    let clips = stages::generate_clips(ctx, &resource.id, &layout, info.duration, &band).await?;
    metrics::record_stage_duration("clips", stage.elapsed().as_secs_f64());

    logger.log_stage("clips", &format!("Generated {} clips", clips));
    Ok(())
}
