//! Individual processing stages.

use std::path::Path;

use tracing::{info, warn};

use clipdeck_media::{
    detect_shots as run_shot_detection, extract_frames, probe_video, remove_file_if_exists,
    transcode_canonical, trim_range, VideoInfo,
};
use clipdeck_models::{
    DetectionMethod, EncodingConfig, Job, Resource, ResourceId, ShotBoundary,
};
use clipdeck_source::{acquire as acquire_source, AcquiredMedia};
use clipdeck_store::ResourcePatch;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::layout::ResourceLayout;
use crate::progress::ProgressBand;

/// Media readable by the transcoder.
#[derive(Debug, Clone)]
pub struct AcquiredSource {
    pub media: AcquiredMedia,
    pub duration_secs: Option<f64>,
}

pub async fn acquire(
    ctx: &PipelineContext,
    job: &Job,
    resource: &Resource,
    band: &ProgressBand,
) -> WorkerResult<AcquiredSource> {
    band.enter().await?;
    let _ticker = band.ticker(ctx.config.progress_tick);

    let temp_dir = ctx.config.temp_dir.join(job.id.as_str());
    tokio::fs::create_dir_all(&temp_dir).await?;

    let (resolved, media) = acquire_source(ctx.source.as_ref(), resource, &temp_dir).await?;
    if !media.is_managed() {
        let _ = tokio::fs::remove_dir(&temp_dir).await;
    }

    let mut patch = ResourcePatch::new();
    if let Some(title) = resolved.title.as_ref().filter(|t| !t.is_empty()) {
        patch = patch.title(title.clone());
    }
    if let Some(duration) = resolved.duration_secs {
        patch = patch.duration(duration);
    }
    if patch != ResourcePatch::new() {
        ctx.store.update_resource(&resource.id, patch).await?;
    }

    info!(
        resource_id = %resource.id,
        managed = media.is_managed(),
        "Source media at {}",
        media.path().display()
    );

    band.complete().await?;
    Ok(AcquiredSource {
        media,
        duration_secs: resolved.duration_secs.or(resource.duration_secs),
    })
}

pub async fn transcode(
    ctx: &PipelineContext,
    job: &Job,
    resource: &Resource,
    source: &AcquiredSource,
    layout: &ResourceLayout,
    band: &ProgressBand,
) -> WorkerResult<VideoInfo> {
    band.enter().await?;
    let canonical = layout.canonical_path();

    {
        let _flusher = band.flusher(ctx.config.progress_tick);
        transcode_canonical(
            ctx.executor.as_ref(),
            &ctx.tools,
            source.media.path(),
            &canonical,
            source.duration_secs,
            &ctx.config.transcode_exec(),
            band.percent_callback(),
        )
        .await?;
    }

    if source.media.is_managed() {
        discard_download(source.media.path(), &ctx.config.temp_dir.join(job.id.as_str())).await;
    }

    let info = probe_video(
        ctx.executor.as_ref(),
        &ctx.tools,
        &canonical,
        &ctx.config.probe_exec(),
    )
    .await?;

    ctx.store
        .update_resource(
            &resource.id,
            ResourcePatch::new()
                .canonical_path(&canonical)
                .duration(info.duration),
        )
        .await?;

    band.complete().await?;
    Ok(info)
}

/// Only called for files fetched into managed temp storage.
async fn discard_download(path: &Path, job_temp_dir: &Path) {
    match remove_file_if_exists(path).await {
        Ok(_) => info!("Removed downloaded source {}", path.display()),
        Err(e) => warn!("Failed to remove downloaded source {}: {}", path.display(), e),
    }
    if let Err(e) = tokio::fs::remove_dir(job_temp_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove temp dir {}: {}", job_temp_dir.display(), e);
        }
    }
}

/// Returns boundary timestamps in ascending order.
pub async fn detect_shots(
    ctx: &PipelineContext,
    resource_id: &ResourceId,
    layout: &ResourceLayout,
    band: &ProgressBand,
) -> WorkerResult<Vec<f64>> {
    band.enter().await?;
    let _ticker = band.ticker(ctx.config.progress_tick);

    let cuts = run_shot_detection(
        ctx.executor.as_ref(),
        &ctx.tools,
        layout.canonical_path(),
        &ctx.config.scene_detect(),
        &ctx.config.analysis_exec(),
    )
    .await?;

    let boundaries: Vec<ShotBoundary> = cuts
        .iter()
        .map(|cut| ShotBoundary {
            resource_id: resource_id.clone(),
            timestamp: cut.timestamp,
            confidence: cut.score,
            method: DetectionMethod::SceneScore,
        })
        .collect();
    ctx.store
        .replace_shot_boundaries(resource_id, boundaries)
        .await?;

    band.complete().await?;
    Ok(cuts.into_iter().map(|cut| cut.timestamp).collect())
}

pub async fn sample_frames(
    ctx: &PipelineContext,
    layout: &ResourceLayout,
    info: &VideoInfo,
    boundaries: &[f64],
    band: &ProgressBand,
) -> WorkerResult<usize> {
    band.enter().await?;
    let _ticker = band.flusher(ctx.config.progress_tick);

    // Stale frames from an earlier run would end up in the sidecar.
    let frames_dir = layout.frames_dir();
    if let Err(e) = tokio::fs::remove_dir_all(&frames_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(e.into());
        }
    }

    let batch_band = band.clone();
    let mut on_batch = move |done: usize, total: usize| {
        batch_band.request_fraction(done as f64 / total.max(1) as f64);
    };

    let sidecar = extract_frames(
        ctx.executor.as_ref(),
        &ctx.tools,
        layout.canonical_path(),
        &frames_dir,
        info.duration,
        boundaries,
        &ctx.config.frame_sampling().with_frame_rate(info.fps),
        &ctx.config.frame_batch_exec(),
        &mut on_batch,
    )
    .await?;

    band.complete().await?;
    Ok(sidecar.points.len())
}

/// Cut one clip per range of the resource. Returns the number of clips.
pub async fn generate_clips(
    ctx: &PipelineContext,
    resource_id: &ResourceId,
    layout: &ResourceLayout,
    duration: f64,
    band: &ProgressBand,
) -> WorkerResult<usize> {
    band.enter().await?;

    let ranges = ctx.store.list_ranges(resource_id).await?;
    let total = ranges.len();
    let encoding = EncodingConfig::canonical();
    let trim_options = ctx.config.trim_options();

    for (i, range) in ranges.iter().enumerate() {
        if range.start >= duration {
            return Err(WorkerError::validation(format!(
                "range {} starts at {:.3}s, past the end of the {:.3}s video",
                range.id, range.start, duration
            )));
        }
        let end = range.end.min(duration);
        let output = layout.clip_path(&range.id);

        let outcome = trim_range(
            ctx.executor.as_ref(),
            &ctx.tools,
            layout.canonical_path(),
            &output,
            range.start,
            end,
            &encoding,
            &trim_options,
        )
        .await?;

        match ctx
            .store
            .set_range_clip_path(&range.id, Some(outcome.output.clone()))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                // Deleted while its clip was being cut.
                warn!(range_id = %range.id, "Range removed during clip generation, discarding clip");
                if let Err(e) = remove_file_if_exists(&outcome.output).await {
                    warn!(
                        range_id = %range.id,
                        "Failed to remove orphaned clip {}: {}",
                        outcome.output.display(),
                        e
                    );
                }
                band.set_fraction((i + 1) as f64 / total as f64).await?;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            range_id = %range.id,
            mode = outcome.mode.as_str(),
            "Clip {}/{} ready",
            i + 1,
            total
        );

        band.set_fraction((i + 1) as f64 / total as f64).await?;
    }

    band.complete().await?;
    Ok(total)
}
