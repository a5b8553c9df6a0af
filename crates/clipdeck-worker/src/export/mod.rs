//! Export package builder.
//!
//! Produces one `.tar.gz` per resource, replaced by each new export, containing:
//! - `clips/`: one trimmed clip per range at the requested quality
//! - `thumbnails/`: one still per range
//! - `control/`: hotkey playback page and script
//! - `automation/`: OBS provisioning script and config
//! - `metadata/` and `README.txt`
//!
//! Everything is staged under the temp dir in the final layout and archived
//! in one pass. The staging dir is removed whether or not the build succeeds.

pub mod archive;
pub mod automation;
pub mod control_surface;
pub mod hotkeys;
pub mod metadata;
pub mod naming;

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn, Instrument};

use clipdeck_media::thumbnail::thumbnail_timestamp;
use clipdeck_media::{clip::trim_reencode, generate_thumbnail, trim_range};
use clipdeck_models::{
    EncodingConfig, ExportOptions, Job, JobStatus, QualityTier, RangeId, Resource,
};
use clipdeck_store::JobPatch;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{ProgressBand, ProgressReporter};

pub use hotkeys::{assign_hotkey, Hotkey};

pub const CLIPS_DIR: &str = "clips";
pub const THUMBNAILS_DIR: &str = "thumbnails";
pub const CONTROL_DIR: &str = "control";
pub const AUTOMATION_DIR: &str = "automation";
pub const METADATA_DIR: &str = "metadata";

/// Overall percentage bands per step.
pub mod bands {
    pub const STRUCTURE: (u8, u8) = (0, 5);
    pub const CLIPS: (u8, u8) = (5, 55);
    pub const THUMBNAILS: (u8, u8) = (55, 70);
    pub const HOTKEYS: (u8, u8) = (70, 72);
    pub const WEB: (u8, u8) = (72, 80);
    pub const AUTOMATION: (u8, u8) = (80, 85);
    pub const METADATA: (u8, u8) = (85, 90);
    pub const ARCHIVE: (u8, u8) = (90, 100);
}

/// One range as it appears in the package.
#[derive(Debug, Clone, Serialize)]
pub struct ClipEntry {
    /// 0-based position in export order
    pub index: usize,
    pub range_id: RangeId,
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub stem: String,
    /// Relative to the package root
    pub clip_file: String,
    /// Relative to the package root
    pub thumbnail_file: String,
    pub hotkey: Hotkey,
}

/// Where a finished package ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportArtifact {
    pub archive_path: PathBuf,
    pub clip_count: usize,
    pub size_bytes: u64,
}

fn band(progress: &ProgressReporter, (start, end): (u8, u8)) -> ProgressBand {
    progress.band(start, end)
}

/// Build a package for the job's resource and record the outcome.
pub async fn run_export_job(
    ctx: &PipelineContext,
    job: Job,
    options: ExportOptions,
) -> WorkerResult<JobStatus> {
    let logger = JobLogger::new(&job);
    let span = logger.create_span();

    async move {
        let started = Instant::now();
        ctx.store.update_job(&job.id, JobPatch::processing()).await?;
        logger.log_start(&format!(
            "building export package at {} quality",
            options.quality
        ));

        let staging_root = ctx.config.temp_dir.join(format!("export-{}", job.id));
        let result = build_package(ctx, &job, &options, &staging_root, &logger).await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging_root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staging dir {}: {}", staging_root.display(), e);
            }
        }

        let (patch, status) = match result {
            Ok(artifact) => {
                logger.log_completion(&format!(
                    "{} clips archived to {} ({} bytes)",
                    artifact.clip_count,
                    artifact.archive_path.display(),
                    artifact.size_bytes
                ));
                metrics::record_stage_duration("export", started.elapsed().as_secs_f64());
                let mut payload = job.payload.clone();
                if !payload.is_object() {
                    payload = serde_json::to_value(&options)?;
                }
                if let Some(map) = payload.as_object_mut() {
                    map.insert("artifact".to_string(), serde_json::to_value(&artifact)?);
                }
                (JobPatch::completed().payload(payload), JobStatus::Completed)
            }
            Err(e) => {
                let text = e.error_text();
                logger.log_error(&text);
                (JobPatch::failed(text), JobStatus::Failed)
            }
        };

        ctx.store.update_job(&job.id, patch).await?;
        metrics::record_job(job.kind, status);
        Ok(status)
    }
    .instrument(span)
    .await
}

async fn build_package(
    ctx: &PipelineContext,
    job: &Job,
    options: &ExportOptions,
    staging_root: &Path,
    logger: &JobLogger,
) -> WorkerResult<ExportArtifact> {
    let progress = ProgressReporter::new(ctx.store.clone(), job.id.clone());

    // Structure
    let resource = ctx
        .store
        .get_resource(&job.resource_id)
        .await?
        .ok_or_else(|| WorkerError::not_found(format!("resource {}", job.resource_id)))?;
    let canonical = resource
        .canonical_path
        .clone()
        .filter(|p| p.is_file())
        .ok_or_else(|| {
            WorkerError::validation(format!(
                "resource {} has no canonical file; process it before exporting",
                resource.id
            ))
        })?;
    let ranges = ctx.store.list_ranges(&resource.id).await?;
    if ranges.is_empty() {
        return Err(WorkerError::validation(format!(
            "resource {} has no ranges to export",
            resource.id
        )));
    }

    let package_name = naming::package_name(&resource);
    let package_dir = staging_root.join(&package_name);
    for dir in [
        CLIPS_DIR,
        THUMBNAILS_DIR,
        CONTROL_DIR,
        AUTOMATION_DIR,
        METADATA_DIR,
    ] {
        tokio::fs::create_dir_all(package_dir.join(dir)).await?;
    }

    let entries = plan_entries(&resource, &ranges, options);
    band(&progress, bands::STRUCTURE).complete().await?;
    logger.log_stage("structure", &format!("Staging {} clips", entries.len()));

    // Clips
    let clips = band(&progress, bands::CLIPS);
    write_clips(ctx, &resource, &canonical, &package_dir, &entries, options.quality, &clips)
        .await?;
    clips.complete().await?;

    // Thumbnails
    let thumbnails = band(&progress, bands::THUMBNAILS);
    for (i, entry) in entries.iter().enumerate() {
        generate_thumbnail(
            ctx.executor.as_ref(),
            &ctx.tools,
            &canonical,
            package_dir.join(&entry.thumbnail_file),
            thumbnail_timestamp(entry.start, entry.end),
            &ctx.config.thumbnail_exec(),
        )
        .await?;
        thumbnails
            .set_fraction((i + 1) as f64 / entries.len() as f64)
            .await?;
    }
    thumbnails.complete().await?;

    // Hotkeys
    metadata::write_hotkeys(&package_dir, &entries).await?;
    band(&progress, bands::HOTKEYS).complete().await?;

    // Web interface
    let title = if resource.title.is_empty() {
        resource.name.as_str()
    } else {
        resource.title.as_str()
    };
    control_surface::write_control_surface(&package_dir, title, &entries).await?;
    band(&progress, bands::WEB).complete().await?;

    // Automation config
    automation::write_automation(&package_dir, &package_name, &entries).await?;
    band(&progress, bands::AUTOMATION).complete().await?;

    // Metadata
    metadata::write_metadata(&package_dir, &resource, options, &entries).await?;
    band(&progress, bands::METADATA).complete().await?;

    // Archive
    logger.log_stage("archive", "Compressing package");
    let archive_band = band(&progress, bands::ARCHIVE);
    let layout = ctx.layout(&resource.id);
    let archive_path = layout.archive_path(&package_name);
    let size_bytes = {
        let _ticker = archive_band.ticker(ctx.config.progress_tick);
        archive::write_archive(staging_root, &package_name, &archive_path).await?
    };
    archive::prune_archives(&layout.exports_dir(), &archive_path).await?;
    archive_band.complete().await?;

    info!(
        resource_id = %resource.id,
        "Export package written to {}",
        archive_path.display()
    );
    Ok(ExportArtifact {
        archive_path,
        clip_count: entries.len(),
        size_bytes,
    })
}

/// Order, names and hotkeys of every clip in the package.
pub fn plan_entries(
    resource: &Resource,
    ranges: &[clipdeck_models::Range],
    options: &ExportOptions,
) -> Vec<ClipEntry> {
    let mut ranges: Vec<_> = ranges.iter().collect();
    ranges.sort_by_key(|r| r.order_index);

    ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| {
            let stem = naming::clip_file_stem(index, resource, range, options.naming);
            let end = match resource.duration_secs {
                Some(duration) => range.end.min(duration),
                None => range.end,
            };
            ClipEntry {
                index,
                range_id: range.id.clone(),
                label: range.label.clone(),
                start: range.start,
                end,
                clip_file: format!("{}/{}.mp4", CLIPS_DIR, stem),
                thumbnail_file: format!("{}/{}.jpg", THUMBNAILS_DIR, stem),
                hotkey: assign_hotkey(index),
                stem,
            }
        })
        .collect()
}

async fn write_clips(
    ctx: &PipelineContext,
    resource: &Resource,
    canonical: &Path,
    package_dir: &Path,
    entries: &[ClipEntry],
    quality: QualityTier,
    band: &ProgressBand,
) -> WorkerResult<()> {
    let encoding = EncodingConfig::for_quality(quality);
    let trim_options = ctx.config.trim_options();

    for (i, entry) in entries.iter().enumerate() {
        let output = package_dir.join(&entry.clip_file);
        if quality == QualityTier::Source {
            trim_range(
                ctx.executor.as_ref(),
                &ctx.tools,
                canonical,
                &output,
                entry.start,
                entry.end,
                &encoding,
                &trim_options,
            )
            .await?;
        } else {
            trim_reencode(
                ctx.executor.as_ref(),
                &ctx.tools,
                canonical,
                &output,
                entry.start,
                entry.end,
                &encoding,
                &trim_options.reencode,
            )
            .await?;
        }
        band.set_fraction((i + 1) as f64 / entries.len() as f64)
            .await?;
    }

    info!(
        resource_id = %resource.id,
        quality = %quality,
        "Exported {} clips",
        entries.len()
    );
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_entries(count: usize) -> Vec<ClipEntry> {
    (0..count)
        .map(|index| {
            let stem = format!("{:03}_clip", index + 1);
            ClipEntry {
                index,
                range_id: RangeId::from(format!("range-{index}")),
                label: format!("Clip {}", index + 1),
                start: index as f64,
                end: index as f64 + 2.0,
                clip_file: format!("{}/{}.mp4", CLIPS_DIR, stem),
                thumbnail_file: format!("{}/{}.jpg", THUMBNAILS_DIR, stem),
                hotkey: assign_hotkey(index),
                stem,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipdeck_models::{NamingConvention, Range, SourceLocator};

    #[test]
    fn test_plan_entries_orders_and_names() {
        let mut resource = Resource::new(
            "ws",
            "Show",
            SourceLocator::LocalFile {
                path: "/tmp/in.mp4".into(),
            },
        );
        resource.duration_secs = Some(30.0);
        let ranges = vec![
            Range::new(resource.id.clone(), 10.0, 40.0, "second").with_order_index(1),
            Range::new(resource.id.clone(), 0.0, 5.0, "first").with_order_index(0),
        ];
        let options = ExportOptions {
            naming: NamingConvention::LabelOnly,
            ..ExportOptions::default()
        };

        let entries = plan_entries(&resource, &ranges, &options);
        assert_eq!(entries[0].clip_file, "clips/001_first.mp4");
        assert_eq!(entries[1].thumbnail_file, "thumbnails/002_second.jpg");
        assert_eq!(entries[1].end, 30.0);
        assert_eq!(entries[1].hotkey.combo(), "F2");
    }
}
