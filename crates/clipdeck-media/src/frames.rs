//! Preview frame sampling.
//!
//! Sampling points are anchored at shot boundaries and filled at a regular
//! interval in between, so long shots still get coverage. Extraction runs in
//! batches: each FFmpeg invocation carries one `select` expression listing its
//! timestamps, and a single argument must stay under the kernel's per-argument
//! length limit.
//!
//! Each point must select a distinct frame, so points are kept at least one
//! frame interval apart. Frame `i` on disk then belongs to point `i`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, MediaTools};
use crate::error::{MediaError, MediaResult};
use crate::executor::{CommandExecutor, ExecOptions};

/// Maximum timestamps per FFmpeg invocation.
pub const DEFAULT_BATCH_CEILING: usize = 1000;

/// Sidecar file written next to the extracted frames.
pub const SIDECAR_FILE: &str = "frames.json";

/// Points closer than this collapse into one.
const MIN_POINT_SPACING: f64 = 0.05;

/// Slack for the millisecond rounding in `select` expressions.
const SELECT_ROUNDING_SLACK: f64 = 0.001;

/// Frame sampling settings.
#[derive(Debug, Clone)]
pub struct FrameSamplingConfig {
    /// Fill interval between anchors, in seconds
    pub interval_secs: f64,
    /// Maximum timestamps per invocation
    pub batch_ceiling: usize,
    /// Output frame width in pixels
    pub width: u32,
    /// Frame rate of the input, when known
    pub frame_rate: Option<f64>,
}

impl FrameSamplingConfig {
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    /// Smallest gap between two points that still selects two frames.
    pub fn min_spacing(&self) -> f64 {
        match self.frame_rate {
            Some(fps) if fps.is_finite() && fps > 0.0 => {
                (1.0 / fps + SELECT_ROUNDING_SLACK).max(MIN_POINT_SPACING)
            }
            _ => MIN_POINT_SPACING,
        }
    }
}

impl Default for FrameSamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            batch_ceiling: DEFAULT_BATCH_CEILING,
            width: clipdeck_models::encoding::PREVIEW_FRAME_WIDTH,
            frame_rate: None,
        }
    }
}

/// One extraction invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBatch {
    /// Index of the first frame this batch writes
    pub offset: usize,
    pub points: Vec<f64>,
}

/// Metadata persisted as `frames.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameSidecar {
    pub interval_secs: f64,
    pub shot_boundaries: Vec<f64>,
    pub points: Vec<f64>,
    pub files: Vec<String>,
}

/// Compute sampling timestamps for a file of `duration` seconds.
///
/// Points closer than `min_spacing` to their predecessor are dropped.
pub fn plan_sampling_points(
    duration: f64,
    boundaries: &[f64],
    interval_secs: f64,
    min_spacing: f64,
) -> Vec<f64> {
    if duration <= 0.0 {
        return Vec::new();
    }

    let mut anchors: Vec<f64> = std::iter::once(0.0)
        .chain(
            boundaries
                .iter()
                .copied()
                .filter(|t| t.is_finite() && *t > 0.0 && *t < duration),
        )
        .collect();
    anchors.sort_by(f64::total_cmp);

    let min_spacing = min_spacing.max(MIN_POINT_SPACING);
    let interval = if interval_secs > 0.0 {
        interval_secs.max(min_spacing)
    } else {
        duration
    };

    let mut points = Vec::new();
    for (i, &anchor) in anchors.iter().enumerate() {
        let next = anchors.get(i + 1).copied().unwrap_or(duration);
        let mut t = anchor;
        loop {
            points.push(t);
            t += interval;
            if t >= next - min_spacing {
                break;
            }
        }
    }

    dedup_points(points, min_spacing)
}

fn dedup_points(mut points: Vec<f64>, min_spacing: f64) -> Vec<f64> {
    points.sort_by(f64::total_cmp);
    let mut out: Vec<f64> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().map_or(true, |last| p - last >= min_spacing) {
            out.push(p);
        }
    }
    out
}

/// Split points into batches of at most `ceiling` timestamps.
pub fn batch_points(points: &[f64], ceiling: usize) -> Vec<FrameBatch> {
    let ceiling = ceiling.max(1);
    points
        .chunks(ceiling)
        .enumerate()
        .map(|(i, chunk)| FrameBatch {
            offset: i * ceiling,
            points: chunk.to_vec(),
        })
        .collect()
}

/// `select` expression picking the first frame at or after each timestamp.
pub fn batch_select_expr(points: &[f64]) -> String {
    points
        .iter()
        .map(|&t| {
            if t <= 0.0 {
                "eq(n,0)".to_string()
            } else {
                format!("lt(prev_pts*TB,{t:.3})*gte(pts*TB,{t:.3})")
            }
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Build the command for one batch.
pub fn batch_command(
    input: &Path,
    frames_dir: &Path,
    batch: &FrameBatch,
    width: u32,
) -> FfmpegCommand {
    FfmpegCommand::new(input, frames_dir.join("frame_%06d.jpg"))
        .video_filter(format!(
            "select='{}',scale={}:-2",
            batch_select_expr(&batch.points),
            width
        ))
        .no_audio()
        .output_args(["-fps_mode", "vfr", "-q:v", "4"])
        .output_args(["-start_number".to_string(), batch.offset.to_string()])
}

/// Extract preview frames and write the sidecar.
///
/// `on_batch(done, total)` is called after each batch completes.
#[allow(clippy::too_many_arguments)]
pub async fn extract_frames(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    input: impl AsRef<Path>,
    frames_dir: impl AsRef<Path>,
    duration: f64,
    shot_boundaries: &[f64],
    config: &FrameSamplingConfig,
    options: &ExecOptions,
    on_batch: &mut (dyn FnMut(usize, usize) + Send),
) -> MediaResult<FrameSidecar> {
    let input = input.as_ref();
    let frames_dir = frames_dir.as_ref();

    if duration <= 0.0 {
        return Err(MediaError::InvalidRange(format!(
            "cannot sample frames from zero-length input {}",
            input.display()
        )));
    }

    tokio::fs::create_dir_all(frames_dir).await?;

    let points = plan_sampling_points(
        duration,
        shot_boundaries,
        config.interval_secs,
        config.min_spacing(),
    );
    let batches = batch_points(&points, config.batch_ceiling);
    let total = batches.len();

    info!(
        "Sampling {} frames in {} batches from {}",
        points.len(),
        total,
        input.display()
    );

    for (i, batch) in batches.iter().enumerate() {
        debug!(
            "Frame batch {}/{}: {} points from offset {}",
            i + 1,
            total,
            batch.points.len(),
            batch.offset
        );
        batch_command(input, frames_dir, batch, config.width)
            .run(executor, tools, options)
            .await?;
        on_batch(i + 1, total);
    }

    let files = list_frame_files(frames_dir).await?;
    if files.len() != points.len() {
        warn!(
            "Expected {} frames in {}, found {}",
            points.len(),
            frames_dir.display(),
            files.len()
        );
    }

    let sidecar = FrameSidecar {
        interval_secs: config.interval_secs,
        shot_boundaries: shot_boundaries.to_vec(),
        points,
        files,
    };

    let json = serde_json::to_vec_pretty(&sidecar)?;
    tokio::fs::write(frames_dir.join(SIDECAR_FILE), json).await?;

    Ok(sidecar)
}

async fn list_frame_files(dir: &Path) -> MediaResult<Vec<String>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("frame_") && name.ends_with(".jpg") {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// Path of frame `index` inside `frames_dir`.
pub fn frame_path(frames_dir: &Path, index: usize) -> PathBuf {
    frames_dir.join(format!("frame_{index:06}.jpg"))
}
