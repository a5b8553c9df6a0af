//! Thumbnail generation.

use std::path::Path;

use clipdeck_models::encoding::THUMBNAIL_SCALE_WIDTH;

use crate::command::{FfmpegCommand, MediaTools};
use crate::error::MediaResult;
use crate::executor::{CommandExecutor, ExecOptions};

/// Timestamp to grab for a range: its midpoint, capped one second in.
pub fn thumbnail_timestamp(start: f64, end: f64) -> f64 {
    let span = (end - start).max(0.0);
    start + (span / 2.0).min(1.0)
}

pub fn thumbnail_command(video_path: &Path, output_path: &Path, at: f64) -> FfmpegCommand {
    FfmpegCommand::new(video_path, output_path)
        .seek(at)
        .single_frame()
        .video_filter(format!("scale={}:-2", THUMBNAIL_SCALE_WIDTH))
        .output_args(["-q:v", "3"])
}

/// Write a JPEG thumbnail of `video_path` at `at` seconds.
pub async fn generate_thumbnail(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    at: f64,
    options: &ExecOptions,
) -> MediaResult<()> {
    let output_path = output_path.as_ref();
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    thumbnail_command(video_path.as_ref(), output_path, at)
        .run(executor, tools, options)
        .await?;
    Ok(())
}
