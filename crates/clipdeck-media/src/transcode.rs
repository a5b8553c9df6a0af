//! Canonical transcode.

use std::path::Path;
use std::sync::{Arc, Mutex};

use clipdeck_models::EncodingConfig;
use tracing::info;

use crate::command::{FfmpegCommand, MediaTools};
use crate::error::MediaResult;
use crate::executor::{CommandExecutor, ExecOptions, LineObserver};
use crate::progress::ProgressTracker;

/// Callback receiving transcode completion percentage (0.0-100.0).
pub type PercentCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Build the canonical transcode command (H.264/AAC in MP4).
pub fn canonical_command(input: &Path, output: &Path, encoding: &EncodingConfig) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .log_level("info")
        .with_progress()
        .output_args(["-map", "0:v:0", "-map", "0:a:0?"])
        .output_args(encoding.to_ffmpeg_args())
        .faststart()
}

/// Transcode `input` into the canonical file at `output`.
///
/// Percentages are parsed from FFmpeg's own progress output; `known_duration`
/// is used when the input banner does not carry one.
pub async fn transcode_canonical(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    known_duration: Option<f64>,
    options: &ExecOptions,
    on_percent: PercentCallback,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    info!(
        "Transcoding canonical file: {} -> {}",
        input.display(),
        output.display()
    );

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tracker = Arc::new(Mutex::new(ProgressTracker::new(known_duration)));
    let observer: LineObserver = Arc::new(move |line: &str| {
        let percent = tracker.lock().ok().and_then(|mut t| t.feed(line));
        if let Some(percent) = percent {
            on_percent(percent);
        }
    });

    let cmd = canonical_command(input, output, &EncodingConfig::canonical());
    let options = options.clone().with_stderr_observer(observer);
    cmd.run(executor, tools, &options).await?;

    info!("Canonical file ready: {}", output.display());
    Ok(())
}
