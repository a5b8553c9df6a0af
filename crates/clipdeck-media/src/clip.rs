//! Range trimming.
//!
//! A stream-copy cut is fast but only frame-exact when the start lands on a
//! keyframe. The start is checked first; a misaligned start or a failed copy
//! falls through to a full re-encode.

use std::path::{Path, PathBuf};

use clipdeck_models::EncodingConfig;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, MediaTools};
use crate::error::{MediaError, MediaResult};
use crate::executor::{CommandExecutor, ExecOptions};
use crate::fs_utils::{move_file, remove_file_if_exists, staging_path};
use crate::probe::keyframe_near;

/// Seconds a keyframe may sit from the cut point and still count as aligned.
pub const KEYFRAME_TOLERANCE_SECS: f64 = 0.05;

/// How a clip was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMode {
    StreamCopy,
    ReEncode,
}

impl TrimMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimMode::StreamCopy => "stream_copy",
            TrimMode::ReEncode => "re_encode",
        }
    }
}

/// Result of a trim.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimOutcome {
    pub mode: TrimMode,
    pub output: PathBuf,
}

/// Executor options for each trim step.
#[derive(Debug, Clone, Default)]
pub struct TrimOptions {
    pub probe: ExecOptions,
    pub copy: ExecOptions,
    pub reencode: ExecOptions,
}

fn validate_range(start: f64, end: f64) -> MediaResult<()> {
    if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
        return Err(MediaError::InvalidRange(format!(
            "start {start:.3}s must be before end {end:.3}s"
        )));
    }
    Ok(())
}

/// Stream-copy trim command.
pub fn copy_trim_command(input: &Path, output: &Path, start: f64, end: f64) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(start)
        .duration(end - start)
        .codec_copy()
        .output_args(["-avoid_negative_ts", "make_zero"])
        .faststart()
}

/// Re-encoding trim command.
pub fn reencode_trim_command(
    input: &Path,
    output: &Path,
    start: f64,
    end: f64,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(start)
        .duration(end - start)
        .output_args(encoding.to_ffmpeg_args())
        .faststart()
}

/// Fast path. Fails with `NotKeyframeAligned` when the start is not on a keyframe.
pub async fn trim_stream_copy(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    input: &Path,
    output: &Path,
    start: f64,
    end: f64,
    options: &TrimOptions,
) -> MediaResult<()> {
    validate_range(start, end)?;

    let aligned = start == 0.0
        || keyframe_near(
            executor,
            tools,
            input,
            start,
            KEYFRAME_TOLERANCE_SECS,
            &options.probe,
        )
        .await?;
    if !aligned {
        return Err(MediaError::NotKeyframeAligned);
    }

    write_via_staging(output, |staged| async move {
        copy_trim_command(input, &staged, start, end)
            .run(executor, tools, &options.copy)
            .await
            .map(|_| ())
    })
    .await
}

/// Frame-exact path.
#[allow(clippy::too_many_arguments)]
pub async fn trim_reencode(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    input: &Path,
    output: &Path,
    start: f64,
    end: f64,
    encoding: &EncodingConfig,
    options: &ExecOptions,
) -> MediaResult<()> {
    validate_range(start, end)?;

    write_via_staging(output, |staged| async move {
        reencode_trim_command(input, &staged, start, end, encoding)
            .run(executor, tools, options)
            .await
            .map(|_| ())
    })
    .await
}

/// Trim `[start, end)` of `input` into `output`, preferring a stream copy.
///
/// The output path is overwritten in place.
#[allow(clippy::too_many_arguments)]
pub async fn trim_range(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start: f64,
    end: f64,
    encoding: &EncodingConfig,
    options: &TrimOptions,
) -> MediaResult<TrimOutcome> {
    let input = input.as_ref();
    let output = output.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }
    validate_range(start, end)?;

    match trim_stream_copy(executor, tools, input, output, start, end, options).await {
        Ok(()) => {
            info!("Trimmed {} by stream copy", output.display());
            return Ok(TrimOutcome {
                mode: TrimMode::StreamCopy,
                output: output.to_path_buf(),
            });
        }
        Err(MediaError::NotKeyframeAligned) => {
            info!(
                "Start {:.3}s is not on a keyframe, re-encoding {}",
                start,
                output.display()
            );
        }
        Err(e) => {
            warn!("Stream copy failed for {}: {}", output.display(), e);
        }
    }

    trim_reencode(
        executor,
        tools,
        input,
        output,
        start,
        end,
        encoding,
        &options.reencode,
    )
    .await?;

    Ok(TrimOutcome {
        mode: TrimMode::ReEncode,
        output: output.to_path_buf(),
    })
}

async fn write_via_staging<F, Fut>(output: &Path, write: F) -> MediaResult<()>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: std::future::Future<Output = MediaResult<()>>,
{
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staged = staging_path(output);
    if let Err(e) = write(staged.clone()).await {
        let _ = remove_file_if_exists(&staged).await;
        return Err(e);
    }
    if !staged.exists() {
        return Err(MediaError::invalid_output(format!(
            "ffmpeg reported success but wrote no file at {}",
            staged.display()
        )));
    }
    move_file(&staged, output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_validate_range() {
        assert_ok!(validate_range(0.0, 1.0));
        assert_err!(validate_range(2.0, 2.0));
        assert_err!(validate_range(-1.0, 2.0));
        assert_err!(validate_range(1.0, f64::INFINITY));
    }

    #[test]
    fn test_copy_command_uses_duration() {
        let args = copy_trim_command(Path::new("c.mp4"), Path::new("o.mp4"), 10.0, 12.5)
            .build_args();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "2.500");
        assert!(args.contains(&"copy".to_string()));
    }

    #[test]
    fn test_reencode_command_uses_encoding() {
        let encoding = EncodingConfig::for_quality(clipdeck_models::QualityTier::Low);
        let args = reencode_trim_command(
            Path::new("c.mp4"),
            Path::new("o.mp4"),
            1.0,
            3.0,
            &encoding,
        )
        .build_args();
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "28");
        assert!(!args.contains(&"copy".to_string()));
    }
}
