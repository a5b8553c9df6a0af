//! FFmpeg command builder and tool locations.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};
use crate::executor::{CommandExecutor, ExecOptions, ProcessOutput};

/// Locations of the external tools the pipeline drives.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub ytdlp: String,
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            ytdlp: "yt-dlp".to_string(),
        }
    }
}

impl MediaTools {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg: std::env::var("CLIPDECK_FFMPEG").unwrap_or(defaults.ffmpeg),
            ffprobe: std::env::var("CLIPDECK_FFPROBE").unwrap_or(defaults.ffprobe),
            ytdlp: std::env::var("CLIPDECK_YTDLP").unwrap_or(defaults.ytdlp),
        }
    }

    /// Check FFmpeg is available.
    pub fn check_ffmpeg(&self) -> MediaResult<PathBuf> {
        which::which(&self.ffmpeg).map_err(|_| MediaError::ToolNotFound(self.ffmpeg.clone()))
    }

    /// Check FFprobe is available.
    pub fn check_ffprobe(&self) -> MediaResult<PathBuf> {
        which::which(&self.ffprobe).map_err(|_| MediaError::ToolNotFound(self.ffprobe.clone()))
    }

    /// Check yt-dlp is available.
    pub fn check_ytdlp(&self) -> MediaResult<PathBuf> {
        which::which(&self.ytdlp).map_err(|_| MediaError::ToolNotFound(self.ytdlp.clone()))
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path (or `-` for null muxers)
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Emit `-progress pipe:2` key=value blocks
    progress: bool,
    /// Suppress the periodic stats line
    no_stats: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            progress: false,
            no_stats: false,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set duration (output side, exact after an input seek).
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Drop audio.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Move the MP4 index to the front.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Request machine-readable progress on stderr.
    pub fn with_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    /// Suppress the `frame=... speed=...` stats line on stderr.
    pub fn no_stats(mut self) -> Self {
        self.no_stats = true;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        if self.progress || self.no_stats {
            args.push("-nostats".to_string());
        }
        if self.progress {
            args.push("-progress".to_string());
            args.push("pipe:2".to_string());
        }

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }

    /// Run through an executor.
    pub async fn run(
        &self,
        executor: &dyn CommandExecutor,
        tools: &MediaTools,
        options: &ExecOptions,
    ) -> MediaResult<ProcessOutput> {
        executor.run(&tools.ffmpeg, &self.build_args(), options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .codec_copy();

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert!(ss < input && input < t);
        assert_eq!(args[ss + 1], "10.000");
        assert_eq!(args.last().unwrap(), "output.mp4");
        assert!(!args.contains(&"-progress".to_string()));
    }

    #[test]
    fn test_progress_flags() {
        let args = FfmpegCommand::new("in.mp4", "out.mp4")
            .with_progress()
            .build_args();
        let idx = args.iter().position(|a| a == "-progress").unwrap();
        assert_eq!(args[idx + 1], "pipe:2");
    }

    #[test]
    fn test_no_stats_emitted_once() {
        let args = FfmpegCommand::new("in.mp4", "-")
            .no_stats()
            .with_progress()
            .build_args();
        assert_eq!(args.iter().filter(|a| *a == "-nostats").count(), 1);
        let nostats = args.iter().position(|a| a == "-nostats").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(nostats < input);
    }
}
