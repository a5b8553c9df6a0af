//! Media processing for the clipdeck pipeline.
//!
//! This crate provides:
//! - A process executor with timeouts, escalating termination and retries
//! - An FFmpeg command builder and progress parsing
//! - Canonical transcoding, shot detection and batched frame sampling
//! - Range trimming (stream copy with re-encode fallback) and thumbnails
//! - Video-host downloads through yt-dlp

pub mod clip;
pub mod command;
pub mod download;
pub mod error;
pub mod executor;
pub mod frames;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod scene;
pub mod thumbnail;
pub mod transcode;

pub use clip::{trim_range, TrimMode, TrimOptions, TrimOutcome};
pub use command::{FfmpegCommand, MediaTools};
pub use download::{download_video, fetch_video_info, VideoHostInfo};
pub use error::{MediaError, MediaResult};
pub use executor::{
    ChildRegistry, CommandExecutor, ExecOptions, LineObserver, ProcessExecutor, ProcessOutput,
};
pub use frames::{extract_frames, FrameSamplingConfig, FrameSidecar};
pub use fs_utils::{move_file, remove_file_if_exists};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressTracker};
pub use scene::{detect_shots, DetectedCut, SceneDetectConfig, SceneParser};
pub use thumbnail::generate_thumbnail;
pub use transcode::{transcode_canonical, PercentCallback};
