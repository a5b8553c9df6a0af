//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::command::MediaTools;
use crate::error::{MediaError, MediaResult};
use crate::executor::{CommandExecutor, ExecOptions};

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a video file for information.
pub async fn probe_video(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    path: impl AsRef<Path>,
    options: &ExecOptions,
) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let args = vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ];

    let output = executor.run(&tools.ffprobe, &args, options).await?;
    parse_probe_output(&output.stdout)
}

/// Parse FFprobe's JSON document.
pub fn parse_probe_output(stdout: &str) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_output("No video stream found"))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

/// Whether a keyframe sits within `tolerance` seconds of `at`.
///
/// Stream-copy cuts are only frame-exact when they land on a keyframe.
pub async fn keyframe_near(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    path: impl AsRef<Path>,
    at: f64,
    tolerance: f64,
    options: &ExecOptions,
) -> MediaResult<bool> {
    let window_start = (at - tolerance).max(0.0);
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-skip_frame".to_string(),
        "nokey".to_string(),
        "-show_entries".to_string(),
        "frame=pts_time".to_string(),
        "-of".to_string(),
        "csv=p=0".to_string(),
        "-read_intervals".to_string(),
        format!("{:.3}%+{:.3}", window_start, tolerance * 2.0 + 1.0),
        path.as_ref().to_string_lossy().to_string(),
    ];

    let output = executor.run(&tools.ffprobe, &args, options).await?;
    Ok(parse_keyframe_times(&output.stdout)
        .iter()
        .any(|t| (t - at).abs() <= tolerance))
}

fn parse_keyframe_times(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .filter_map(|l| l.trim().trim_end_matches(',').parse::<f64>().ok())
        .collect()
}
