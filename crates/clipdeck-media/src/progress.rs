//! FFmpeg progress parsing.
//!
//! Progress comes from two places on stderr: the `Duration: HH:MM:SS.ss`
//! banner printed while probing the input, and the key=value blocks produced
//! by `-progress pipe:2`. Both are best-effort; callers fall back to a
//! known duration when the banner is missing.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }
}

/// Parse a progress line from FFmpeg's -progress output.
///
/// Returns a snapshot at the end of each block (`progress=continue|end`).
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_ms" | "out_time_us" => {
            // Both keys carry microseconds in current FFmpeg builds.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
    })
}

/// Parse the input duration banner (`Duration: 00:01:02.50, start: ...`).
pub fn parse_duration_banner(line: &str) -> Option<f64> {
    let caps = duration_regex().captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Turns a stream of stderr lines into a completion percentage.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total_ms: Option<i64>,
    current: FfmpegProgress,
}

impl ProgressTracker {
    /// `known_duration` is used until (or unless) a banner is seen.
    pub fn new(known_duration: Option<f64>) -> Self {
        Self {
            total_ms: known_duration.filter(|d| *d > 0.0).map(|d| (d * 1000.0) as i64),
            current: FfmpegProgress::default(),
        }
    }

    pub fn total_ms(&self) -> Option<i64> {
        self.total_ms
    }

    /// Feed one line; returns a new percentage when a progress block closes.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        if self.total_ms.is_none() {
            if let Some(secs) = parse_duration_banner(line) {
                self.total_ms = Some((secs * 1000.0) as i64);
                return None;
            }
        }
        let snapshot = parse_progress_line(line, &mut self.current)?;
        if snapshot.is_complete {
            return Some(100.0);
        }
        self.total_ms.map(|total| snapshot.percentage(total))
    }
}
