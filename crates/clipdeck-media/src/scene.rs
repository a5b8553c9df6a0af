//! Shot boundary detection.
//!
//! Runs FFmpeg's `scene` score over the canonical file and keeps frames whose
//! score exceeds the threshold. `metadata=print` logs, per selected frame, a
//! `pts_time:` line followed by a `lavfi.scene_score=` line.
//!
//! Long inputs produce more metadata than the executor retains, so cuts are
//! parsed from the stderr stream as it arrives rather than from the captured
//! output.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use tracing::info;

use crate::command::{FfmpegCommand, MediaTools};
use crate::error::MediaResult;
use crate::executor::{CommandExecutor, ExecOptions, LineObserver};

/// Scene detection settings.
#[derive(Debug, Clone)]
pub struct SceneDetectConfig {
    /// Minimum scene score (0.0-1.0) to count as a cut
    pub threshold: f64,
    /// Cuts closer than this to the previous one are dropped
    pub min_gap_secs: f64,
}

impl Default for SceneDetectConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_gap_secs: 0.5,
        }
    }
}

/// A detected cut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedCut {
    pub timestamp: f64,
    pub score: f64,
}

/// Build the detection command.
pub fn detect_command(input: &Path, config: &SceneDetectConfig) -> FfmpegCommand {
    FfmpegCommand::new(input, "-")
        .log_level("info")
        .no_stats()
        .video_filter(format!(
            "select='gt(scene,{:.3})',metadata=print",
            config.threshold
        ))
        .no_audio()
        .output_args(["-f", "null"])
}

/// Detect shot boundaries in a video file.
pub async fn detect_shots(
    executor: &dyn CommandExecutor,
    tools: &MediaTools,
    input: impl AsRef<Path>,
    config: &SceneDetectConfig,
    options: &ExecOptions,
) -> MediaResult<Vec<DetectedCut>> {
    let input = input.as_ref();
    let cmd = detect_command(input, config);

    let parser = Arc::new(Mutex::new(SceneParser::new(config.min_gap_secs)));
    let upstream = options.stderr_observer.clone();
    let sink = parser.clone();
    let observer: LineObserver = Arc::new(move |line: &str| {
        if let Ok(mut parser) = sink.lock() {
            parser.feed(line);
        }
        if let Some(upstream) = &upstream {
            upstream(line);
        }
    });
    let options = options.clone().with_stderr_observer(observer);
    cmd.run(executor, tools, &options).await?;

    let cuts = match parser.lock() {
        Ok(mut parser) => parser.take_cuts(),
        Err(poisoned) => poisoned.into_inner().take_cuts(),
    };
    info!(
        "Detected {} shot boundaries in {}",
        cuts.len(),
        input.display()
    );
    Ok(cuts)
}

fn pts_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pts_time:\s*([0-9]+(?:\.[0-9]+)?)").expect("valid pts regex"))
}

fn score_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"lavfi\.scene_score=([0-9]+(?:\.[0-9]+)?)").expect("valid score regex")
    })
}

/// Incremental parser for `metadata=print` output.
///
/// Pairs each `pts_time` line with the scene score that follows it.
#[derive(Debug)]
pub struct SceneParser {
    min_gap_secs: f64,
    pending: Option<f64>,
    cuts: Vec<DetectedCut>,
}

impl SceneParser {
    pub fn new(min_gap_secs: f64) -> Self {
        Self {
            min_gap_secs,
            pending: None,
            cuts: Vec::new(),
        }
    }

    /// Consume one stderr line.
    pub fn feed(&mut self, line: &str) {
        if let Some(caps) = pts_regex().captures(line) {
            self.pending = caps[1].parse().ok();
            return;
        }
        let Some(caps) = score_regex().captures(line) else {
            return;
        };
        let (Some(timestamp), Ok(score)) = (self.pending.take(), caps[1].parse::<f64>()) else {
            return;
        };
        let too_close = self
            .cuts
            .last()
            .is_some_and(|prev| timestamp - prev.timestamp < self.min_gap_secs);
        if !too_close {
            self.cuts.push(DetectedCut {
                timestamp,
                score: score.clamp(0.0, 1.0),
            });
        }
    }

    pub fn take_cuts(&mut self) -> Vec<DetectedCut> {
        self.pending = None;
        std::mem::take(&mut self.cuts)
    }
}

/// Parse a complete stderr capture.
pub fn parse_scene_output(stderr: &str, min_gap_secs: f64) -> Vec<DetectedCut> {
    let mut parser = SceneParser::new(min_gap_secs);
    for line in stderr.lines() {
        parser.feed(line);
    }
    parser.take_cuts()
}
