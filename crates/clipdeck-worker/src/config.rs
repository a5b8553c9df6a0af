//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use clipdeck_media::{ExecOptions, FrameSamplingConfig, SceneDetectConfig, TrimOptions};

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of persisted per-resource artifacts
    pub data_dir: PathBuf,
    /// Managed scratch space (downloads, export staging)
    pub temp_dir: PathBuf,

    /// Canonical transcode limit
    pub transcode_timeout: Duration,
    /// Shot detection limit
    pub analysis_timeout: Duration,
    /// Limit per frame sampling batch
    pub frame_batch_timeout: Duration,
    /// Limit per range trim
    pub trim_timeout: Duration,
    /// Limit per thumbnail
    pub thumbnail_timeout: Duration,
    /// Limit per ffprobe call
    pub probe_timeout: Duration,
    /// Limit for video-host downloads
    pub download_timeout: Duration,
    /// Time between SIGTERM and SIGKILL
    pub kill_grace: Duration,
    /// Fixed delay between retries
    pub retry_delay: Duration,

    pub shot_retries: u32,
    pub frame_batch_retries: u32,
    pub reencode_retries: u32,
    pub thumbnail_retries: u32,
    pub probe_retries: u32,
    pub download_retries: u32,

    /// Quiet period before a range edit is re-derived
    pub debounce: Duration,
    /// Interval of the progress ticker for stages without native progress
    pub progress_tick: Duration,

    /// Maximum timestamps per frame sampling invocation
    pub frame_batch_ceiling: usize,
    /// Fill interval between frame anchors, in seconds
    pub frame_interval_secs: f64,
    /// Scene score threshold for shot boundaries
    pub scene_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            temp_dir: std::env::temp_dir().join("clipdeck"),
            transcode_timeout: Duration::from_secs(4 * 60 * 60),
            analysis_timeout: Duration::from_secs(60 * 60),
            frame_batch_timeout: Duration::from_secs(10 * 60),
            trim_timeout: Duration::from_secs(10 * 60),
            thumbnail_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(2 * 60 * 60),
            kill_grace: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            shot_retries: 1,
            frame_batch_retries: 2,
            reencode_retries: 1,
            thumbnail_retries: 2,
            probe_retries: 1,
            download_retries: 2,
            debounce: Duration::from_millis(1200),
            progress_tick: Duration::from_secs(1),
            frame_batch_ceiling: clipdeck_media::frames::DEFAULT_BATCH_CEILING,
            frame_interval_secs: 2.0,
            scene_threshold: 0.3,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("CLIPDECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            temp_dir: std::env::var("CLIPDECK_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            transcode_timeout: Duration::from_secs(env_u64(
                "CLIPDECK_TRANSCODE_TIMEOUT_SECS",
                defaults.transcode_timeout.as_secs(),
            )),
            analysis_timeout: Duration::from_secs(env_u64(
                "CLIPDECK_ANALYSIS_TIMEOUT_SECS",
                defaults.analysis_timeout.as_secs(),
            )),
            frame_batch_timeout: Duration::from_secs(env_u64(
                "CLIPDECK_FRAME_BATCH_TIMEOUT_SECS",
                defaults.frame_batch_timeout.as_secs(),
            )),
            trim_timeout: Duration::from_secs(env_u64(
                "CLIPDECK_TRIM_TIMEOUT_SECS",
                defaults.trim_timeout.as_secs(),
            )),
            thumbnail_timeout: defaults.thumbnail_timeout,
            probe_timeout: defaults.probe_timeout,
            download_timeout: Duration::from_secs(env_u64(
                "CLIPDECK_DOWNLOAD_TIMEOUT_SECS",
                defaults.download_timeout.as_secs(),
            )),
            kill_grace: Duration::from_secs(env_u64(
                "CLIPDECK_KILL_GRACE_SECS",
                defaults.kill_grace.as_secs(),
            )),
            retry_delay: Duration::from_millis(env_u64(
                "CLIPDECK_RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )),
            shot_retries: env_u32("CLIPDECK_SHOT_RETRIES", defaults.shot_retries),
            frame_batch_retries: env_u32(
                "CLIPDECK_FRAME_BATCH_RETRIES",
                defaults.frame_batch_retries,
            ),
            reencode_retries: env_u32("CLIPDECK_REENCODE_RETRIES", defaults.reencode_retries),
            thumbnail_retries: env_u32("CLIPDECK_THUMBNAIL_RETRIES", defaults.thumbnail_retries),
            probe_retries: env_u32("CLIPDECK_PROBE_RETRIES", defaults.probe_retries),
            download_retries: env_u32("CLIPDECK_DOWNLOAD_RETRIES", defaults.download_retries),
            debounce: Duration::from_millis(env_u64(
                "CLIPDECK_DEBOUNCE_MS",
                defaults.debounce.as_millis() as u64,
            )),
            progress_tick: Duration::from_millis(env_u64(
                "CLIPDECK_PROGRESS_TICK_MS",
                defaults.progress_tick.as_millis() as u64,
            )),
            frame_batch_ceiling: env_u64(
                "CLIPDECK_FRAME_BATCH_CEILING",
                defaults.frame_batch_ceiling as u64,
            )
            .max(1) as usize,
            frame_interval_secs: env_f64(
                "CLIPDECK_FRAME_INTERVAL_SECS",
                defaults.frame_interval_secs,
            ),
            scene_threshold: env_f64("CLIPDECK_SCENE_THRESHOLD", defaults.scene_threshold),
        }
    }

    /// Same settings rooted at `base` (`base/data`, `base/tmp`).
    pub fn rooted_at(mut self, base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        self.data_dir = base.join("data");
        self.temp_dir = base.join("tmp");
        self
    }

    fn exec(&self, timeout: Duration, retries: u32) -> ExecOptions {
        ExecOptions::new()
            .with_timeout(timeout)
            .with_kill_grace(self.kill_grace)
            .with_retries(retries, self.retry_delay)
    }

    pub fn transcode_exec(&self) -> ExecOptions {
        self.exec(self.transcode_timeout, 0)
    }

    pub fn analysis_exec(&self) -> ExecOptions {
        self.exec(self.analysis_timeout, self.shot_retries)
    }

    pub fn frame_batch_exec(&self) -> ExecOptions {
        self.exec(self.frame_batch_timeout, self.frame_batch_retries)
    }

    pub fn thumbnail_exec(&self) -> ExecOptions {
        self.exec(self.thumbnail_timeout, self.thumbnail_retries)
    }

    pub fn probe_exec(&self) -> ExecOptions {
        self.exec(self.probe_timeout, self.probe_retries)
    }

    pub fn download_exec(&self) -> ExecOptions {
        self.exec(self.download_timeout, self.download_retries)
    }

    /// A failed stream copy falls through to re-encode, so it is never retried.
    pub fn trim_options(&self) -> TrimOptions {
        TrimOptions {
            probe: self.probe_exec(),
            copy: self.exec(self.trim_timeout, 0),
            reencode: self.exec(self.trim_timeout, self.reencode_retries),
        }
    }

    pub fn scene_detect(&self) -> SceneDetectConfig {
        SceneDetectConfig {
            threshold: self.scene_threshold,
            ..SceneDetectConfig::default()
        }
    }

    pub fn frame_sampling(&self) -> FrameSamplingConfig {
        FrameSamplingConfig {
            interval_secs: self.frame_interval_secs,
            batch_ceiling: self.frame_batch_ceiling,
            ..FrameSamplingConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_site_retries() {
        let config = PipelineConfig::default();
        assert_eq!(config.transcode_exec().retries, 0);
        assert_eq!(config.analysis_exec().retries, 1);
        assert_eq!(config.frame_batch_exec().retries, 2);
        assert_eq!(config.trim_options().copy.retries, 0);
        assert_eq!(config.trim_options().reencode.retries, 1);
        assert_eq!(config.thumbnail_exec().retries, 2);
        assert_eq!(config.probe_exec().retries, 1);
        assert_eq!(config.download_exec().retries, 2);
    }

    #[test]
    fn test_default_timeouts() {
        let config = PipelineConfig::default();
        assert_eq!(config.transcode_exec().timeout, Some(Duration::from_secs(14_400)));
        assert_eq!(config.thumbnail_exec().timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.debounce, Duration::from_millis(1200));
    }
}
