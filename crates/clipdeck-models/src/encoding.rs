//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::QualityTier;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// CRF for the canonical transcode
pub const CANONICAL_CRF: u8 = 20;
/// Audio bitrate for the canonical transcode
pub const CANONICAL_AUDIO_BITRATE: &str = "160k";

/// Thumbnail generation settings
pub const THUMBNAIL_SCALE_WIDTH: u32 = 480;
/// Preview frame width
pub const PREVIEW_FRAME_WIDTH: u32 = 320;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    pub audio_bitrate: String,

    /// Downscale to this height when the source is taller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

impl EncodingConfig {
    /// Settings for the canonical per-resource transcode.
    pub fn canonical() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: CANONICAL_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: CANONICAL_AUDIO_BITRATE.to_string(),
            max_height: None,
        }
    }

    /// Settings for an exported clip at the given quality tier.
    pub fn for_quality(tier: QualityTier) -> Self {
        Self {
            crf: tier.crf(),
            audio_bitrate: tier.audio_bitrate().to_string(),
            max_height: tier.max_height(),
            ..Self::canonical()
        }
    }

    /// Scale filter keeping aspect ratio, never upscaling.
    pub fn scale_filter(&self) -> Option<String> {
        self.max_height
            .map(|h| format!("scale=-2:'min({},ih)'", h))
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(filter) = self.scale_filter() {
            args.push("-vf".to_string());
            args.push(filter);
        }
        args.extend([
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_args() {
        let args = EncodingConfig::canonical().to_ffmpeg_args();
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"20".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_quality_tier_scales() {
        let config = EncodingConfig::for_quality(QualityTier::Low);
        assert_eq!(config.crf, 28);
        let args = config.to_ffmpeg_args();
        assert_eq!(args[0], "-vf");
        assert_eq!(args[1], "scale=-2:'min(480,ih)'");
    }
}
