//! Export package options.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output quality for exported clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
    /// Keep source resolution
    Source,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
            QualityTier::Source => "source",
        }
    }

    /// Target output height, `None` keeps the source resolution.
    pub fn max_height(&self) -> Option<u32> {
        match self {
            QualityTier::Low => Some(480),
            QualityTier::Medium => Some(720),
            QualityTier::High => Some(1080),
            QualityTier::Source => None,
        }
    }

    /// Constant Rate Factor for the tier.
    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::Low => 28,
            QualityTier::Medium => 23,
            QualityTier::High => 20,
            QualityTier::Source => 18,
        }
    }

    /// Audio bitrate for the tier.
    pub fn audio_bitrate(&self) -> &'static str {
        match self {
            QualityTier::Low => "96k",
            QualityTier::Medium => "128k",
            QualityTier::High | QualityTier::Source => "192k",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which parts make up an exported clip's file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// `<resource>_<content>_<label>`
    ResourceContentLabel,
    /// `<content>_<label>`
    #[default]
    ContentLabel,
    /// `<label>`
    LabelOnly,
}

/// Options for an export package build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ExportOptions {
    #[serde(default)]
    pub quality: QualityTier,

    #[serde(default)]
    pub naming: NamingConvention,
}
