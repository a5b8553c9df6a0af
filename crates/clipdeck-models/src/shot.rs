//! Shot boundary models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// How a shot boundary was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// FFmpeg `scene` score over consecutive frames
    #[default]
    SceneScore,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::SceneScore => "scene_score",
        }
    }
}

/// A detected abrupt visual-content change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotBoundary {
    pub resource_id: ResourceId,

    /// Offset into the canonical file, in seconds
    pub timestamp: f64,

    /// Detector confidence (0.0-1.0)
    pub confidence: f64,

    #[serde(default)]
    pub method: DetectionMethod,
}
