//! Shared data models for the clipdeck pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their kinds and lifecycle status
//! - Resources (source media) and their source locators
//! - Ranges (bookmarks) and detected shot boundaries
//! - Encoding settings and export options (quality tiers, naming conventions)
//! - Status summaries used for observability

pub mod encoding;
pub mod export;
pub mod ids;
pub mod job;
pub mod range;
pub mod resource;
pub mod shot;
pub mod summary;

pub use encoding::EncodingConfig;
pub use export::{ExportOptions, NamingConvention, QualityTier};
pub use ids::{JobId, RangeId, ResourceId};
pub use job::{Job, JobKind, JobStatus};
pub use range::Range;
pub use resource::{Resource, SourceLocator};
pub use shot::{DetectionMethod, ShotBoundary};
pub use summary::StatusSummary;
