//! Media pipeline worker.
//!
//! This crate provides:
//! - Resource processing (acquire, transcode, shots, frames, clips)
//! - Debounced per-range clip regeneration
//! - Startup recovery of interrupted jobs
//! - Export packages with clips, thumbnails, hotkey control page and OBS automation
//! - The `PipelineService` facade tying them together

pub mod claims;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod recovery;
pub mod regeneration;
pub mod service;

pub use claims::{ClaimGuard, ClaimTable};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{WorkerError, WorkerResult};
pub use export::{assign_hotkey, ExportArtifact, Hotkey};
pub use layout::ResourceLayout;
pub use logging::JobLogger;
pub use progress::{ProgressBand, ProgressReporter};
pub use recovery::{run_recovery_sweep, RecoveryReport, INTERRUPTED_MESSAGE};
pub use regeneration::RegenerationScheduler;
pub use service::{PipelineService, RangeEdit};
