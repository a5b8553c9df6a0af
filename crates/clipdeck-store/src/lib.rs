//! Persistence for the clipdeck pipeline.
//!
//! This crate provides:
//! - The [`Store`] trait the pipeline reads and writes through
//! - Patch and filter types for partial job/resource updates
//! - [`MemoryStore`], an in-process implementation
//!
//! Every implementation must reject updates to jobs that already reached a
//! terminal status. The pipeline relies on this so a superseded job that is
//! still running cannot later be marked completed.

pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use clipdeck_models::{Job, JobId, Range, RangeId, Resource, ResourceId, ShotBoundary};
use std::path::PathBuf;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use types::{JobFilter, JobPatch, ResourcePatch};

/// Durable state behind the pipeline.
#[async_trait]
pub trait Store: Send + Sync {
    // Jobs

    async fn insert_job(&self, job: &Job) -> StoreResult<()>;

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Apply a patch. Fails with [`StoreError::TerminalJob`] if the job is
    /// already completed, failed or cancelled.
    async fn update_job(&self, id: &JobId, patch: JobPatch) -> StoreResult<Job>;

    /// Jobs matching `filter`, oldest first.
    async fn list_jobs(&self, filter: &JobFilter) -> StoreResult<Vec<Job>>;

    /// Apply `patch` to every non-terminal job matching `filter` in one step.
    ///
    /// Returns the updated jobs.
    async fn update_jobs(&self, filter: &JobFilter, patch: JobPatch) -> StoreResult<Vec<Job>>;

    // Resources

    async fn insert_resource(&self, resource: &Resource) -> StoreResult<()>;

    async fn get_resource(&self, id: &ResourceId) -> StoreResult<Option<Resource>>;

    async fn update_resource(&self, id: &ResourceId, patch: ResourcePatch)
        -> StoreResult<Resource>;

    async fn list_resources(&self) -> StoreResult<Vec<Resource>>;

    // Ranges

    /// Insert or replace a range.
    async fn upsert_range(&self, range: &Range) -> StoreResult<()>;

    async fn get_range(&self, id: &RangeId) -> StoreResult<Option<Range>>;

    /// Ranges of a resource ordered by `order_index`.
    async fn list_ranges(&self, resource_id: &ResourceId) -> StoreResult<Vec<Range>>;

    /// Returns the removed range, if any.
    async fn delete_range(&self, id: &RangeId) -> StoreResult<Option<Range>>;

    /// Record the derived clip without touching the range's edit timestamp.
    async fn set_range_clip_path(&self, id: &RangeId, path: Option<PathBuf>) -> StoreResult<()>;

    // Shot boundaries

    /// Replace all boundaries of a resource.
    async fn replace_shot_boundaries(
        &self,
        resource_id: &ResourceId,
        boundaries: Vec<ShotBoundary>,
    ) -> StoreResult<()>;

    async fn list_shot_boundaries(&self, resource_id: &ResourceId)
        -> StoreResult<Vec<ShotBoundary>>;
}
