//! In-process store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use clipdeck_models::{Job, JobId, Range, RangeId, Resource, ResourceId, ShotBoundary};

use crate::error::{StoreError, StoreResult};
use crate::types::{JobFilter, JobPatch, ResourcePatch};
use crate::Store;

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    resources: HashMap<ResourceId, Resource>,
    ranges: HashMap<RangeId, Range>,
    shots: HashMap<ResourceId, Vec<ShotBoundary>>,
}

/// Store backed by in-memory maps behind one lock.
///
/// Each call takes the lock once, so a bulk update is atomic with respect to
/// other callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_jobs(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::already_exists("job", &job.id));
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(id).cloned())
    }

    async fn update_job(&self, id: &JobId, patch: JobPatch) -> StoreResult<Job> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("job", id))?;
        if job.is_terminal() {
            warn!(
                job_id = %id,
                status = %job.status,
                "Rejected update to terminal job"
            );
            return Err(StoreError::TerminalJob {
                job_id: id.to_string(),
                status: job.status,
            });
        }
        patch.apply(job, Utc::now());
        Ok(job.clone())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        sort_jobs(&mut jobs);
        Ok(jobs)
    }

    async fn update_jobs(&self, filter: &JobFilter, patch: JobPatch) -> StoreResult<Vec<Job>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut updated: Vec<Job> = inner
            .jobs
            .values_mut()
            .filter(|j| !j.is_terminal() && filter.matches(j))
            .map(|j| {
                patch.apply(j, now);
                j.clone()
            })
            .collect();
        sort_jobs(&mut updated);
        debug!("Bulk job update touched {} jobs", updated.len());
        Ok(updated)
    }

    async fn insert_resource(&self, resource: &Resource) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.resources.contains_key(&resource.id) {
            return Err(StoreError::already_exists("resource", &resource.id));
        }
        inner
            .resources
            .insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn get_resource(&self, id: &ResourceId) -> StoreResult<Option<Resource>> {
        Ok(self.inner.read().await.resources.get(id).cloned())
    }

    async fn update_resource(
        &self,
        id: &ResourceId,
        patch: ResourcePatch,
    ) -> StoreResult<Resource> {
        let mut inner = self.inner.write().await;
        let resource = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("resource", id))?;
        patch.apply(resource, Utc::now());
        Ok(resource.clone())
    }

    async fn list_resources(&self) -> StoreResult<Vec<Resource>> {
        let inner = self.inner.read().await;
        let mut resources: Vec<Resource> = inner.resources.values().cloned().collect();
        resources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(resources)
    }

    async fn upsert_range(&self, range: &Range) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.resources.contains_key(&range.resource_id) {
            return Err(StoreError::not_found("resource", &range.resource_id));
        }
        inner.ranges.insert(range.id.clone(), range.clone());
        Ok(())
    }

    async fn get_range(&self, id: &RangeId) -> StoreResult<Option<Range>> {
        Ok(self.inner.read().await.ranges.get(id).cloned())
    }

    async fn list_ranges(&self, resource_id: &ResourceId) -> StoreResult<Vec<Range>> {
        let inner = self.inner.read().await;
        let mut ranges: Vec<Range> = inner
            .ranges
            .values()
            .filter(|r| &r.resource_id == resource_id)
            .cloned()
            .collect();
        ranges.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(ranges)
    }

    async fn delete_range(&self, id: &RangeId) -> StoreResult<Option<Range>> {
        let removed = self.inner.write().await.ranges.remove(id);
        if removed.is_some() {
            debug!(range_id = %id, "Deleted range");
        }
        Ok(removed)
    }

    async fn set_range_clip_path(&self, id: &RangeId, path: Option<PathBuf>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let range = inner
            .ranges
            .get_mut(id)
            .ok_or_else(|| {
                debug!(range_id = %id, "Clip path update for missing range");
                StoreError::not_found("range", id)
            })?;
        range.clip_path = path;
        Ok(())
    }

    async fn replace_shot_boundaries(
        &self,
        resource_id: &ResourceId,
        mut boundaries: Vec<ShotBoundary>,
    ) -> StoreResult<()> {
        boundaries.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        debug!(
            resource_id = %resource_id,
            "Replacing shot boundaries ({} cuts)",
            boundaries.len()
        );
        self.inner
            .write()
            .await
            .shots
            .insert(resource_id.clone(), boundaries);
        Ok(())
    }

    async fn list_shot_boundaries(
        &self,
        resource_id: &ResourceId,
    ) -> StoreResult<Vec<ShotBoundary>> {
        Ok(self
            .inner
            .read()
            .await
            .shots
            .get(resource_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipdeck_models::{JobKind, JobStatus, SourceLocator};

    fn resource() -> Resource {
        Resource::new(
            "talk",
            "A talk",
            SourceLocator::LocalFile {
                path: PathBuf::from("/media/talk.mkv"),
            },
        )
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_immutable() {
        let store = MemoryStore::new();
        let job = Job::new(
            ResourceId::from("r"),
            JobKind::ResourceProcessing,
            serde_json::Value::Null,
        );
        store.insert_job(&job).await.unwrap();

        store
            .update_job(&job.id, JobPatch::cancelled("superseded"))
            .await
            .unwrap();
        let err = tokio_test::assert_err!(store.update_job(&job.id, JobPatch::completed()).await);

        assert!(err.is_terminal_job());
        let stored = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_terminal_rejection_is_logged() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = MemoryStore::new();
        let job = Job::new(
            ResourceId::from("r"),
            JobKind::RangeExport,
            serde_json::Value::Null,
        );
        store.insert_job(&job).await.unwrap();
        store.update_job(&job.id, JobPatch::completed()).await.unwrap();
        tokio_test::assert_err!(store.update_job(&job.id, JobPatch::new().progress(50)).await);

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Rejected update to terminal job"), "logs: {text}");
        assert!(text.contains(job.id.as_str()));
    }

    #[tokio::test]
    async fn test_duplicate_job_insert_rejected() {
        let store = MemoryStore::new();
        let job = Job::new(ResourceId::from("r"), JobKind::ExportPackage, serde_json::Value::Null);
        store.insert_job(&job).await.unwrap();
        assert!(matches!(
            store.insert_job(&job).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_bulk_update_skips_terminal() {
        let store = MemoryStore::new();
        let resource_id = ResourceId::from("r");
        let mut ids = Vec::new();
        for _ in 0..3 {
            let job = Job::new(resource_id.clone(), JobKind::ResourceProcessing, serde_json::Value::Null);
            store.insert_job(&job).await.unwrap();
            store.update_job(&job.id, JobPatch::processing()).await.unwrap();
            ids.push(job.id);
        }
        store.update_job(&ids[0], JobPatch::completed()).await.unwrap();

        let filter = JobFilter::all().status(JobStatus::Processing);
        let updated = store
            .update_jobs(&filter, JobPatch::failed("interrupted"))
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);

        let again = store
            .update_jobs(&filter, JobPatch::failed("interrupted"))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_ranges_ordered_by_index() {
        let store = MemoryStore::new();
        let res = resource();
        store.insert_resource(&res).await.unwrap();

        for idx in [2u32, 0, 1] {
            let range = Range::new(res.id.clone(), idx as f64, idx as f64 + 1.0, format!("r{idx}"))
                .with_order_index(idx);
            store.upsert_range(&range).await.unwrap();
        }

        let ranges = store.list_ranges(&res.id).await.unwrap();
        let order: Vec<u32> = ranges.iter().map(|r| r.order_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_range_requires_resource() {
        let store = MemoryStore::new();
        let range = Range::new(ResourceId::from("missing"), 0.0, 1.0, "x");
        assert!(store.upsert_range(&range).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clip_path_keeps_edit_timestamp() {
        let store = MemoryStore::new();
        let res = resource();
        store.insert_resource(&res).await.unwrap();
        let range = Range::new(res.id.clone(), 1.0, 2.0, "intro");
        store.upsert_range(&range).await.unwrap();

        store
            .set_range_clip_path(&range.id, Some(PathBuf::from("/data/clip.mp4")))
            .await
            .unwrap();

        let stored = store.get_range(&range.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, range.updated_at);
        assert_eq!(stored.clip_path, Some(PathBuf::from("/data/clip.mp4")));
    }
}
