//! Stage-weighted job progress.
//!
//! Progress is requested synchronously (from process observers and callbacks)
//! and persisted asynchronously by `flush`. Both the requested and the
//! persisted value only ever move forward.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use clipdeck_media::PercentCallback;
use clipdeck_models::{JobId, ResourceId};
use clipdeck_store::{JobPatch, ResourcePatch, Store};

use crate::error::WorkerResult;

struct Inner {
    store: Arc<dyn Store>,
    job_id: JobId,
    /// Resource whose `processing_progress` mirrors the job
    resource_id: Option<ResourceId>,
    target: AtomicU8,
    written: Mutex<u8>,
}

/// Progress writer for one job.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn Store>, job_id: JobId) -> Self {
        Self::build(store, job_id, None)
    }

    /// Reporter that also mirrors progress onto the resource.
    pub fn with_resource(store: Arc<dyn Store>, job_id: JobId, resource_id: ResourceId) -> Self {
        Self::build(store, job_id, Some(resource_id))
    }

    fn build(store: Arc<dyn Store>, job_id: JobId, resource_id: Option<ResourceId>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                job_id,
                resource_id,
                target: AtomicU8::new(0),
                written: Mutex::new(0),
            }),
        }
    }

    /// Raise the target percentage. Never blocks, never lowers.
    pub fn request(&self, percent: u8) {
        self.inner
            .target
            .fetch_max(percent.min(100), Ordering::SeqCst);
    }

    /// Highest requested percentage.
    pub fn current(&self) -> u8 {
        self.inner.target.load(Ordering::SeqCst)
    }

    /// Persist the target if it moved past the last written value.
    pub async fn flush(&self) -> WorkerResult<()> {
        let mut written = self.inner.written.lock().await;
        let target = self.current();
        if target <= *written {
            return Ok(());
        }

        self.inner
            .store
            .update_job(&self.inner.job_id, JobPatch::new().progress(target))
            .await?;
        if let Some(resource_id) = &self.inner.resource_id {
            self.inner
                .store
                .update_resource(resource_id, ResourcePatch::new().progress(target))
                .await?;
        }

        debug!(job_id = %self.inner.job_id, progress = target, "Progress persisted");
        *written = target;
        Ok(())
    }

    pub async fn set(&self, percent: u8) -> WorkerResult<()> {
        self.request(percent);
        self.flush().await
    }

    /// Sub-range `[start, end]` of the overall percentage.
    pub fn band(&self, start: u8, end: u8) -> ProgressBand {
        let end = end.min(100);
        ProgressBand {
            reporter: self.clone(),
            start: start.min(end),
            end,
        }
    }
}

/// A stage's share of overall progress.
#[derive(Clone)]
pub struct ProgressBand {
    reporter: ProgressReporter,
    start: u8,
    end: u8,
}

impl ProgressBand {
    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    /// Overall percentage for `fraction` of this band.
    pub fn at_fraction(&self, fraction: f64) -> u8 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(self.end - self.start);
        self.start + (span * fraction).floor() as u8
    }

    pub fn request_fraction(&self, fraction: f64) {
        self.reporter.request(self.at_fraction(fraction));
    }

    pub async fn set_fraction(&self, fraction: f64) -> WorkerResult<()> {
        self.reporter.set(self.at_fraction(fraction)).await
    }

    pub async fn enter(&self) -> WorkerResult<()> {
        self.reporter.set(self.start).await
    }

    pub async fn complete(&self) -> WorkerResult<()> {
        self.reporter.set(self.end).await
    }

    /// Callback mapping a 0-100 stage percentage into this band.
    pub fn percent_callback(&self) -> PercentCallback {
        let band = self.clone();
        Arc::new(move |percent: f64| band.request_fraction(percent / 100.0))
    }

    /// Ticker that creeps forward by one point per tick, stopping short of
    /// the band's end, and persists whatever was requested.
    pub fn ticker(&self, interval: Duration) -> StageTicker {
        StageTicker::spawn(self.clone(), interval, true)
    }

    /// Ticker that only persists progress requested by someone else.
    pub fn flusher(&self, interval: Duration) -> StageTicker {
        StageTicker::spawn(self.clone(), interval, false)
    }
}

/// Background progress task for one stage. Stops when dropped.
pub struct StageTicker {
    handle: JoinHandle<()>,
}

impl StageTicker {
    fn spawn(band: ProgressBand, interval: Duration, advance: bool) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if advance {
                    let ceiling = band.end.saturating_sub(1).max(band.start);
                    let next = band
                        .reporter
                        .current()
                        .saturating_add(1)
                        .clamp(band.start, ceiling);
                    band.reporter.request(next);
                }

                if let Err(e) = band.reporter.flush().await {
                    if e.is_superseded() {
                        break;
                    }
                    warn!("Progress ticker failed to persist progress: {}", e);
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for StageTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
