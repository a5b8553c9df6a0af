//! Pipeline metrics.
//!
//! Only the `metrics` facade is used here; installing a recorder is up to the
//! host process.

use metrics::{counter, histogram};

use clipdeck_models::{JobKind, JobStatus};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "clipdeck_jobs_total";
    pub const STAGE_DURATION_SECONDS: &str = "clipdeck_stage_duration_seconds";
    pub const RECOVERED_JOBS_TOTAL: &str = "clipdeck_recovered_jobs_total";
    pub const DROPPED_TRIGGERS_TOTAL: &str = "clipdeck_dropped_triggers_total";
}

/// Record a job reaching a status.
pub fn record_job(kind: JobKind, status: JobStatus) {
    counter!(
        names::JOBS_TOTAL,
        "kind" => kind.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}

pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

pub fn record_recovered_jobs(count: usize) {
    counter!(names::RECOVERED_JOBS_TOTAL).increment(count as u64);
}

/// A trigger ignored because the resource was already claimed.
pub fn record_dropped_trigger(kind: JobKind) {
    counter!(names::DROPPED_TRIGGERS_TOTAL, "kind" => kind.as_str()).increment(1);
}
