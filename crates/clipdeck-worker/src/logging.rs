//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use clipdeck_models::{Job, JobKind};

/// Job logger carrying the job, resource and kind on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    resource_id: String,
    kind: JobKind,
}

impl JobLogger {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            resource_id: job.resource_id.to_string(),
            kind: job.kind,
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            resource_id = %self.resource_id,
            kind = %self.kind,
            "Job started: {}", message
        );
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            resource_id = %self.resource_id,
            kind = %self.kind,
            stage = stage,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            resource_id = %self.resource_id,
            kind = %self.kind,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            resource_id = %self.resource_id,
            kind = %self.kind,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            resource_id = %self.resource_id,
            kind = %self.kind,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Span to instrument the job's future with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            resource_id = %self.resource_id,
            kind = %self.kind
        )
    }
}
