//! Job status aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Job, JobKind, JobStatus};

/// Counts of jobs per status and per kind/status pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
    pub by_kind: BTreeMap<JobKind, BTreeMap<JobStatus, usize>>,
}

impl StatusSummary {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut summary = Self::default();
        for job in jobs {
            summary.total += 1;
            *summary.by_status.entry(job.status).or_default() += 1;
            *summary
                .by_kind
                .entry(job.kind)
                .or_default()
                .entry(job.status)
                .or_default() += 1;
        }
        summary
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn count_kind(&self, kind: JobKind, status: JobStatus) -> usize {
        self.by_kind
            .get(&kind)
            .and_then(|m| m.get(&status))
            .copied()
            .unwrap_or(0)
    }
}
