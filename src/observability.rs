//! Repair counters exposed on the health endpoint

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::repair::ReportStatus;

#[derive(Debug, Default)]
pub struct Metrics {
    repairs_submitted: AtomicU64,
    submissions_failed: AtomicU64,
    repairs_finished: AtomicU64,
    repairs_failed: AtomicU64,
    repairs_canceled: AtomicU64,
    jobs_orphaned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repair_submitted(&self) {
        self.repairs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "repairs_submitted", "Metric incremented");
    }

    pub fn submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_failed", "Metric incremented");
    }

    pub fn job_orphaned(&self) {
        self.jobs_orphaned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_orphaned", "Metric incremented");
    }

    pub fn repair_canceled(&self) {
        self.repairs_canceled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "repairs_canceled", "Metric incremented");
    }

    /// Count a terminal report. Active reports are ignored.
    pub fn record_outcome(&self, status: ReportStatus) {
        let (counter, name) = match status {
            ReportStatus::Active => return,
            ReportStatus::Finished => (&self.repairs_finished, "repairs_finished"),
            ReportStatus::Failed => (&self.repairs_failed, "repairs_failed"),
            ReportStatus::Canceled => (&self.repairs_canceled, "repairs_canceled"),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = name, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            repairs_submitted: self.repairs_submitted.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            repairs_finished: self.repairs_finished.load(Ordering::Relaxed),
            repairs_failed: self.repairs_failed.load(Ordering::Relaxed),
            repairs_canceled: self.repairs_canceled.load(Ordering::Relaxed),
            jobs_orphaned: self.jobs_orphaned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub repairs_submitted: u64,
    pub submissions_failed: u64,
    pub repairs_finished: u64,
    pub repairs_failed: u64,
    pub repairs_canceled: u64,
    pub jobs_orphaned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcome() {
        let metrics = Metrics::new();
        metrics.record_outcome(ReportStatus::Active);
        metrics.record_outcome(ReportStatus::Finished);
        metrics.record_outcome(ReportStatus::Canceled);
        metrics.repair_canceled();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.repairs_finished, 1);
        assert_eq!(snapshot.repairs_canceled, 2);
        assert_eq!(snapshot.repairs_failed, 0);
    }
}
