//! Completeness checks for tracked repairs
//!
//! | observed                                   | action        | status   |
//! |--------------------------------------------|---------------|----------|
//! | complete, successful                       | cleanup       | FINISHED |
//! | complete, unsuccessful                     | cleanup       | FAILED   |
//! | started, running for `max_fix_time` or more | kill, cleanup | CANCELED |
//! | any status query or kill fails             | kill, cleanup | FAILED   |
//! | otherwise                                  |               | ACTIVE   |
//!
//! Kill only requests termination. Tasks still winding down may write to the
//! output directory after cleanup has removed it.

use tracing::{debug, info};

use super::ReportStatus;
use super::cleanup::cleanup;
use crate::engine::{EngineError, JobHandle};
use crate::storage::StorageClient;

/// A job that has not started (`start_time == 0`) never times out
pub fn timed_out(start_time: u64, now: u64, max_fix_time: u64) -> bool {
    start_time > 0 && now.saturating_sub(start_time) >= max_fix_time
}

async fn check(job: &dyn JobHandle, now: u64, max_fix_time: u64) -> Result<ReportStatus, EngineError> {
    if job.is_complete().await? {
        return if job.is_successful().await? {
            info!(job_id = job.id(), "REPAIR COMPLETE");
            Ok(ReportStatus::Finished)
        } else {
            info!(job_id = job.id(), "REPAIR FAILED");
            Ok(ReportStatus::Failed)
        };
    }

    let start_time = job.start_time_millis().await?;
    if timed_out(start_time, now, max_fix_time) {
        info!(
            job_id = job.id(),
            elapsed = now.saturating_sub(start_time),
            start_time,
            "Timeout"
        );
        job.kill().await?;
        return Ok(ReportStatus::Canceled);
    }

    debug!(job_id = job.id(), "REPAIR RUNNING");
    Ok(ReportStatus::Active)
}

/// Classify one job at wall-clock `now`, killing and cleaning up as needed
pub async fn poll(
    job: &dyn JobHandle,
    storage: &StorageClient,
    now: u64,
    max_fix_time: u64,
) -> ReportStatus {
    let status = match check(job, now, max_fix_time).await {
        Ok(status) => status,
        Err(e) => {
            info!(job_id = job.id(), error = %e, "Exception during completeness check");
            if let Err(e) = job.kill().await {
                debug!(job_id = job.id(), error = %e, "Kill after failed check also failed");
            }
            ReportStatus::Failed
        }
    };

    if status.is_terminal() {
        cleanup(job, storage).await;
    }
    status
}
