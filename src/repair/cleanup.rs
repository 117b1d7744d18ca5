use tracing::{debug, warn};

use crate::engine::JobHandle;
use crate::storage::StorageClient;

/// Remove a job's output directory and its staged input directory.
///
/// Failures are logged and otherwise ignored. Running it again on the same job
/// is harmless.
pub async fn cleanup(job: &dyn JobHandle, storage: &StorageClient) {
    let out_dir = job.output_path();
    match storage.delete_recursive(out_dir).await {
        Ok(deleted) => debug!(job_id = job.id(), path = %out_dir, deleted, "Deleted output dir"),
        Err(e) => warn!(job_id = job.id(), path = %out_dir, error = %e, "Could not delete output dir"),
    }

    // one input directory is staged per job
    let Some(in_dir) = job.input_paths().first() else {
        warn!(job_id = job.id(), "Job has no input dir to delete");
        return;
    };
    match storage.delete_recursive(in_dir).await {
        Ok(deleted) => debug!(job_id = job.id(), path = %in_dir, deleted, "Deleted input dir"),
        Err(e) => warn!(job_id = job.id(), path = %in_dir, error = %e, "Could not delete input dir"),
    }
}
