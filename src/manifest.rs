//! Input manifest staging
//!
//! A manifest is a one-record `(i64, String)` record file naming the source
//! file of the pair under repair. It lives at `<in_dir>/<job_name>.in` and is
//! what the split planner enumerates and the reconstruction tasks read.

use thiserror::Error;
use tracing::debug;

use crate::records::{RecordError, RecordReader, RecordWriter};
use crate::storage::{StorageClient, StorageError, StoragePath};

pub const IN_FILE_SUFFIX: &str = ".in";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("malformed manifest: {0}")]
    Record(#[from] RecordError),
}

/// File name of the manifest for a job
pub fn manifest_file_name(job_name: &str) -> String {
    format!("{job_name}{IN_FILE_SUFFIX}")
}

pub fn manifest_path(in_dir: &StoragePath, job_name: &str) -> StoragePath {
    in_dir.child(manifest_file_name(job_name))
}

/// Stage a manifest naming `file_path`, returning where it was written.
///
/// A failed write may leave a partial directory behind; retries use a fresh
/// job name so they never collide with it.
pub async fn write_manifest(
    storage: &StorageClient,
    job_name: &str,
    in_dir: &StoragePath,
    file_path: &str,
) -> Result<StoragePath, ManifestError> {
    let path = manifest_path(in_dir, job_name);

    let mut writer = RecordWriter::<i64, String>::new();
    writer.append(&0, &file_path.to_string());
    storage.put(&path, writer.finish()).await?;

    debug!(%path, file_path, "Staged input manifest");
    Ok(path)
}

pub async fn read_manifest(
    storage: &StorageClient,
    path: &StoragePath,
) -> Result<Vec<(i64, String)>, ManifestError> {
    let data = storage.get(path).await?;
    Ok(RecordReader::<i64, String>::new(data)?.read_all()?)
}
