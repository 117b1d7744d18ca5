//! Input splitting for reconstruction jobs
//!
//! Each job stages its manifest in its own input directory. The planner walks
//! that directory, opens the manifest named after the job and cuts it into
//! byte ranges of `files_per_task` records, so one task repairs that many
//! files.

use thiserror::Error;
use tracing::info;

use crate::manifest::manifest_file_name;
use crate::records::{RecordError, RecordReader};
use crate::storage::{StorageClient, StorageError, StoragePath};

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),
}

/// Byte range `[start, start + length)` of one manifest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSplit {
    pub path: StoragePath,
    pub start: u64,
    pub length: u64,
}

impl InputSplit {
    /// Read the `(key, path)` records covered by this split
    pub async fn read(&self, storage: &StorageClient) -> Result<Vec<(i64, String)>, SplitError> {
        let data = storage.get(&self.path).await?;
        let reader = RecordReader::<i64, String>::for_range(data, self.start, self.length)?;
        Ok(reader.read_all()?)
    }
}

#[derive(Debug, Clone)]
pub struct ReconstructionInputFormat {
    files_per_task: u64,
}

impl Default for ReconstructionInputFormat {
    fn default() -> Self {
        Self { files_per_task: 1 }
    }
}

impl ReconstructionInputFormat {
    pub fn with_files_per_task(files_per_task: u64) -> Self {
        Self {
            files_per_task: files_per_task.max(1),
        }
    }

    pub fn files_per_task(&self) -> u64 {
        self.files_per_task
    }

    /// Splits may be subdivided further by the engine
    pub fn is_splittable(&self, _path: &StoragePath) -> bool {
        true
    }

    pub async fn get_splits(
        &self,
        storage: &StorageClient,
        job_name: &str,
        input_paths: &[StoragePath],
    ) -> Result<Vec<InputSplit>, SplitError> {
        let manifest_name = manifest_file_name(job_name);
        let per_task = self.files_per_task;

        let mut splits = Vec::new();
        let mut file_counter = 0;

        for in_path in input_paths {
            if !storage.is_dir(in_path).await? {
                return Err(SplitError::NotADirectory(in_path.to_string()));
            }

            for entry in storage.list(in_path).await? {
                if entry.is_dir || entry.path.filename() != Some(manifest_name.as_str()) {
                    continue;
                }
                file_counter += 1;

                let data = storage.get(&entry.path).await?;
                let mut reader = RecordReader::<i64, String>::new(data)?;
                let mut start = reader.position();
                let mut counter = 0u64;

                while reader.next_record()?.is_some() {
                    if counter % per_task == per_task - 1 {
                        splits.push(InputSplit {
                            path: entry.path.clone(),
                            start,
                            length: reader.position() - start,
                        });
                        start = reader.position();
                    }
                    counter += 1;
                }

                // remaining records, including the case where the loop emitted nothing
                if start != reader.position() {
                    splits.push(InputSplit {
                        path: entry.path.clone(),
                        start,
                        length: reader.position() - start,
                    });
                }
            }
        }

        info!(splits = splits.len(), files = file_counter, "Created input splits");
        Ok(splits)
    }
}
