//! Distributed compute engine contracts
//!
//! The repair manager submits a [`JobDescriptor`] to a [`ComputeEngine`] and
//! afterwards only observes the returned [`JobHandle`]. Work inside a job is
//! split by [`ReconstructionInputFormat`] and executed split-by-split by
//! [`ReconstructionMapper`]. [`LocalEngine`] runs both in-process.

mod counters;
pub mod local;
pub mod splits;
pub mod task;

pub use counters::{Counter, Counters};
pub use local::{JobState, LocalEngine, LocalJob};
pub use splits::{InputSplit, ReconstructionInputFormat, SplitError};
pub use task::{FAILED_MARKER, ReconstructionMapper, TaskContext, TaskError};

use async_trait::async_trait;
use bon::Builder;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::conf::JobConf;
use crate::storage::{StorageError, StoragePath};

pub type JobId = String;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job submission failed: {0}")]
    Submit(String),

    #[error("invalid job descriptor: {0}")]
    InvalidJob(String),

    #[error("output directory already exists: {0}")]
    OutputExists(String),

    #[error("status query for job {job_id} failed: {reason}")]
    Status { job_id: JobId, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Per-record task logic a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapperClass {
    Reconstruction,
}

/// How a job's input directory is cut into splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputFormatClass {
    Reconstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputFormatClass {
    RecordSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordType {
    Long,
    Text,
}

/// Everything the engine needs to run one job
#[derive(Debug, Clone, Builder)]
pub struct JobDescriptor {
    #[builder(into)]
    pub name: String,
    pub conf: JobConf,
    pub mapper: MapperClass,
    #[builder(default)]
    pub num_reduce_tasks: u32,
    pub input_format: InputFormatClass,
    pub output_format: OutputFormatClass,
    #[builder(default = RecordType::Text)]
    pub output_key_type: RecordType,
    #[builder(default = RecordType::Text)]
    pub output_value_type: RecordType,
    pub input_paths: Vec<StoragePath>,
    pub output_path: StoragePath,
    /// Submitting principal
    #[builder(into)]
    pub user: String,
}

/// Control plane of a compute engine
#[async_trait]
pub trait ComputeEngine: Send + Sync {
    async fn submit(&self, job: JobDescriptor) -> Result<Arc<dyn JobHandle>, EngineError>;
}

/// A submitted job as seen by its submitter
///
/// Status accessors may go over the network and can fail.
#[async_trait]
pub trait JobHandle: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// Configured input directories, in submission order
    fn input_paths(&self) -> &[StoragePath];

    fn output_path(&self) -> &StoragePath;

    async fn is_complete(&self) -> Result<bool, EngineError>;

    async fn is_successful(&self) -> Result<bool, EngineError>;

    /// Wall-clock start in epoch milliseconds, 0 until the job starts running
    async fn start_time_millis(&self) -> Result<u64, EngineError>;

    /// Request termination. Returns once the request is accepted; tasks may
    /// still be winding down.
    async fn kill(&self) -> Result<(), EngineError>;

    async fn counters(&self) -> Result<Counters, EngineError>;
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
