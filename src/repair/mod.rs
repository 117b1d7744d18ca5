//! Repair-job orchestration
//!
//! A repair stages a one-record manifest, submits a reconstruction job and is
//! tracked by the path under repair until a report call observes it in a
//! terminal state. See [`JobRepairManager`] for the management surface.

pub mod cleanup;
pub mod launcher;
mod manager;
pub mod poller;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use launcher::{CORRUPTION_PREFIX, JOB_USER, JobDirs, RepairRequest, Worker, unique_job_name};
pub use manager::JobRepairManager;
pub use registry::RepairRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::codec::CodecError;
use crate::conf::ConfError;
use crate::engine::EngineError;
use crate::manifest::ManifestError;

/// Which half of an erasure-coded pair lost blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairKind {
    Source,
    Parity,
}

impl RepairKind {
    /// Value carried in the `repair_type` job configuration key
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairKind::Source => "SOURCE_FILE",
            RepairKind::Parity => "PARITY_FILE",
        }
    }
}

impl fmt::Display for RepairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown repair type: {0}")]
pub struct ParseRepairKindError(String);

impl FromStr for RepairKind {
    type Err = ParseRepairKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOURCE_FILE" => Ok(RepairKind::Source),
            "PARITY_FILE" => Ok(RepairKind::Parity),
            other => Err(ParseRepairKindError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Active,
    Finished,
    Failed,
    Canceled,
}

impl ReportStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReportStatus::Active)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportStatus::Active => "ACTIVE",
            ReportStatus::Finished => "FINISHED",
            ReportStatus::Failed => "FAILED",
            ReportStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Status of one tracked repair, keyed by the path under repair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub file_path: String,
    pub status: ReportStatus,
}

impl Report {
    pub fn new(file_path: impl Into<String>, status: ReportStatus) -> Self {
        Self {
            file_path: file_path.into(),
            status,
        }
    }
}

/// Why a repair could not be submitted
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("invalid repair request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Conf(#[from] ConfError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("could not stage manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Management surface of a block repair manager
///
/// None of these operations fail: submission errors are logged and the repair
/// is simply not tracked, status check errors surface as `FAILED` reports.
/// Calls must be serialized by the caller.
#[async_trait]
pub trait BlockRepairManager: Send {
    /// Rebuild lost data blocks of `source_path`. Tracked under `source_path`.
    async fn repair_source_blocks(&mut self, codec_id: &str, source_path: &str, parity_path: &str);

    /// Rebuild lost parity blocks of `parity_path`. Tracked under `parity_path`.
    async fn repair_parity_blocks(&mut self, codec_id: &str, source_path: &str, parity_path: &str);

    /// One report per tracked repair; terminal repairs are forgotten afterwards
    async fn compute_reports(&mut self) -> Vec<Report>;

    /// Stop tracking `repair_key`, kill its job and delete its scratch dirs.
    ///
    /// The kill is a request: tasks still winding down may write output after
    /// the cleanup ran. Unknown keys are ignored.
    async fn cancel(&mut self, repair_key: &str);

    /// [`cancel`](Self::cancel) every tracked repair
    async fn cancel_all(&mut self);
}
