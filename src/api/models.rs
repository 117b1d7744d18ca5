//! Request and response bodies of the management API
//!
//! A repair submission as JSON:
//!
//! ```json
//! {
//!   "kind": "source",
//!   "codec_id": "rs",
//!   "source_path": "/warehouse/2024/part-0001",
//!   "parity_path": "/raidrs/warehouse/2024/part-0001"
//! }
//! ```
//!
//! `kind` selects which of the two files lost blocks; the repair is tracked
//! under that file's path.

use serde::{Deserialize, Serialize};

use crate::humanize::Millis;
use crate::observability::MetricsSnapshot;
use crate::repair::{RepairKind, Report};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RepairSubmission {
    pub kind: RepairKind,
    pub codec_id: String,
    pub source_path: String,
    pub parity_path: String,
}

impl RepairSubmission {
    pub fn repair_key(&self) -> &str {
        match self.kind {
            RepairKind::Source => &self.source_path,
            RepairKind::Parity => &self.parity_path,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RepairAccepted {
    pub repair_key: String,
    /// False when the job could not be started; the reason is in the server log
    pub tracked: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TrackedRepairs {
    pub repairs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReportsResponse {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub tracked_repairs: usize,
    pub max_fix_time: Millis,
    pub metrics: MetricsSnapshot,
}
