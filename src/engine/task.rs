//! Per-split task logic of a reconstruction job

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::counters::{Counter, Counters};
use super::splits::SplitError;
use crate::codec::{CodecError, CodecRegistry};
use crate::conf::{ConfError, JobConf, keys};
use crate::reconstructor::{Decoder, ReconstructError, Reconstructor, ReconstructorRegistry, RegistryError};
use crate::repair::RepairKind;
use crate::storage::StorageError;

/// Output value recorded for a file whose reconstruction failed
pub const FAILED_MARKER: &str = "failed";

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("configuration error: {0}")]
    Conf(#[from] ConfError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("reconstructor error: {0}")]
    Reconstructor(#[from] RegistryError),

    #[error("split error: {0}")]
    Split(#[from] SplitError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("reconstructing {path} failed: {source}")]
    Reconstruct {
        path: String,
        #[source]
        source: ReconstructError,
    },
}

/// Per-task sink for counters, output records and progress heartbeats
#[derive(Debug, Default)]
pub struct TaskContext {
    counters: Counters,
    output: Vec<(String, String)>,
    progress: u64,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, counter: Counter, by: u64) {
        self.counters.increment(counter, by);
    }

    pub fn write(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.output.push((key.into(), value.into()));
    }

    pub fn report_progress(&mut self) {
        self.progress += 1;
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn output(&self) -> &[(String, String)] {
        &self.output
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }

    pub fn into_parts(self) -> (Counters, Vec<(String, String)>) {
        (self.counters, self.output)
    }
}

/// Repairs the files named by one split
pub struct ReconstructionMapper {
    reconstructor: Option<Arc<dyn Reconstructor>>,
    repair_kind: RepairKind,
    source_path: String,
    parity_path: String,
    decoder: Decoder,
}

impl std::fmt::Debug for ReconstructionMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconstructionMapper")
            .field("has_reconstructor", &self.reconstructor.is_some())
            .field("repair_kind", &self.repair_kind)
            .field("source_path", &self.source_path)
            .field("parity_path", &self.parity_path)
            .field("codec", &self.decoder.codec().id)
            .finish()
    }
}

impl ReconstructionMapper {
    /// Read the repair parameters from `conf` and resolve the reconstructor.
    ///
    /// A missing reconstructor key is not an error: the task then processes
    /// no records. A name that is not registered fails setup.
    pub fn setup(
        conf: &JobConf,
        registry: &ReconstructorRegistry,
        ctx: &mut TaskContext,
    ) -> Result<Self, TaskError> {
        let codecs = CodecRegistry::from_conf(conf)?;

        let repair_kind: RepairKind = conf.require_parsed(keys::REPAIR_TYPE)?;
        let source_path = conf.require(keys::SOURCE_PATH)?.to_string();
        let parity_path = conf.require(keys::PARITY_PATH)?.to_string();
        let codec = codecs.get(conf.require(keys::CODEC_ID)?)?.clone();
        let decoder = Decoder::new(conf, codec);

        let reconstructor = match conf.get(keys::RECONSTRUCTOR_CLASS) {
            Some(name) if !name.is_empty() => Some(registry.instantiate(name, conf)?),
            _ => {
                error!(
                    key = keys::RECONSTRUCTOR_CLASS,
                    "No reconstructor supplied, task will process no records"
                );
                ctx.report_progress();
                None
            }
        };

        Ok(Self {
            reconstructor,
            repair_kind,
            source_path,
            parity_path,
            decoder,
        })
    }

    pub fn repair_kind(&self) -> RepairKind {
        self.repair_kind
    }

    pub fn has_reconstructor(&self) -> bool {
        self.reconstructor.is_some()
    }

    /// Repair one manifest record. The reconstructor always receives the
    /// job-level source and parity paths; `value` is only logged and, on
    /// failure, emitted as the output key.
    pub async fn map(&self, _key: i64, value: &str, ctx: &mut TaskContext) -> Result<(), TaskError> {
        let Some(reconstructor) = &self.reconstructor else {
            return Ok(());
        };

        info!(path = value, kind = %self.repair_kind, "Reconstructing");
        let result = match self.repair_kind {
            RepairKind::Source => {
                reconstructor
                    .process_file(&self.source_path, &self.parity_path, &self.decoder)
                    .await
            }
            RepairKind::Parity => {
                reconstructor
                    .process_parity_file(&self.source_path, &self.parity_path, &self.decoder)
                    .await
            }
        };

        match result {
            Ok(()) => {
                ctx.increment(Counter::FilesSucceeded, 1);
                ctx.report_progress();
                Ok(())
            }
            Err(source) => {
                error!(path = value, error = %source, "Reconstructing file failed");
                ctx.increment(Counter::FilesFailed, 1);
                ctx.write(value, FAILED_MARKER);
                Err(TaskError::Reconstruct {
                    path: value.to_string(),
                    source,
                })
            }
        }
    }

    /// Process records in order, stopping at the first failure
    pub async fn run(&self, records: &[(i64, String)], ctx: &mut TaskContext) -> Result<(), TaskError> {
        if self.reconstructor.is_none() {
            return Ok(());
        }
        for (key, value) in records {
            self.map(*key, value, ctx).await?;
        }
        Ok(())
    }
}
