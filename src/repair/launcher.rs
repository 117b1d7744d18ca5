//! Job launcher: stage the manifest, describe the job, submit it

use std::sync::Arc;
use tracing::info;

use super::{RepairError, RepairKind};
use crate::codec::CodecRegistry;
use crate::conf::{JobConf, keys};
use crate::engine::{
    ComputeEngine, InputFormatClass, JobDescriptor, JobHandle, MapperClass, OutputFormatClass,
    RecordType,
};
use crate::manifest::write_manifest;
use crate::storage::{StorageClient, StoragePath};

/// Principal repair jobs are submitted as
pub const JOB_USER: &str = "erasure_coding";

/// Scratch prefix of the corruption worker
pub const CORRUPTION_PREFIX: &str = "blockfixer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairRequest {
    pub kind: RepairKind,
    pub codec_id: String,
    pub source_path: String,
    pub parity_path: String,
}

impl RepairRequest {
    pub fn new(
        kind: RepairKind,
        codec_id: impl Into<String>,
        source_path: impl Into<String>,
        parity_path: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            codec_id: codec_id.into(),
            source_path: source_path.into(),
            parity_path: parity_path.into(),
        }
    }

    /// Path the repair is tracked under
    pub fn repair_key(&self) -> &str {
        match self.kind {
            RepairKind::Source => &self.source_path,
            RepairKind::Parity => &self.parity_path,
        }
    }

    /// Object named in the manifest. Always the source file: the job conf
    /// says which of the pair is lost, the manifest only drives one map task.
    pub fn manifest_entry(&self) -> &str {
        &self.source_path
    }

    pub fn validate(&self, codecs: &CodecRegistry) -> Result<(), RepairError> {
        for (field, value) in [
            ("codec_id", &self.codec_id),
            ("source_path", &self.source_path),
            ("parity_path", &self.parity_path),
        ] {
            if value.trim().is_empty() {
                return Err(RepairError::InvalidRequest(format!("{field} is empty")));
            }
        }
        codecs.get(&self.codec_id)?;
        Ok(())
    }
}

/// `<leaf>_<128-bit random hex>` for the object at `path`
pub fn unique_job_name(path: &str) -> String {
    let leaf = path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("root");
    format!("{leaf}_{}", uuid::Uuid::new_v4().simple())
}

/// Scratch directories of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDirs {
    pub in_dir: StoragePath,
    pub out_dir: StoragePath,
}

/// Submits repair jobs under one scratch prefix
#[derive(Debug, Clone)]
pub struct Worker {
    prefix: String,
    job_user: String,
    reconstructor: Option<String>,
}

impl Worker {
    pub fn new(
        prefix: impl Into<String>,
        job_user: impl Into<String>,
        reconstructor: Option<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            job_user: job_user.into(),
            reconstructor,
        }
    }

    /// Worker for corrupt-block repairs with the default prefix and user
    pub fn corruption(reconstructor: Option<String>) -> Self {
        Self::new(CORRUPTION_PREFIX, JOB_USER, reconstructor)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn job_dirs(&self, job_name: &str) -> JobDirs {
        let prefix = StoragePath::from(self.prefix.as_str());
        JobDirs {
            in_dir: prefix.child("in").child(job_name),
            out_dir: prefix.child("out").child(job_name),
        }
    }

    /// Tag the submitting principal and, when configured, the reconstructor
    pub fn configure_job(&self, conf: &mut JobConf) {
        conf.set(keys::JOB_USER, self.job_user.as_str());
        if let Some(reconstructor) = &self.reconstructor {
            conf.set(keys::RECONSTRUCTOR_CLASS, reconstructor.as_str());
        }
    }

    pub fn build_descriptor(
        &self,
        base: &JobConf,
        request: &RepairRequest,
        job_name: &str,
        dirs: &JobDirs,
    ) -> JobDescriptor {
        let mut conf = JobConf::layered(base);
        conf.set(keys::REPAIR_TYPE, request.kind.as_str())
            .set(keys::SOURCE_PATH, request.source_path.as_str())
            .set(keys::PARITY_PATH, request.parity_path.as_str())
            .set(keys::CODEC_ID, request.codec_id.as_str());
        self.configure_job(&mut conf);

        JobDescriptor::builder()
            .name(job_name)
            .conf(conf)
            .mapper(MapperClass::Reconstruction)
            .num_reduce_tasks(0)
            .input_format(InputFormatClass::Reconstruction)
            .output_format(OutputFormatClass::RecordSequence)
            .output_key_type(RecordType::Text)
            .output_value_type(RecordType::Text)
            .input_paths(vec![dirs.in_dir.clone()])
            .output_path(dirs.out_dir.clone())
            .user(self.job_user.as_str())
            .build()
    }

    /// Stage the manifest and submit a job for `request`
    pub async fn start_job(
        &self,
        engine: &dyn ComputeEngine,
        storage: &StorageClient,
        base: &JobConf,
        request: &RepairRequest,
    ) -> Result<Arc<dyn JobHandle>, RepairError> {
        let job_name = unique_job_name(&request.source_path);
        let dirs = self.job_dirs(&job_name);

        write_manifest(storage, &job_name, &dirs.in_dir, request.manifest_entry()).await?;

        let descriptor = self.build_descriptor(base, request, &job_name, &dirs);
        info!(job_name = %job_name, repair_key = request.repair_key(), "Submitting job");

        let job = engine.submit(descriptor).await?;
        info!(job_id = job.id(), job_name = job.name(), "Job started");
        Ok(job)
    }
}
