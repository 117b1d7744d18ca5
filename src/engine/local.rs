//! In-process compute engine
//!
//! Runs reconstruction jobs on the tokio runtime of the calling process. Each
//! submitted job gets a driver task that plans splits, fans the splits out to
//! a bounded set of task futures and records the outcome. Status is published
//! through a watch channel so handles can be polled or awaited.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::counters::Counters;
use super::splits::{InputSplit, ReconstructionInputFormat};
use super::task::{ReconstructionMapper, TaskContext, TaskError};
use super::{ComputeEngine, EngineError, JobDescriptor, JobHandle, RecordType, now_millis};
use crate::conf::JobConf;
use crate::reconstructor::ReconstructorRegistry;
use crate::records::RecordWriter;
use crate::storage::{StorageClient, StoragePath};

/// Marker object written into the output directory of a successful job
pub const SUCCESS_MARKER: &str = "_SUCCESS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Prep,
    Running,
    Succeeded,
    Failed,
    Killed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Killed)
    }
}

#[derive(Debug, Clone)]
struct JobStatus {
    state: JobState,
    start_time: u64,
    counters: Counters,
    failure: Option<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            state: JobState::Prep,
            start_time: 0,
            counters: Counters::new(),
            failure: None,
        }
    }
}

/// Part file name for the task at `index`
pub fn part_file_name(index: usize) -> String {
    format!("part-m-{index:05}")
}

pub struct LocalEngine {
    storage: StorageClient,
    registry: Arc<ReconstructorRegistry>,
    max_parallel_tasks: usize,
    input_format: ReconstructionInputFormat,
    cluster_timestamp: u64,
    next_seq: AtomicU64,
}

impl LocalEngine {
    pub fn new(
        storage: StorageClient,
        registry: ReconstructorRegistry,
        max_parallel_tasks: usize,
    ) -> Self {
        let cluster_timestamp = now_millis();
        info!(cluster_timestamp, max_parallel_tasks, "Starting local compute engine");

        Self {
            storage,
            registry: Arc::new(registry),
            max_parallel_tasks: max_parallel_tasks.max(1),
            input_format: ReconstructionInputFormat::default(),
            cluster_timestamp,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn with_input_format(mut self, input_format: ReconstructionInputFormat) -> Self {
        self.input_format = input_format;
        self
    }

    fn next_job_id(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        format!("job_{}_{:04}", self.cluster_timestamp, seq)
    }

    async fn validate(&self, job: &JobDescriptor) -> Result<(), EngineError> {
        if job.num_reduce_tasks != 0 {
            return Err(EngineError::InvalidJob(format!(
                "reconstruction jobs are map-only, got {} reducers",
                job.num_reduce_tasks
            )));
        }
        if job.input_paths.is_empty() {
            return Err(EngineError::InvalidJob("no input paths".to_string()));
        }
        if job.output_key_type != RecordType::Text || job.output_value_type != RecordType::Text {
            return Err(EngineError::InvalidJob(
                "task output must be text records".to_string(),
            ));
        }
        if self.storage.exists(&job.output_path).await?
            || self.storage.is_dir(&job.output_path).await?
        {
            return Err(EngineError::OutputExists(job.output_path.to_string()));
        }
        Ok(())
    }

    /// Submit a job and keep the concrete handle
    pub async fn launch(&self, job: JobDescriptor) -> Result<Arc<LocalJob>, EngineError> {
        self.validate(&job).await?;

        let id = self.next_job_id();
        let (status, _) = watch::channel(JobStatus::default());
        let status = Arc::new(status);

        let driver = JobDriver {
            job_id: id.clone(),
            job_name: job.name.clone(),
            input_paths: job.input_paths.clone(),
            env: TaskEnv {
                storage: self.storage.clone(),
                registry: self.registry.clone(),
                conf: Arc::new(job.conf),
                output_path: job.output_path.clone(),
            },
            input_format: self.input_format.clone(),
            max_parallel_tasks: self.max_parallel_tasks,
            status: status.clone(),
        };

        info!(job_id = %id, job_name = %job.name, user = %job.user, "Submitted job");
        let handle = tokio::spawn(driver.drive());

        Ok(Arc::new(LocalJob {
            id,
            name: job.name,
            input_paths: job.input_paths,
            output_path: job.output_path,
            status,
            driver: Mutex::new(Some(handle)),
        }))
    }
}

#[async_trait]
impl ComputeEngine for LocalEngine {
    async fn submit(&self, job: JobDescriptor) -> Result<Arc<dyn JobHandle>, EngineError> {
        let job: Arc<dyn JobHandle> = self.launch(job).await?;
        Ok(job)
    }
}

/// Handle to a job running in a [`LocalEngine`]
pub struct LocalJob {
    id: String,
    name: String,
    input_paths: Vec<StoragePath>,
    output_path: StoragePath,
    status: Arc<watch::Sender<JobStatus>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl LocalJob {
    pub fn state(&self) -> JobState {
        self.status.borrow().state
    }

    /// Reason the job failed, if it did
    pub fn failure(&self) -> Option<String> {
        self.status.borrow().failure.clone()
    }

    /// Wait until the job reaches `state` or any terminal state
    pub async fn wait_for(&self, state: JobState) -> JobState {
        let mut rx = self.status.subscribe();
        match rx
            .wait_for(|s| s.state == state || s.state.is_terminal())
            .await
        {
            Ok(status) => status.state,
            Err(_) => self.state(),
        }
    }

    pub async fn wait_for_completion(&self) -> JobState {
        self.wait_for(JobState::Succeeded).await
    }
}

#[async_trait]
impl JobHandle for LocalJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_paths(&self) -> &[StoragePath] {
        &self.input_paths
    }

    fn output_path(&self) -> &StoragePath {
        &self.output_path
    }

    async fn is_complete(&self) -> Result<bool, EngineError> {
        Ok(self.state().is_terminal())
    }

    async fn is_successful(&self) -> Result<bool, EngineError> {
        Ok(self.state() == JobState::Succeeded)
    }

    async fn start_time_millis(&self) -> Result<u64, EngineError> {
        Ok(self.status.borrow().start_time)
    }

    async fn kill(&self) -> Result<(), EngineError> {
        let killed = self.status.send_if_modified(|status| {
            if status.state.is_terminal() {
                return false;
            }
            status.state = JobState::Killed;
            true
        });
        if !killed {
            debug!(job_id = %self.id, "Job already terminal, kill ignored");
            return Ok(());
        }

        let handle = self
            .driver
            .lock()
            .map_err(|e| EngineError::Status {
                job_id: self.id.clone(),
                reason: e.to_string(),
            })?
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }

        info!(job_id = %self.id, "Killed job");
        Ok(())
    }

    async fn counters(&self) -> Result<Counters, EngineError> {
        Ok(self.status.borrow().counters.clone())
    }
}

/// Everything a task needs, shared by all tasks of one job
#[derive(Clone)]
struct TaskEnv {
    storage: StorageClient,
    registry: Arc<ReconstructorRegistry>,
    conf: Arc<JobConf>,
    output_path: StoragePath,
}

struct TaskOutcome {
    index: usize,
    counters: Counters,
    result: Result<(), String>,
}

impl TaskEnv {
    async fn run(&self, index: usize, split: InputSplit) -> TaskOutcome {
        let mut ctx = TaskContext::new();
        let mut result = self.execute(&split, &mut ctx).await;
        let (counters, output) = ctx.into_parts();

        let mut writer = RecordWriter::<String, String>::new();
        for (key, value) in &output {
            writer.append(key, value);
        }
        let part = self.output_path.child(part_file_name(index));
        if let Err(e) = self.storage.put(&part, writer.finish()).await {
            error!(%part, error = %e, "Failed to write task output");
            if result.is_ok() {
                result = Err(e.into());
            }
        }

        TaskOutcome {
            index,
            counters,
            result: result.map_err(|e| e.to_string()),
        }
    }

    async fn execute(&self, split: &InputSplit, ctx: &mut TaskContext) -> Result<(), TaskError> {
        let mapper = ReconstructionMapper::setup(&self.conf, &self.registry, ctx)?;
        let records = split.read(&self.storage).await?;
        mapper.run(&records, ctx).await
    }
}

struct JobDriver {
    job_id: String,
    job_name: String,
    input_paths: Vec<StoragePath>,
    env: TaskEnv,
    input_format: ReconstructionInputFormat,
    max_parallel_tasks: usize,
    status: Arc<watch::Sender<JobStatus>>,
}

impl JobDriver {
    async fn drive(self) {
        let started = self.status.send_if_modified(|status| {
            if status.state != JobState::Prep {
                return false;
            }
            status.state = JobState::Running;
            status.start_time = now_millis();
            true
        });
        if !started {
            return;
        }
        info!(job_id = %self.job_id, job_name = %self.job_name, "Job running");

        let (counters, result) = self.execute().await;

        self.status.send_if_modified(|status| {
            // a concurrent kill wins
            if status.state != JobState::Running {
                return false;
            }
            status.counters = counters;
            match &result {
                Ok(()) => status.state = JobState::Succeeded,
                Err(reason) => {
                    status.state = JobState::Failed;
                    status.failure = Some(reason.clone());
                }
            }
            true
        });

        match result {
            Ok(()) => info!(job_id = %self.job_id, "Job succeeded"),
            Err(reason) => warn!(job_id = %self.job_id, reason = %reason, "Job failed"),
        }
    }

    async fn execute(&self) -> (Counters, Result<(), String>) {
        let mut counters = Counters::new();

        let splits = match self
            .input_format
            .get_splits(&self.env.storage, &self.job_name, &self.input_paths)
            .await
        {
            Ok(splits) => splits,
            Err(e) => return (counters, Err(format!("split planning failed: {e}"))),
        };

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_tasks));
        let mut tasks = JoinSet::new();
        let mut failure = None;

        for (index, split) in splits.into_iter().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            };
            let env = self.env.clone();
            tasks.spawn(async move {
                let _permit = permit;
                env.run(index, split).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    counters.merge(&outcome.counters);
                    if let Err(reason) = outcome.result {
                        debug!(job_id = %self.job_id, task = outcome.index, reason = %reason, "Task failed");
                        failure.get_or_insert(format!("task {} failed: {reason}", outcome.index));
                    }
                }
                Err(e) => {
                    failure.get_or_insert(format!("task aborted: {e}"));
                }
            }
        }

        if let Some(reason) = failure {
            return (counters, Err(reason));
        }

        let marker = self.env.output_path.child(SUCCESS_MARKER);
        if let Err(e) = self.env.storage.put(&marker, bytes::Bytes::new()).await {
            return (counters, Err(format!("could not commit output: {e}")));
        }
        (counters, Ok(()))
    }
}
