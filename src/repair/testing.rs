//! Scripted engine and job handles for manager tests

use async_trait::async_trait;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOptions, PutOptions, PutPayload, PutResult,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::{ComputeEngine, Counters, EngineError, JobDescriptor, JobHandle};
use crate::storage::{StorageClient, StoragePath};

#[derive(Debug, Default, Clone)]
pub(crate) struct StubState {
    pub complete: bool,
    pub successful: bool,
    pub start_time: u64,
    pub fail_status: bool,
    pub fail_kill: bool,
    pub kills: u32,
}

pub(crate) struct StubJob {
    id: String,
    name: String,
    input_paths: Vec<StoragePath>,
    output_path: StoragePath,
    pub descriptor: Option<JobDescriptor>,
    state: Mutex<StubState>,
}

impl StubJob {
    pub fn new(name: &str) -> Self {
        Self {
            id: format!("job_stub_{name}"),
            name: name.to_string(),
            input_paths: vec![StoragePath::from(format!("blockfixer/in/{name}"))],
            output_path: StoragePath::from(format!("blockfixer/out/{name}")),
            descriptor: None,
            state: Mutex::new(StubState::default()),
        }
    }

    pub fn from_descriptor(id: String, descriptor: JobDescriptor) -> Self {
        Self {
            id,
            name: descriptor.name.clone(),
            input_paths: descriptor.input_paths.clone(),
            output_path: descriptor.output_path.clone(),
            descriptor: Some(descriptor),
            state: Mutex::new(StubState::default()),
        }
    }

    pub fn without_inputs(mut self) -> Self {
        self.input_paths.clear();
        self
    }

    fn update(&self, f: impl FnOnce(&mut StubState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn state(&self) -> StubState {
        self.state.lock().unwrap().clone()
    }

    pub fn finish(&self, successful: bool) {
        self.update(|s| {
            s.complete = true;
            s.successful = successful;
        });
    }

    pub fn start(&self, at: u64) {
        self.update(|s| s.start_time = at);
    }

    pub fn fail_status_checks(&self) {
        self.update(|s| s.fail_status = true);
    }

    pub fn fail_kills(&self) {
        self.update(|s| s.fail_kill = true);
    }

    fn status_error(&self) -> EngineError {
        EngineError::Status {
            job_id: self.id.clone(),
            reason: "connection refused".to_string(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&StubState) -> T) -> Result<T, EngineError> {
        let state = self.state.lock().unwrap();
        if state.fail_status {
            return Err(self.status_error());
        }
        Ok(f(&state))
    }
}

#[async_trait]
impl JobHandle for StubJob {
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
        self.read(|s| s.complete)
    }

    async fn is_successful(&self) -> Result<bool, EngineError> {
        self.read(|s| s.successful)
    }

    async fn start_time_millis(&self) -> Result<u64, EngineError> {
        self.read(|s| s.start_time)
    }

    async fn kill(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.kills += 1;
        if state.fail_kill {
            return Err(self.status_error());
        }
        if !state.complete {
            state.complete = true;
            state.successful = false;
        }
        Ok(())
    }

    async fn counters(&self) -> Result<Counters, EngineError> {
        self.read(|_| Counters::new())
    }
}

/// Engine that records submissions and hands out [`StubJob`]s
#[derive(Default)]
pub(crate) struct StubEngine {
    jobs: Mutex<Vec<Arc<StubJob>>>,
    fail_submit: AtomicBool,
    next_seq: AtomicU64,
}

impl StubEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_submissions(&self) {
        self.fail_submit.store(true, Ordering::Relaxed);
    }

    pub fn jobs(&self) -> Vec<Arc<StubJob>> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<StubJob> {
        self.jobs.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ComputeEngine for StubEngine {
    async fn submit(&self, job: JobDescriptor) -> Result<Arc<dyn JobHandle>, EngineError> {
        if self.fail_submit.load(Ordering::Relaxed) {
            return Err(EngineError::Submit("control plane unavailable".to_string()));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let stub = Arc::new(StubJob::from_descriptor(format!("job_stub_{seq:04}"), job));
        self.jobs.lock().unwrap().push(stub.clone());
        Ok(stub)
    }
}

/// In-memory store that refuses every delete
#[derive(Debug, Default)]
pub(crate) struct UndeletableStore {
    inner: InMemory,
}

impl UndeletableStore {
    pub fn client() -> StorageClient {
        StorageClient::new(Arc::new(Self::default()))
    }
}

impl fmt::Display for UndeletableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UndeletableStore")
    }
}

#[async_trait]
impl ObjectStore for UndeletableStore {
    async fn put_opts(
        &self,
        location: &StoragePath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &StoragePath,
        opts: PutMultipartOptions,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(&self, location: &StoragePath, options: GetOptions) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, _location: &StoragePath) -> object_store::Result<()> {
        Err(object_store::Error::Generic {
            store: "UndeletableStore",
            source: "permission denied".into(),
        })
    }

    fn list(&self, prefix: Option<&StoragePath>) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&StoragePath>) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &StoragePath, to: &StoragePath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &StoragePath, to: &StoragePath) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}
