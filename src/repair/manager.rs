use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cleanup::cleanup;
use super::launcher::{RepairRequest, Worker};
use super::poller::poll;
use super::registry::RepairRegistry;
use super::{BlockRepairManager, RepairError, RepairKind, Report};
use crate::codec::CodecRegistry;
use crate::conf::{DEFAULT_MAX_FIX_TIME_FOR_FILE, JobConf, keys};
use crate::engine::{ComputeEngine, JobHandle, now_millis};
use crate::observability::Metrics;
use crate::storage::StorageClient;

/// Block repair manager running one reconstruction job per damaged file
pub struct JobRepairManager {
    engine: Arc<dyn ComputeEngine>,
    storage: StorageClient,
    base_conf: JobConf,
    codecs: CodecRegistry,
    worker: Worker,
    max_fix_time: u64,
    repairs: RepairRegistry,
    metrics: Arc<Metrics>,
}

impl JobRepairManager {
    /// Fails when the codec list or the max fix time in `base_conf` is invalid
    pub fn new(
        engine: Arc<dyn ComputeEngine>,
        storage: StorageClient,
        base_conf: JobConf,
        worker: Worker,
    ) -> Result<Self, RepairError> {
        let codecs = CodecRegistry::from_conf(&base_conf)?;
        let max_fix_time =
            base_conf.get_u64(keys::MAX_FIX_TIME_FOR_FILE, DEFAULT_MAX_FIX_TIME_FOR_FILE)?;

        info!(
            max_fix_time,
            prefix = worker.prefix(),
            codecs = codecs.ids().count(),
            "Created block repair manager"
        );

        Ok(Self {
            engine,
            storage,
            base_conf,
            codecs,
            worker,
            max_fix_time,
            repairs: RepairRegistry::new(),
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Wall-time budget of one repair in milliseconds
    pub fn max_fix_time(&self) -> u64 {
        self.max_fix_time
    }

    /// Keys of the repairs currently tracked, in order
    pub fn tracked(&self) -> Vec<String> {
        self.repairs.keys().map(str::to_string).collect()
    }

    pub fn is_tracking(&self, repair_key: &str) -> bool {
        self.repairs.contains(repair_key)
    }

    /// Submit a repair and track it, reporting why it could not be submitted
    pub async fn submit(&mut self, request: RepairRequest) -> Result<(), RepairError> {
        request.validate(&self.codecs)?;

        let job = self
            .worker
            .start_job(self.engine.as_ref(), &self.storage, &self.base_conf, &request)
            .await?;
        self.track(request.repair_key(), job);
        Ok(())
    }

    fn track(&mut self, repair_key: &str, job: Arc<dyn JobHandle>) {
        let job_id = job.id().to_string();
        if let Some(previous) = self.repairs.insert(repair_key, job) {
            warn!(
                repair_key,
                orphaned_job = previous.id(),
                job_id = %job_id,
                "Repair resubmitted, previous job is no longer tracked"
            );
            self.metrics.job_orphaned();
        }
        self.metrics.repair_submitted();
    }

    /// Submit a repair, logging and counting failures. True when this
    /// submission is the one now tracked.
    pub async fn repair(
        &mut self,
        kind: RepairKind,
        codec_id: &str,
        source_path: &str,
        parity_path: &str,
    ) -> bool {
        let request = RepairRequest::new(kind, codec_id, source_path, parity_path);
        match self.submit(request).await {
            Ok(()) => true,
            Err(e) => {
                error!(kind = %kind, source_path, parity_path, codec_id, error = %e, "Could not start repair");
                self.metrics.submission_failed();
                false
            }
        }
    }

    /// [`BlockRepairManager::compute_reports`] with an explicit clock
    pub async fn compute_reports_at(&mut self, now: u64) -> Vec<Report> {
        let mut reports = Vec::with_capacity(self.repairs.len());

        for (repair_key, job) in self.repairs.entries() {
            let status = poll(job.as_ref(), &self.storage, now, self.max_fix_time).await;
            reports.push(Report::new(repair_key, status));
        }

        for report in &reports {
            if report.status.is_terminal() {
                self.repairs.remove(&report.file_path);
                self.metrics.record_outcome(report.status);
            }
        }

        reports
    }

    /// Returns once the kill was requested, not once the job stopped
    async fn kill_and_cleanup(&self, repair_key: &str, job: &dyn JobHandle) {
        if let Err(e) = job.kill().await {
            error!(repair_key, job_id = job.id(), error = %e, "Could not kill job");
        }
        cleanup(job, &self.storage).await;
        self.metrics.repair_canceled();
    }
}

#[async_trait]
impl BlockRepairManager for JobRepairManager {
    async fn repair_source_blocks(&mut self, codec_id: &str, source_path: &str, parity_path: &str) {
        self.repair(RepairKind::Source, codec_id, source_path, parity_path).await;
    }

    async fn repair_parity_blocks(&mut self, codec_id: &str, source_path: &str, parity_path: &str) {
        self.repair(RepairKind::Parity, codec_id, source_path, parity_path).await;
    }

    async fn compute_reports(&mut self) -> Vec<Report> {
        self.compute_reports_at(now_millis()).await
    }

    async fn cancel(&mut self, repair_key: &str) {
        let Some(job) = self.repairs.remove(repair_key) else {
            debug!(repair_key, "Nothing to cancel");
            return;
        };
        info!(repair_key, job_id = job.id(), "Canceling repair");
        self.kill_and_cleanup(repair_key, job.as_ref()).await;
    }

    async fn cancel_all(&mut self) {
        let repairs = self.repairs.drain();
        info!(count = repairs.len(), "Canceling all repairs");
        for (repair_key, job) in repairs {
            self.kill_and_cleanup(&repair_key, job.as_ref()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::manifest::read_manifest;
    use crate::repair::ReportStatus;
    use crate::repair::testing::{StubEngine, StubJob, UndeletableStore};
    use crate::storage::StoragePath;
    use bytes::Bytes;

    fn base_conf(max_fix_time: u64) -> JobConf {
        let mut conf = JobConf::new();
        conf.set(keys::MAX_FIX_TIME_FOR_FILE, max_fix_time.to_string()).set(
            keys::CODECS_JSON,
            CodecRegistry::to_conf_value(&[Codec::new("rs", 10, 4), Codec::new("rs-6-3", 6, 3)]),
        );
        conf
    }

    fn manager_with(engine: &Arc<StubEngine>, storage: &StorageClient, max_fix_time: u64) -> JobRepairManager {
        JobRepairManager::new(
            engine.clone(),
            storage.clone(),
            base_conf(max_fix_time),
            Worker::corruption(Some("test.Reconstructor".to_string())),
        )
        .unwrap()
    }

    fn manager(engine: &Arc<StubEngine>) -> JobRepairManager {
        manager_with(engine, &StorageClient::in_memory(), DEFAULT_MAX_FIX_TIME_FOR_FILE)
    }

    async fn scratch_exists(storage: &StorageClient, job: &StubJob) -> bool {
        storage.is_dir(&job.input_paths()[0]).await.unwrap()
            || storage.is_dir(job.output_path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_reports_finished_and_cleans_up() {
        let engine = StubEngine::new();
        let storage = StorageClient::in_memory();
        let mut manager = manager_with(&engine, &storage, DEFAULT_MAX_FIX_TIME_FOR_FILE);

        manager.repair_source_blocks("rs-6-3", "/f/a", "/p/a").await;
        let job = engine.last();

        // staged manifest names the lost source file
        let manifest = job.input_paths()[0].child(format!("{}.in", job.name()));
        assert_eq!(read_manifest(&storage, &manifest).await.unwrap(), vec![(0, "/f/a".to_string())]);
        assert!(job.name().starts_with("a_"));

        storage
            .put(&job.output_path().child("part-m-00000"), Bytes::new())
            .await
            .unwrap();
        job.finish(true);

        let reports = manager.compute_reports().await;
        assert_eq!(reports, vec![Report::new("/f/a", ReportStatus::Finished)]);
        assert!(manager.tracked().is_empty());
        assert!(!scratch_exists(&storage, &job).await);
        assert_eq!(manager.metrics().snapshot().repairs_finished, 1);
    }

    #[tokio::test]
    async fn test_parity_failure_reports_failed() {
        let engine = StubEngine::new();
        let storage = StorageClient::in_memory();
        let mut manager = manager_with(&engine, &storage, DEFAULT_MAX_FIX_TIME_FOR_FILE);

        manager.repair_parity_blocks("rs-6-3", "/f/b", "/p/b").await;
        let job = engine.last();
        let conf = &job.descriptor.as_ref().unwrap().conf;
        assert_eq!(conf.get(keys::REPAIR_TYPE), Some("PARITY_FILE"));
        // job name and manifest derive from the source file even for parity repairs
        assert!(job.name().starts_with("b_"));
        let manifest = job.input_paths()[0].child(format!("{}.in", job.name()));
        assert_eq!(read_manifest(&storage, &manifest).await.unwrap(), vec![(0, "/f/b".to_string())]);

        job.finish(false);

        let reports = manager.compute_reports().await;
        assert_eq!(reports, vec![Report::new("/p/b", ReportStatus::Failed)]);
        assert!(manager.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_cancels_started_job() {
        let engine = StubEngine::new();
        let mut manager = manager_with(&engine, &StorageClient::in_memory(), 1000);

        manager.repair_source_blocks("rs", "/f/t", "/p/t").await;
        let job = engine.last();

        // not started yet, no timeout regardless of wall time
        assert_eq!(
            manager.compute_reports_at(5000).await,
            vec![Report::new("/f/t", ReportStatus::Active)]
        );

        job.start(5000);
        assert_eq!(
            manager.compute_reports_at(5999).await,
            vec![Report::new("/f/t", ReportStatus::Active)]
        );
        assert_eq!(
            manager.compute_reports_at(6100).await,
            vec![Report::new("/f/t", ReportStatus::Canceled)]
        );
        assert_eq!(job.state().kills, 1);
        assert!(manager.compute_reports_at(7000).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_boundary_is_inclusive() {
        let engine = StubEngine::new();
        let mut manager = manager_with(&engine, &StorageClient::in_memory(), 1000);

        manager.repair_source_blocks("rs", "/f/t", "/p/t").await;
        engine.last().start(5000);

        assert_eq!(
            manager.compute_reports_at(6000).await,
            vec![Report::new("/f/t", ReportStatus::Canceled)]
        );
    }

    #[tokio::test]
    async fn test_zero_start_time_never_cancels() {
        let engine = StubEngine::new();
        let mut manager = manager_with(&engine, &StorageClient::in_memory(), 1);

        manager.repair_source_blocks("rs", "/f/z", "/p/z").await;

        let reports = manager.compute_reports_at(u64::MAX).await;
        assert_eq!(reports, vec![Report::new("/f/z", ReportStatus::Active)]);
        assert_eq!(engine.last().state().kills, 0);
        assert!(manager.is_tracking("/f/z"));
    }

    #[tokio::test]
    async fn test_explicit_cancel() {
        let engine = StubEngine::new();
        let storage = StorageClient::in_memory();
        let mut manager = manager_with(&engine, &storage, DEFAULT_MAX_FIX_TIME_FOR_FILE);

        manager.repair_source_blocks("rs", "/f/c", "/p/c").await;
        let job = engine.last();
        assert!(scratch_exists(&storage, &job).await);

        manager.cancel("/f/c").await;

        assert!(!manager.is_tracking("/f/c"));
        assert_eq!(job.state().kills, 1);
        assert!(!scratch_exists(&storage, &job).await);
        assert!(manager.compute_reports().await.is_empty());

        // unknown keys are tolerated
        manager.cancel("/f/never").await;
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let engine = StubEngine::new();
        let mut manager = manager(&engine);

        manager.repair_source_blocks("rs", "/f/d", "/p/d").await;
        manager.repair_parity_blocks("rs", "/f/e", "/p/e").await;
        assert_eq!(manager.tracked(), vec!["/f/d", "/p/e"]);

        engine.jobs()[0].fail_kills();
        manager.cancel_all().await;

        assert!(manager.tracked().is_empty());
        assert!(engine.jobs().iter().all(|job| job.state().kills == 1));
        assert!(manager.compute_reports().await.is_empty());
    }

    #[tokio::test]
    async fn test_check_error_reports_failed() {
        let engine = StubEngine::new();
        let storage = StorageClient::in_memory();
        let mut manager = manager_with(&engine, &storage, DEFAULT_MAX_FIX_TIME_FOR_FILE);

        manager.repair_source_blocks("rs", "/f/x", "/p/x").await;
        let job = engine.last();
        job.fail_status_checks();
        job.fail_kills();

        let reports = manager.compute_reports().await;
        assert_eq!(reports, vec![Report::new("/f/x", ReportStatus::Failed)]);
        assert_eq!(job.state().kills, 1);
        assert!(!scratch_exists(&storage, &job).await);
        assert!(manager.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_kill_failure_on_timeout_reports_failed() {
        let engine = StubEngine::new();
        let mut manager = manager_with(&engine, &StorageClient::in_memory(), 1000);

        manager.repair_source_blocks("rs", "/f/k", "/p/k").await;
        let job = engine.last();
        job.start(1);
        job.fail_kills();

        let reports = manager.compute_reports_at(5000).await;
        assert_eq!(reports, vec![Report::new("/f/k", ReportStatus::Failed)]);
        assert_eq!(job.state().kills, 2);
    }

    #[tokio::test]
    async fn test_every_entry_reported_once() {
        let engine = StubEngine::new();
        let mut manager = manager(&engine);

        for name in ["a", "b", "c", "d"] {
            manager
                .repair_source_blocks("rs", &format!("/f/{name}"), &format!("/p/{name}"))
                .await;
        }
        let jobs = engine.jobs();
        jobs[0].finish(true);
        jobs[1].finish(false);
        jobs[2].fail_status_checks();

        let reports = manager.compute_reports().await;
        let statuses: Vec<_> = reports.iter().map(|r| (r.file_path.as_str(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("/f/a", ReportStatus::Finished),
                ("/f/b", ReportStatus::Failed),
                ("/f/c", ReportStatus::Failed),
                ("/f/d", ReportStatus::Active),
            ]
        );
        assert_eq!(manager.tracked(), vec!["/f/d"]);
    }

    #[tokio::test]
    async fn test_submission_failures_are_not_tracked() {
        let engine = StubEngine::new();
        let mut manager = manager(&engine);

        manager.repair_source_blocks("lrc", "/f/a", "/p/a").await;
        manager.repair_source_blocks("rs", "", "/p/a").await;
        engine.fail_submissions();
        manager.repair_source_blocks("rs", "/f/a", "/p/a").await;

        assert!(manager.tracked().is_empty());
        assert!(manager.compute_reports().await.is_empty());
        assert_eq!(manager.metrics().snapshot().submissions_failed, 3);
    }

    #[tokio::test]
    async fn test_repeat_key_orphans_previous_job() {
        let engine = StubEngine::new();
        let mut manager = manager(&engine);

        manager.repair_source_blocks("rs", "/f/a", "/p/a").await;
        manager.repair_source_blocks("rs", "/f/a", "/p/a").await;

        let jobs = engine.jobs();
        assert_eq!(jobs.len(), 2);
        assert_ne!(jobs[0].name(), jobs[1].name());
        assert_eq!(manager.tracked(), vec!["/f/a"]);
        assert_eq!(manager.metrics().snapshot().jobs_orphaned, 1);

        // only the latest job decides the report, the orphan is never killed
        jobs[1].finish(true);
        let reports = manager.compute_reports().await;
        assert_eq!(reports, vec![Report::new("/f/a", ReportStatus::Finished)]);
        assert_eq!(jobs[0].state().kills, 0);
    }

    #[test]
    fn test_rejects_invalid_max_fix_time() {
        let mut conf = JobConf::new();
        conf.set(keys::MAX_FIX_TIME_FOR_FILE, "four hours");

        let result = JobRepairManager::new(
            StubEngine::new(),
            StorageClient::in_memory(),
            conf,
            Worker::corruption(None),
        );
        assert!(matches!(result, Err(RepairError::Conf(_))));
    }

    #[test]
    fn test_default_max_fix_time() {
        let manager = JobRepairManager::new(
            StubEngine::new(),
            StorageClient::in_memory(),
            JobConf::new(),
            Worker::corruption(None),
        )
        .unwrap();
        assert_eq!(manager.max_fix_time(), 14_400_000);
    }

    #[tokio::test]
    async fn test_manifest_dir_is_removed_with_output() {
        let engine = StubEngine::new();
        let storage = StorageClient::in_memory();
        let mut manager = manager_with(&engine, &storage, DEFAULT_MAX_FIX_TIME_FOR_FILE);

        manager.repair_source_blocks("rs", "/f/m", "/p/m").await;
        let job = engine.last();
        let manifest = StoragePath::from(format!("blockfixer/in/{0}/{0}.in", job.name()));
        assert!(storage.exists(&manifest).await.unwrap());

        job.finish(true);
        manager.compute_reports().await;
        assert!(storage.list(&StoragePath::from("blockfixer")).await.unwrap().is_empty());
    }
    #[tokio::test]
    async fn test_repair_reports_whether_submission_is_tracked() {
        let engine = StubEngine::new();
        let mut manager = manager(&engine);

        assert!(manager.repair(RepairKind::Source, "rs", "/f/a", "/p/a").await);
        assert!(!manager.repair(RepairKind::Source, "lrc", "/f/a", "/p/a").await);

        // the first job still owns the key
        assert_eq!(manager.tracked(), vec!["/f/a"]);
        assert_eq!(engine.jobs().len(), 1);
        assert_eq!(manager.metrics().snapshot().submissions_failed, 1);
    }

    #[tokio::test]
    async fn test_failed_scratch_delete_still_reports_and_forgets() {
        let engine = StubEngine::new();
        let storage = UndeletableStore::client();
        let mut manager = manager_with(&engine, &storage, DEFAULT_MAX_FIX_TIME_FOR_FILE);

        manager.repair_source_blocks("rs", "/f/a", "/p/a").await;
        manager.repair_source_blocks("rs", "/f/b", "/p/b").await;
        let jobs = engine.jobs();
        storage
            .put(&jobs[0].output_path().child("part-m-00000"), Bytes::new())
            .await
            .unwrap();
        jobs[0].finish(true);

        let reports = manager.compute_reports().await;
        assert_eq!(
            reports,
            vec![
                Report::new("/f/a", ReportStatus::Finished),
                Report::new("/f/b", ReportStatus::Active),
            ]
        );
        assert_eq!(manager.tracked(), vec!["/f/b"]);
        assert!(scratch_exists(&storage, &jobs[0]).await);

        manager.cancel("/f/b").await;
        assert!(manager.tracked().is_empty());
        assert_eq!(jobs[1].state().kills, 1);
        assert!(scratch_exists(&storage, &jobs[1]).await);
        assert!(manager.compute_reports().await.is_empty());
    }
}
