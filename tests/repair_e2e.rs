use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use blockfix::config::{Config, Millis};
use blockfix::engine::LocalEngine;
use blockfix::reconstructor::{Decoder, ReconstructError, Reconstructor, ReconstructorRegistry};
use blockfix::repair::{BlockRepairManager, JobRepairManager, Report, ReportStatus};
use blockfix::storage::{StorageClient, StoragePath};

const STALLING: &str = "tests.Stalling";

/// Never finishes within a test run
struct Stalling;

#[async_trait]
impl Reconstructor for Stalling {
    async fn process_file(&self, _: &str, _: &str, _: &Decoder) -> Result<(), ReconstructError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn process_parity_file(&self, _: &str, _: &str, _: &Decoder) -> Result<(), ReconstructError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

fn config_with_reconstructor(reconstructor: &str) -> Config {
    let mut config = Config::default();
    config.repair.reconstructor = reconstructor.to_string();
    config
}

/// Manager over in-memory storage and an in-process engine
fn build_manager(config: &Config) -> (StorageClient, JobRepairManager) {
    let storage = StorageClient::in_memory();

    let mut registry = ReconstructorRegistry::with_defaults(storage.clone());
    registry.register_instance(STALLING, Arc::new(Stalling));
    let engine = LocalEngine::new(storage.clone(), registry, 2);

    let manager = JobRepairManager::new(
        Arc::new(engine),
        storage.clone(),
        config.job_conf(),
        config.worker(),
    )
    .expect("Failed to build manager");

    (storage, manager)
}

async fn put(storage: &StorageClient, path: &str) {
    storage
        .put(&StoragePath::from(path), Bytes::from_static(b"block data"))
        .await
        .expect("Failed to write object");
}

/// Poll until `repair_key` reports a terminal status
async fn wait_for_terminal(manager: &mut JobRepairManager, repair_key: &str) -> ReportStatus {
    let poll = async {
        loop {
            let reports = manager.compute_reports().await;
            if let Some(report) = reports
                .iter()
                .find(|report| report.file_path == repair_key && report.status.is_terminal())
            {
                return report.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .expect("repair did not reach a terminal status")
}

async fn scratch_is_empty(storage: &StorageClient) -> bool {
    for dir in ["blockfixer/in", "blockfixer/out"] {
        let entries = storage.list(&StoragePath::from(dir)).await.unwrap();
        if !entries.is_empty() {
            return false;
        }
    }
    true
}

#[tokio::test]
async fn test_source_repair_finishes_and_cleans_up() {
    let config = Config::default();
    let (storage, mut manager) = build_manager(&config);
    put(&storage, "/raidrs/f/a").await;

    manager.repair_source_blocks("rs", "/f/a", "/raidrs/f/a").await;
    assert_eq!(manager.tracked(), vec!["/f/a".to_string()]);

    assert_eq!(wait_for_terminal(&mut manager, "/f/a").await, ReportStatus::Finished);

    // reported once, then forgotten
    assert!(manager.compute_reports().await.is_empty());
    assert!(scratch_is_empty(&storage).await);
    assert_eq!(manager.metrics().snapshot().repairs_finished, 1);
}

#[tokio::test]
async fn test_parity_repair_without_source_fails() {
    let config = Config::default();
    let (storage, mut manager) = build_manager(&config);

    manager.repair_parity_blocks("rs", "/f/a", "/raidrs/f/a").await;
    assert!(manager.is_tracking("/raidrs/f/a"));

    assert_eq!(
        wait_for_terminal(&mut manager, "/raidrs/f/a").await,
        ReportStatus::Failed
    );
    assert!(scratch_is_empty(&storage).await);
    assert_eq!(manager.metrics().snapshot().repairs_failed, 1);
}

#[tokio::test]
async fn test_missing_reconstructor_finishes_without_work() {
    let config = config_with_reconstructor("");
    let (storage, mut manager) = build_manager(&config);

    // nothing in storage: a reconstructor would have failed
    manager.repair_source_blocks("rs", "/f/a", "/raidrs/f/a").await;

    assert_eq!(wait_for_terminal(&mut manager, "/f/a").await, ReportStatus::Finished);
    assert!(scratch_is_empty(&storage).await);
}

#[tokio::test]
async fn test_unregistered_reconstructor_fails() {
    let config = config_with_reconstructor("com.example.Missing");
    let (_storage, mut manager) = build_manager(&config);

    manager.repair_source_blocks("rs", "/f/a", "/raidrs/f/a").await;

    assert_eq!(wait_for_terminal(&mut manager, "/f/a").await, ReportStatus::Failed);
}

#[tokio::test]
async fn test_overdue_repair_is_canceled() {
    let mut config = config_with_reconstructor(STALLING);
    config.repair.max_fix_time = Millis(1);
    let (storage, mut manager) = build_manager(&config);

    manager.repair_source_blocks("rs", "/f/a", "/raidrs/f/a").await;

    assert_eq!(wait_for_terminal(&mut manager, "/f/a").await, ReportStatus::Canceled);
    assert!(!manager.is_tracking("/f/a"));

    // killed tasks may still write output after cleanup, inputs are gone for good
    let inputs = storage.list(&StoragePath::from("blockfixer/in")).await.unwrap();
    assert!(inputs.is_empty());
}

#[tokio::test]
async fn test_unknown_codec_is_not_tracked() {
    let config = Config::default();
    let (storage, mut manager) = build_manager(&config);

    manager.repair_source_blocks("lrc", "/f/a", "/raidrs/f/a").await;

    assert!(manager.tracked().is_empty());
    assert!(manager.compute_reports().await.is_empty());
    assert!(scratch_is_empty(&storage).await);
    assert_eq!(manager.metrics().snapshot().submissions_failed, 1);
}

#[tokio::test]
async fn test_cancel_stops_tracking_and_removes_inputs() {
    let config = config_with_reconstructor(STALLING);
    let (storage, mut manager) = build_manager(&config);

    manager.repair_source_blocks("rs", "/f/a", "/raidrs/f/a").await;
    manager.repair_source_blocks("rs", "/f/b", "/raidrs/f/b").await;
    assert_eq!(manager.tracked().len(), 2);

    manager.cancel("/f/a").await;
    assert_eq!(manager.tracked(), vec!["/f/b".to_string()]);

    let reports = manager.compute_reports().await;
    assert_eq!(reports, vec![Report::new("/f/b", ReportStatus::Active)]);

    manager.cancel_all().await;
    assert!(manager.tracked().is_empty());
    assert!(manager.compute_reports().await.is_empty());

    let inputs = storage.list(&StoragePath::from("blockfixer/in")).await.unwrap();
    assert!(inputs.is_empty());
    assert_eq!(manager.metrics().snapshot().repairs_canceled, 2);
}

#[tokio::test]
async fn test_repairs_are_reported_in_key_order() {
    let config = config_with_reconstructor(STALLING);
    let (_storage, mut manager) = build_manager(&config);

    manager.repair_source_blocks("rs", "/f/c", "/raidrs/f/c").await;
    manager.repair_parity_blocks("xor", "/f/a", "/raidxor/f/a").await;
    manager.repair_source_blocks("rs", "/f/b", "/raidrs/f/b").await;

    let keys: Vec<String> = manager
        .compute_reports()
        .await
        .into_iter()
        .map(|report| report.file_path)
        .collect();
    assert_eq!(keys, vec!["/f/b", "/f/c", "/raidxor/f/a"]);

    manager.cancel_all().await;
}
