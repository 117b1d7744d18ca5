use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::observability::Metrics;
use crate::repair::JobRepairManager;

/// Shared handler state. Manager calls are serialized through the mutex.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<Mutex<JobRepairManager>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, manager: JobRepairManager) -> Self {
        let metrics = manager.metrics().clone();
        Self {
            config: Arc::new(config),
            manager: Arc::new(Mutex::new(manager)),
            metrics,
        }
    }
}
