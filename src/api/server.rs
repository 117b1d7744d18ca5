use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{cancel_all, cancel_repair, get_reports, health, list_repairs, submit_repair},
    state::AppState,
};
use crate::config::Config;
use crate::engine::LocalEngine;
use crate::reconstructor::ReconstructorRegistry;
use crate::repair::{BlockRepairManager, JobRepairManager};
use crate::storage::StorageClient;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Management routes over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/repairs",
            post(submit_repair).get(list_repairs).delete(cancel_repair),
        )
        .route("/api/repairs/cancel-all", post(cancel_all))
        .route("/api/reports", get(get_reports))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Repair manager over the configured storage and an in-process engine
pub fn build_manager(config: &Config) -> Result<JobRepairManager, AnyError> {
    info!(provider = ?config.storage.provider, root = %config.storage.root.display(), "Opening storage");
    let storage = StorageClient::from_config(&config.storage)?;

    let registry = ReconstructorRegistry::with_defaults(storage.clone());
    let engine = LocalEngine::new(storage.clone(), registry, config.engine.max_parallel_tasks);

    let manager =
        JobRepairManager::new(Arc::new(engine), storage, config.job_conf(), config.worker())?;
    Ok(manager)
}

pub async fn run(config: Config, address: SocketAddr) -> Result<(), AnyError> {
    let manager = build_manager(&config)?;
    let state = AppState::new(config, manager);
    let app = router(state.clone());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "blockfix API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.manager.lock().await.cancel_all().await;
    info!("In-flight repairs canceled");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
