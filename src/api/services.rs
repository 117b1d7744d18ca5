use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use super::{
    error::ApiError,
    models::{
        CancelQuery, HealthResponse, RepairAccepted, RepairSubmission, ReportsResponse,
        TrackedRepairs,
    },
    state::AppState,
    validation::validate_submission,
};
use crate::repair::BlockRepairManager;

/// Repair submission endpoint (POST /api/repairs)
///
/// Returns 202 once the manager has processed the request. Submission
/// failures are not surfaced as errors: the manager logs them and the
/// response carries `tracked: false`.
pub async fn submit_repair(
    State(state): State<AppState>,
    payload: Result<Json<RepairSubmission>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(submission) = payload?;
    validate_submission(&submission)?;

    let RepairSubmission {
        codec_id,
        source_path,
        parity_path,
        ..
    } = &submission;

    let tracked = state
        .manager
        .lock()
        .await
        .repair(submission.kind, codec_id, source_path, parity_path)
        .await;
    let repair_key = submission.repair_key().to_string();

    Ok((
        StatusCode::ACCEPTED,
        Json(RepairAccepted {
            repair_key,
            tracked,
        }),
    ))
}

/// Tracked repair keys (GET /api/repairs)
pub async fn list_repairs(State(state): State<AppState>) -> impl IntoResponse {
    let repairs = state.manager.lock().await.tracked();
    Json(TrackedRepairs { repairs })
}

/// Poll every tracked repair (GET /api/reports)
///
/// Terminal repairs appear here exactly once and are then forgotten.
pub async fn get_reports(State(state): State<AppState>) -> impl IntoResponse {
    let reports = state.manager.lock().await.compute_reports().await;
    Json(ReportsResponse {
        generated_at: chrono::Utc::now(),
        reports,
    })
}

/// Cancel one repair (DELETE /api/repairs?path=<repair key>)
pub async fn cancel_repair(
    State(state): State<AppState>,
    query: Result<Query<CancelQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(CancelQuery { path }) = query?;
    if path.trim().is_empty() {
        return Err(ApiError::InvalidPayload("path must not be empty".to_string()));
    }

    info!(repair_key = %path, "Cancel requested");
    state.manager.lock().await.cancel(&path).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel every repair (POST /api/repairs/cancel-all)
pub async fn cancel_all(State(state): State<AppState>) -> impl IntoResponse {
    info!("Cancel-all requested");
    state.manager.lock().await.cancel_all().await;
    StatusCode::NO_CONTENT
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let tracked_repairs = state.manager.lock().await.tracked().len();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tracked_repairs,
        max_fix_time: state.config.repair.max_fix_time,
        metrics: state.metrics.snapshot(),
    })
}
