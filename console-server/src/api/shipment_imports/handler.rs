//! Shipment Import API Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::models::{EnqueueResult, JobSummary, ShipmentSelection, SweepSummary};

use crate::core::ServerState;
use crate::db::repository::import_job;
use crate::jobs::runner::SweepLimits;
use crate::utils::{AppError, AppResult};

/// Enqueue request payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub vendor_id: i64,
    pub tracking_number: String,
    pub carrier: String,
    #[serde(default)]
    pub selections: Vec<ShipmentSelection>,
}

/// Enqueue a bulk shipment registration job
pub async fn enqueue(
    State(state): State<ServerState>,
    Json(payload): Json<EnqueueRequest>,
) -> AppResult<Json<EnqueueResult>> {
    if payload.vendor_id <= 0 {
        return Err(AppError::validation("vendorId is required"));
    }
    if payload.tracking_number.trim().is_empty() {
        return Err(AppError::validation("trackingNumber is required"));
    }
    if payload.carrier.trim().is_empty() {
        return Err(AppError::validation("carrier is required"));
    }

    let job = import_job::create_job(
        &state.db,
        payload.vendor_id,
        payload.tracking_number.trim(),
        payload.carrier.trim(),
        &payload.selections,
    )
    .await?;

    tracing::info!(
        job_id = job.id,
        vendor_id = job.vendor_id,
        total = job.total_count,
        "Import job enqueued"
    );
    Ok(Json(EnqueueResult {
        job_id: job.id,
        total_count: job.total_count,
    }))
}

/// Poll a job's progress summary
pub async fn get_summary(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<JobSummary>> {
    Ok(Json(load_summary(&state, id).await?))
}

/// Advance request payload
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    pub item_limit: Option<i64>,
}

/// Poll a job and, when non-terminal, run one bounded processing slice first
///
/// Lets a client drive progress via polling without a separate scheduler.
pub async fn advance(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    payload: Option<Json<AdvanceRequest>>,
) -> AppResult<Json<JobSummary>> {
    let job = import_job::find_job(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Import job {id} not found")))?;

    if !job.status.is_terminal() {
        let item_limit = payload
            .and_then(|Json(p)| p.item_limit)
            .unwrap_or(state.config.import_item_limit);
        state.runner.process_job_by_id(id, item_limit).await?;
    }

    Ok(Json(load_summary(&state, id).await?))
}

/// Sweep request payload
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    pub job_limit: Option<i64>,
    pub item_limit: Option<i64>,
}

/// Advance any number of queued jobs (scheduler entry point)
pub async fn sweep(
    State(state): State<ServerState>,
    payload: Option<Json<SweepRequest>>,
) -> AppResult<Json<SweepSummary>> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let limits = SweepLimits::clamped(
        request.job_limit.unwrap_or(state.config.import_job_limit),
        request.item_limit.unwrap_or(state.config.import_item_limit),
    );
    let summary = state.runner.process_jobs(limits).await?;
    Ok(Json(summary))
}

async fn load_summary(state: &ServerState, job_id: i64) -> AppResult<JobSummary> {
    let job = import_job::find_job(&state.db, job_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Import job {job_id} not found")))?;
    let recent_failures = import_job::recent_failures(&state.db, job_id, 5).await?;

    Ok(JobSummary {
        job_id: job.id,
        status: job.status,
        total_count: job.total_count,
        processed_count: job.processed_count,
        error_count: job.error_count,
        last_error: job.last_error,
        recent_failures,
    })
}
