//! Shipment API Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::models::{Shipment, ShipmentMeta};

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// Tracking update payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrackingRequest {
    pub tracking_number: String,
    pub carrier: String,
    pub tracking_url: Option<String>,
}

/// Replace a shipment's tracking metadata
pub async fn update_tracking(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTrackingRequest>,
) -> AppResult<Json<Shipment>> {
    if payload.tracking_number.trim().is_empty() {
        return Err(AppError::validation("trackingNumber is required"));
    }
    if payload.carrier.trim().is_empty() {
        return Err(AppError::validation("carrier is required"));
    }

    let meta = ShipmentMeta {
        tracking_number: payload.tracking_number.trim().to_string(),
        carrier: payload.carrier.trim().to_string(),
        tracking_url: payload.tracking_url,
    };
    let shipment = state.fulfillment.update_shipment_tracking(id, &meta).await?;
    Ok(Json(shipment))
}

/// Cancel a shipment and its external fulfillment
pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    state.fulfillment.cancel_shipment(id).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}
