//! Shipment Models (出荷)

use serde::{Deserialize, Serialize};

/// External sync state of a shipment
///
/// `Pending` means the Shopify fulfillment order has not materialized yet and
/// a retry is scheduled (`sync_pending_until`); it is not an error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum SyncStatus {
    Pending,
    Processing,
    Synced,
    Error,
    Cancelled,
}

/// Shipment record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Shipment {
    pub id: i64,
    pub order_id: i64,
    pub vendor_id: i64,
    pub tracking_number: String,
    pub tracking_company: Option<String>,
    pub tracking_url: Option<String>,
    /// Internal carrier code (yamato, sagawa, japanpost, dhl, fedex, ...)
    pub carrier: String,
    pub status: String,
    /// Shopify fulfillment id, null until created externally
    pub shopify_fulfillment_id: Option<i64>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub sync_retry_count: i64,
    /// Backoff deadline (Unix millis) for the pending-sync retry sweep
    pub sync_pending_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Shipment ↔ line item pivot
///
/// UNIQUE(shipment_id, line_item_id) keeps snapshot application idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ShipmentLineItem {
    pub id: i64,
    pub shipment_id: i64,
    pub line_item_id: i64,
    /// Explicit requested quantity; null means "whatever is fulfillable"
    pub quantity: Option<i64>,
    pub fulfillment_order_line_item_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Tracking metadata attached to a shipment at registration time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentMeta {
    pub tracking_number: String,
    pub carrier: String,
    pub tracking_url: Option<String>,
}
