//! Shipment Repository
//!
//! Shipment rows plus the shipment↔line-item pivot. The pivot upsert is keyed
//! on (shipment_id, line_item_id) so repeated snapshot application stays
//! idempotent.

use super::{RepoError, RepoResult};
use shared::models::{Shipment, ShipmentLineItem, SyncStatus};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

const SHIPMENT_COLUMNS: &str = "id, order_id, vendor_id, tracking_number, tracking_company, tracking_url, carrier, status, shopify_fulfillment_id, sync_status, sync_error, sync_retry_count, sync_pending_until, created_at, updated_at";
const PIVOT_COLUMNS: &str = "id, shipment_id, line_item_id, quantity, fulfillment_order_line_item_id, created_at, updated_at";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Shipment>> {
    let shipment = sqlx::query_as::<_, Shipment>(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipment WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(shipment)
}

pub async fn create(
    pool: &SqlitePool,
    order_id: i64,
    vendor_id: i64,
    tracking_number: &str,
    tracking_company: Option<&str>,
    tracking_url: Option<&str>,
    carrier: &str,
) -> RepoResult<Shipment> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO shipment (id, order_id, vendor_id, tracking_number, tracking_company, tracking_url, carrier, status, sync_status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 'created', 'processing', ?, ?)",
    )
    .bind(id)
    .bind(order_id)
    .bind(vendor_id)
    .bind(tracking_number)
    .bind(tracking_company)
    .bind(tracking_url)
    .bind(carrier)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create shipment".into()))
}

/// Upsert a pivot row, keyed on (shipment, line item)
///
/// An explicit quantity already on the pivot wins over a later snapshot
/// value; the FO line item id always takes the freshest non-null value.
/// Repeated application converges to the same row.
pub async fn upsert_pivot(
    pool: &SqlitePool,
    shipment_id: i64,
    line_item_id: i64,
    quantity: Option<i64>,
    fulfillment_order_line_item_id: Option<i64>,
) -> RepoResult<()> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO shipment_line_item (id, shipment_id, line_item_id, quantity, fulfillment_order_line_item_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(shipment_id, line_item_id) DO UPDATE SET \
             quantity = COALESCE(quantity, excluded.quantity), \
             fulfillment_order_line_item_id = COALESCE(excluded.fulfillment_order_line_item_id, fulfillment_order_line_item_id), \
             updated_at = excluded.updated_at",
    )
    .bind(id)
    .bind(shipment_id)
    .bind(line_item_id)
    .bind(quantity)
    .bind(fulfillment_order_line_item_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_pivots(pool: &SqlitePool, shipment_id: i64) -> RepoResult<Vec<ShipmentLineItem>> {
    let pivots = sqlx::query_as::<_, ShipmentLineItem>(&format!(
        "SELECT {PIVOT_COLUMNS} FROM shipment_line_item WHERE shipment_id = ? ORDER BY id ASC"
    ))
    .bind(shipment_id)
    .fetch_all(pool)
    .await?;
    Ok(pivots)
}

/// Stamp the external fulfillment id and mark the shipment synced
pub async fn mark_synced(
    pool: &SqlitePool,
    shipment_id: i64,
    shopify_fulfillment_id: i64,
) -> RepoResult<()> {
    let now = now_millis();
    sqlx::query(
        "UPDATE shipment SET shopify_fulfillment_id = ?, sync_status = 'synced', sync_error = NULL, sync_pending_until = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(shopify_fulfillment_id)
    .bind(now)
    .bind(shipment_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Defer the sync: the fulfillment order has not materialized yet
///
/// Arms `sync_pending_until` with the supplied deadline and bumps the retry
/// counter. Not an error state.
pub async fn mark_sync_pending(
    pool: &SqlitePool,
    shipment_id: i64,
    pending_until: i64,
) -> RepoResult<()> {
    let now = now_millis();
    sqlx::query(
        "UPDATE shipment SET sync_status = 'pending', sync_error = NULL, sync_pending_until = ?, sync_retry_count = sync_retry_count + 1, updated_at = ? WHERE id = ?",
    )
    .bind(pending_until)
    .bind(now)
    .bind(shipment_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_sync_error(
    pool: &SqlitePool,
    shipment_id: i64,
    error: &str,
) -> RepoResult<()> {
    let now = now_millis();
    sqlx::query(
        "UPDATE shipment SET sync_status = 'error', sync_error = ?, sync_pending_until = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(error)
    .bind(now)
    .bind(shipment_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace a shipment's tracking metadata
pub async fn update_tracking(
    pool: &SqlitePool,
    shipment_id: i64,
    tracking_number: &str,
    tracking_company: Option<&str>,
    tracking_url: Option<&str>,
    carrier: &str,
) -> RepoResult<()> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE shipment SET tracking_number = ?, tracking_company = ?, tracking_url = ?, carrier = ?, updated_at = ? WHERE id = ?",
    )
    .bind(tracking_number)
    .bind(tracking_company)
    .bind(tracking_url)
    .bind(carrier)
    .bind(now)
    .bind(shipment_id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Shipment {shipment_id} not found")));
    }
    Ok(())
}

pub async fn mark_cancelled(pool: &SqlitePool, shipment_id: i64) -> RepoResult<()> {
    let now = now_millis();
    sqlx::query(
        "UPDATE shipment SET sync_status = 'cancelled', status = 'cancelled', updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(shipment_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Shipments whose deferred sync is due for another attempt
pub async fn list_due_pending_syncs(
    pool: &SqlitePool,
    now: i64,
    limit: i64,
) -> RepoResult<Vec<Shipment>> {
    let shipments = sqlx::query_as::<_, Shipment>(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipment \
         WHERE sync_status = ? AND sync_pending_until IS NOT NULL AND sync_pending_until <= ? \
         ORDER BY sync_pending_until ASC LIMIT ?"
    ))
    .bind(SyncStatus::Pending)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(shipments)
}
