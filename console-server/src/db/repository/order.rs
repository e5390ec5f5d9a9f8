//! Order / Line Item Repository
//!
//! Local mirrors of Shopify orders. The `shopify_fo_*` columns and the line
//! items' `fulfillable_quantity` / `fulfillment_order_line_item_id` are
//! written only through `apply_fulfillment_order_metadata` /
//! `apply_line_item_fulfillment_data` (called by the reconciliation service).

use super::{RepoError, RepoResult};
use shared::models::{LineItem, Order};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

const ORDER_COLUMNS: &str = "id, shop_id, shopify_order_id, shopify_fulfillment_order_id, shopify_fo_status, created_at, updated_at";
const LINE_ITEM_COLUMNS: &str = "id, order_id, vendor_id, quantity, fulfilled_quantity, fulfillable_quantity, shopify_line_item_id, fulfillment_order_line_item_id, created_at, updated_at";

// ========== Orders ==========

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(order)
}

/// Resolve a local order by its external Shopify order id, optionally pinned
/// to a shop domain
pub async fn find_by_shopify_order_id(
    pool: &SqlitePool,
    shopify_order_id: i64,
    shop_domain: Option<&str>,
) -> RepoResult<Option<Order>> {
    let order = match shop_domain {
        Some(domain) => {
            sqlx::query_as::<_, Order>(
                "SELECT o.id, o.shop_id, o.shopify_order_id, o.shopify_fulfillment_order_id, o.shopify_fo_status, o.created_at, o.updated_at \
                 FROM orders o JOIN shop s ON s.id = o.shop_id \
                 WHERE o.shopify_order_id = ? AND s.domain = ?",
            )
            .bind(shopify_order_id)
            .bind(domain)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Order>(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE shopify_order_id = ?"
            ))
            .bind(shopify_order_id)
            .fetch_optional(pool)
            .await?
        }
    };
    Ok(order)
}

pub async fn create(pool: &SqlitePool, shop_id: i64, shopify_order_id: i64) -> RepoResult<Order> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO orders (id, shop_id, shopify_order_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(shop_id)
    .bind(shopify_order_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create order".into()))
}

/// Overwrite the order's fulfillment-order metadata from an external snapshot
///
/// Status is stored lower-cased. Last writer wins across concurrent slices.
pub async fn apply_fulfillment_order_metadata(
    pool: &SqlitePool,
    order_id: i64,
    fulfillment_order_id: i64,
    fo_status: Option<&str>,
) -> RepoResult<()> {
    let now = now_millis();
    sqlx::query(
        "UPDATE orders SET shopify_fulfillment_order_id = ?, shopify_fo_status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(fulfillment_order_id)
    .bind(fo_status.map(|s| s.to_lowercase()))
    .bind(now)
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ========== Line Items ==========

pub async fn find_line_item(pool: &SqlitePool, id: i64) -> RepoResult<Option<LineItem>> {
    let item = sqlx::query_as::<_, LineItem>(&format!(
        "SELECT {LINE_ITEM_COLUMNS} FROM line_item WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

/// Match a local line item by its external Shopify line item id within one order
pub async fn find_line_item_by_shopify_id(
    pool: &SqlitePool,
    order_id: i64,
    shopify_line_item_id: i64,
) -> RepoResult<Option<LineItem>> {
    let item = sqlx::query_as::<_, LineItem>(&format!(
        "SELECT {LINE_ITEM_COLUMNS} FROM line_item WHERE order_id = ? AND shopify_line_item_id = ?"
    ))
    .bind(order_id)
    .bind(shopify_line_item_id)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

pub async fn create_line_item(
    pool: &SqlitePool,
    order_id: i64,
    vendor_id: i64,
    quantity: i64,
    fulfillable_quantity: i64,
    shopify_line_item_id: i64,
) -> RepoResult<LineItem> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO line_item (id, order_id, vendor_id, quantity, fulfilled_quantity, fulfillable_quantity, shopify_line_item_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(order_id)
    .bind(vendor_id)
    .bind(quantity)
    .bind(fulfillable_quantity)
    .bind(shopify_line_item_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    find_line_item(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create line item".into()))
}

/// Overwrite a line item's external fulfillment data from a snapshot line
pub async fn apply_line_item_fulfillment_data(
    pool: &SqlitePool,
    line_item_id: i64,
    fulfillable_quantity: i64,
    fulfillment_order_line_item_id: i64,
) -> RepoResult<()> {
    let now = now_millis();
    sqlx::query(
        "UPDATE line_item SET fulfillable_quantity = ?, fulfillment_order_line_item_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(fulfillable_quantity)
    .bind(fulfillment_order_line_item_id)
    .bind(now)
    .bind(line_item_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Bump fulfilled_quantity after a successful external fulfillment
pub async fn add_fulfilled_quantity(
    pool: &SqlitePool,
    line_item_id: i64,
    delta: i64,
) -> RepoResult<()> {
    let now = now_millis();
    sqlx::query(
        "UPDATE line_item SET fulfilled_quantity = fulfilled_quantity + ?, \
         fulfillable_quantity = MAX(0, fulfillable_quantity - ?), updated_at = ? WHERE id = ?",
    )
    .bind(delta)
    .bind(delta)
    .bind(now)
    .bind(line_item_id)
    .execute(pool)
    .await?;
    Ok(())
}
