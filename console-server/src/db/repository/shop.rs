//! Shop Repository
//!
//! Shop-scoped connection storage; resolves the bearer credential for
//! outbound fulfillment API calls.

use super::{RepoError, RepoResult};
use shared::models::Shop;
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

const SHOP_COLUMNS: &str = "id, domain, access_token, created_at, updated_at";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Shop>> {
    let shop = sqlx::query_as::<_, Shop>(&format!(
        "SELECT {SHOP_COLUMNS} FROM shop WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(shop)
}

/// Resolve the shop owning a local order
pub async fn find_for_order(pool: &SqlitePool, order_id: i64) -> RepoResult<Shop> {
    let shop = sqlx::query_as::<_, Shop>(
        "SELECT s.id, s.domain, s.access_token, s.created_at, s.updated_at \
         FROM shop s JOIN orders o ON o.shop_id = s.id WHERE o.id = ?",
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    shop.ok_or_else(|| RepoError::NotFound(format!("No shop found for order {order_id}")))
}

pub async fn create(pool: &SqlitePool, domain: &str, access_token: &str) -> RepoResult<Shop> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query("INSERT INTO shop (id, domain, access_token, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(domain)
        .bind(access_token)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create shop".into()))
}
