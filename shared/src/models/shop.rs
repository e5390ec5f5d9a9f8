//! Shop Model
//!
//! Per-shop Shopify connection storage. The access token is the bearer
//! credential for all outbound fulfillment API calls scoped to that shop.

use serde::{Deserialize, Serialize};

/// Shopify shop connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Shop {
    pub id: i64,
    /// Myshopify domain, e.g. `acme.myshopify.com`
    pub domain: String,
    /// Admin API access token (never serialized to clients)
    #[serde(skip_serializing)]
    pub access_token: String,
    pub created_at: i64,
    pub updated_at: i64,
}
