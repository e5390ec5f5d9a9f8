//! Order and Line Item Models

use serde::{Deserialize, Serialize};

/// Local mirror of a Shopify order
///
/// `shopify_fulfillment_order_id` / `shopify_fo_status` are written only by
/// the reconciliation service; the status string is stored lower-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub shop_id: i64,
    pub shopify_order_id: i64,
    pub shopify_fulfillment_order_id: Option<i64>,
    pub shopify_fo_status: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Order line item
///
/// `fulfillable_quantity` mirrors the external "remaining to fulfill" count;
/// `fulfilled_quantity` is bumped locally after each successful fulfillment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct LineItem {
    pub id: i64,
    pub order_id: i64,
    pub vendor_id: i64,
    pub quantity: i64,
    pub fulfilled_quantity: i64,
    pub fulfillable_quantity: i64,
    pub shopify_line_item_id: i64,
    pub fulfillment_order_line_item_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
