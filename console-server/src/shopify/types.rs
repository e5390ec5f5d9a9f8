//! Typed payloads for the fulfillment API
//!
//! Wire shapes are deserialized at the boundary and converted into the
//! snapshot types the rest of the engine works with; untyped JSON never
//! crosses into the core.

use serde::{Deserialize, Serialize};

/// Live view of one external fulfillment order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOrderSnapshot {
    pub fulfillment_order_id: i64,
    pub status: Option<String>,
    pub line_items: Vec<FulfillmentOrderLineItem>,
}

/// One (line item, FO line item, remaining) triple within a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOrderLineItem {
    pub shopify_line_item_id: i64,
    pub fulfillment_order_line_item_id: i64,
    pub remaining_quantity: i64,
}

impl FulfillmentOrderSnapshot {
    /// Find the snapshot line matching an external line item id
    pub fn line_for(&self, shopify_line_item_id: i64) -> Option<&FulfillmentOrderLineItem> {
        self.line_items
            .iter()
            .find(|l| l.shopify_line_item_id == shopify_line_item_id)
    }
}

/// Request payload for creating a fulfillment
#[derive(Debug, Clone)]
pub struct NewFulfillment {
    pub fulfillment_order_id: i64,
    pub lines: Vec<FulfillmentLine>,
    pub tracking: Option<TrackingInfo>,
    pub notify_customer: bool,
}

#[derive(Debug, Clone)]
pub struct FulfillmentLine {
    pub fulfillment_order_line_item_id: i64,
    pub quantity: i64,
}

/// Tracking metadata as the external API expects it
#[derive(Debug, Clone, Serialize)]
pub struct TrackingInfo {
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ========== Wire shapes (deserialization only) ==========

#[derive(Debug, Deserialize)]
pub(crate) struct FulfillmentOrdersResponse {
    #[serde(default)]
    pub fulfillment_orders: Vec<WireFulfillmentOrder>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFulfillmentOrder {
    pub id: i64,
    pub status: Option<String>,
    #[serde(default)]
    pub line_items: Vec<WireFulfillmentOrderLineItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFulfillmentOrderLineItem {
    /// Fulfillment-order line item id
    pub id: i64,
    /// The order line item this entry fulfills
    pub line_item_id: i64,
    #[serde(default)]
    pub fulfillable_quantity: i64,
}

impl From<WireFulfillmentOrder> for FulfillmentOrderSnapshot {
    fn from(wire: WireFulfillmentOrder) -> Self {
        FulfillmentOrderSnapshot {
            fulfillment_order_id: wire.id,
            status: wire.status,
            line_items: wire
                .line_items
                .into_iter()
                .map(|l| FulfillmentOrderLineItem {
                    shopify_line_item_id: l.line_item_id,
                    fulfillment_order_line_item_id: l.id,
                    remaining_quantity: l.fulfillable_quantity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FulfillmentResponse {
    pub fulfillment: Option<WireFulfillment>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFulfillment {
    pub id: Option<i64>,
}
