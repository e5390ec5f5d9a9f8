//! Fulfillment-order reconciliation
//!
//! Overwrites local fulfillment metadata with the external system's current
//! snapshot. Invoked eagerly right after a shipment is registered and
//! reactively from the pending-sync retry sweep; redundant invocations are
//! harmless.

use super::{FulfillmentError, FulfillmentService};
use crate::db::repository::{order, shipment, shop, RepoError};
use crate::shopify::FulfillmentOrderSnapshot;

/// Result of a metadata sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The external order has not produced a fulfillment order yet —
    /// expected seconds-to-minutes after order creation, not an error
    Pending,
    /// A snapshot was fetched and applied
    Applied,
}

impl FulfillmentService {
    /// Sync one order's fulfillment-order metadata from the live API
    ///
    /// Resolves the local order by external id (pinned to the shop domain
    /// when given), fetches snapshots, and applies the first one.
    pub async fn sync_fulfillment_order_metadata(
        &self,
        shop_domain: Option<&str>,
        shopify_order_id: i64,
    ) -> Result<SyncOutcome, FulfillmentError> {
        let order = order::find_by_shopify_order_id(self.pool(), shopify_order_id, shop_domain)
            .await?
            .ok_or_else(|| {
                RepoError::NotFound(format!("No local order for Shopify order {shopify_order_id}"))
            })?;

        let shop = shop::find_for_order(self.pool(), order.id).await?;
        let snapshots = self
            .shopify()
            .fetch_fulfillment_orders(&shop.domain, &shop.access_token, shopify_order_id)
            .await?;

        let Some(snapshot) = snapshots.first() else {
            tracing::debug!(
                order_id = order.id,
                shopify_order_id,
                "No fulfillment order available yet"
            );
            return Ok(SyncOutcome::Pending);
        };

        self.apply_fulfillment_order_snapshot(order.id, snapshot, None)
            .await?;
        Ok(SyncOutcome::Applied)
    }

    /// Apply one snapshot onto local order / line item / pivot rows
    ///
    /// Only this function writes `orders.shopify_fo_*` and the line items'
    /// `fulfillable_quantity` / `fulfillment_order_line_item_id`. Keyed
    /// updates make re-application a no-op.
    pub async fn apply_fulfillment_order_snapshot(
        &self,
        order_id: i64,
        snapshot: &FulfillmentOrderSnapshot,
        shipment_id: Option<i64>,
    ) -> Result<(), FulfillmentError> {
        order::apply_fulfillment_order_metadata(
            self.pool(),
            order_id,
            snapshot.fulfillment_order_id,
            snapshot.status.as_deref(),
        )
        .await?;

        for line in &snapshot.line_items {
            let Some(local) = order::find_line_item_by_shopify_id(
                self.pool(),
                order_id,
                line.shopify_line_item_id,
            )
            .await?
            else {
                tracing::warn!(
                    order_id,
                    shopify_line_item_id = line.shopify_line_item_id,
                    "Snapshot references a line item with no local mirror"
                );
                continue;
            };

            order::apply_line_item_fulfillment_data(
                self.pool(),
                local.id,
                line.remaining_quantity,
                line.fulfillment_order_line_item_id,
            )
            .await?;

            if let Some(shipment_id) = shipment_id {
                shipment::upsert_pivot(
                    self.pool(),
                    shipment_id,
                    local.id,
                    Some(line.remaining_quantity),
                    Some(line.fulfillment_order_line_item_id),
                )
                .await?;
            }
        }

        tracing::debug!(
            order_id,
            fulfillment_order_id = snapshot.fulfillment_order_id,
            lines = snapshot.line_items.len(),
            "Applied fulfillment order snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{order, shipment, shop};
    use crate::db::DbService;
    use crate::shopify::{FulfillmentOrderLineItem, ShopifyFulfillmentClient};
    use std::sync::Arc;

    async fn service() -> FulfillmentService {
        let pool = DbService::in_memory().await.unwrap().pool;
        let shopify = Arc::new(ShopifyFulfillmentClient::new(reqwest::Client::new()));
        FulfillmentService::new(pool, shopify)
    }

    fn snapshot(fo_id: i64, lines: Vec<(i64, i64, i64)>) -> FulfillmentOrderSnapshot {
        FulfillmentOrderSnapshot {
            fulfillment_order_id: fo_id,
            status: Some("OPEN".into()),
            line_items: lines
                .into_iter()
                .map(|(li, fo_li, rem)| FulfillmentOrderLineItem {
                    shopify_line_item_id: li,
                    fulfillment_order_line_item_id: fo_li,
                    remaining_quantity: rem,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn snapshot_application_is_idempotent() {
        let svc = service().await;
        let pool = svc.pool().clone();

        let shop_row = shop::create(&pool, "acme.myshopify.com", "token").await.unwrap();
        let order_row = order::create(&pool, shop_row.id, 9001).await.unwrap();
        let li = order::create_line_item(&pool, order_row.id, 7, 5, 5, 42)
            .await
            .unwrap();
        let shipment_row = shipment::create(&pool, order_row.id, 7, "TRK-1", None, None, "yamato")
            .await
            .unwrap();

        let snap = snapshot(1001, vec![(42, 501, 3)]);
        svc.apply_fulfillment_order_snapshot(order_row.id, &snap, Some(shipment_row.id))
            .await
            .unwrap();
        svc.apply_fulfillment_order_snapshot(order_row.id, &snap, Some(shipment_row.id))
            .await
            .unwrap();

        let refreshed = order::find_by_id(&pool, order_row.id).await.unwrap().unwrap();
        assert_eq!(refreshed.shopify_fulfillment_order_id, Some(1001));
        assert_eq!(refreshed.shopify_fo_status.as_deref(), Some("open"));

        let li = order::find_line_item(&pool, li.id).await.unwrap().unwrap();
        assert_eq!(li.fulfillable_quantity, 3);
        assert_eq!(li.fulfillment_order_line_item_id, Some(501));

        // Exactly one pivot row survives double application
        let pivots = shipment::list_pivots(&pool, shipment_row.id).await.unwrap();
        assert_eq!(pivots.len(), 1);
        assert_eq!(pivots[0].fulfillment_order_line_item_id, Some(501));
        assert_eq!(pivots[0].quantity, Some(3));
    }

    #[tokio::test]
    async fn snapshot_skips_unknown_line_items() {
        let svc = service().await;
        let pool = svc.pool().clone();

        let shop_row = shop::create(&pool, "acme.myshopify.com", "token").await.unwrap();
        let order_row = order::create(&pool, shop_row.id, 9001).await.unwrap();

        // Line item 42 has no local mirror; application must not fail
        let snap = snapshot(1001, vec![(42, 501, 3)]);
        svc.apply_fulfillment_order_snapshot(order_row.id, &snap, None)
            .await
            .unwrap();

        let refreshed = order::find_by_id(&pool, order_row.id).await.unwrap().unwrap();
        assert_eq!(refreshed.shopify_fulfillment_order_id, Some(1001));
    }
}
