//! Shipment batch preparation and registration
//!
//! Preparation resolves quantities from current local state only, so a
//! re-run after a crash plans the same work. Registration creates the local
//! shipment, reconciles against the live snapshot, and drives the external
//! fulfillment creation.

use super::{FulfillmentError, FulfillmentService};
use crate::db::repository::{order, shipment, shop, RepoError};
use crate::shopify::{
    carrier, FulfillmentLine, FulfillmentOrderSnapshot, NewFulfillment, TrackingInfo,
};
use shared::models::{LineItem, Order, Shipment, ShipmentMeta};
use shared::util::now_millis;

/// First deferral when the fulfillment order is not available yet
const SYNC_BACKOFF_BASE_MS: i64 = 5 * 60 * 1000;
/// Cap on the deferral interval
const SYNC_BACKOFF_CAP_MS: i64 = 60 * 60 * 1000;
/// Ceiling on deferred-sync attempts before the shipment is marked stuck
const MAX_SYNC_RETRIES: i64 = 12;

const FO_UNAVAILABLE_ERROR: &str = "fulfillment order never became available";

/// One line item selected for a shipment batch
#[derive(Debug, Clone)]
pub struct ShipmentBatchSelection {
    pub line_item_id: i64,
    /// Explicit requested quantity; None means "whatever is fulfillable"
    pub quantity: Option<i64>,
}

/// Actionable registration plan for one order
#[derive(Debug)]
pub struct ShipmentPlan {
    pub order: Order,
    pub lines: Vec<PlannedLine>,
}

#[derive(Debug)]
pub struct PlannedLine {
    pub line_item: LineItem,
    pub explicit_quantity: Option<i64>,
    pub planned_quantity: i64,
}

/// Deadline for the next deferred-sync attempt: doubling from 5 minutes,
/// capped at one hour
fn pending_backoff_deadline(now: i64, retry_count: i64) -> i64 {
    let exp = retry_count.clamp(0, 30) as u32;
    let delay = SYNC_BACKOFF_BASE_MS
        .saturating_mul(1i64 << exp.min(20))
        .min(SYNC_BACKOFF_CAP_MS);
    now + delay
}

/// Resolve the quantity to request externally for one line
///
/// Precedence: explicit positive quantity clipped to the FO's remaining;
/// else the FO's remaining when positive; else the locally cached
/// fulfillable quantity; else the full ordered quantity. Never requests more
/// than the external system currently considers fulfillable for the line.
fn resolve_fulfillment_quantity(
    explicit: Option<i64>,
    fo_remaining: Option<i64>,
    cached_fulfillable: i64,
    ordered_quantity: i64,
) -> i64 {
    if let Some(q) = explicit.filter(|q| *q > 0) {
        return match fo_remaining {
            Some(remaining) => q.min(remaining),
            None => q,
        };
    }
    if let Some(remaining) = fo_remaining.filter(|r| *r > 0) {
        return remaining;
    }
    if cached_fulfillable > 0 {
        return cached_fulfillable;
    }
    ordered_quantity
}

impl FulfillmentService {
    /// Build a registration plan for one order from current local state
    ///
    /// Selections referencing unknown or foreign line items are dropped;
    /// lines resolving to zero quantity are dropped. `None` means there is
    /// nothing actionable to register.
    pub async fn prepare_shipment_batch(
        &self,
        order_id: i64,
        selections: &[ShipmentBatchSelection],
    ) -> Result<Option<ShipmentPlan>, FulfillmentError> {
        let Some(order_row) = order::find_by_id(self.pool(), order_id).await? else {
            return Ok(None);
        };

        let mut lines = Vec::new();
        for sel in selections {
            let Some(li) = order::find_line_item(self.pool(), sel.line_item_id).await? else {
                continue;
            };
            if li.order_id != order_id {
                continue;
            }
            let explicit = sel.quantity.filter(|q| *q > 0);
            let planned = explicit.unwrap_or(if li.fulfillable_quantity > 0 {
                li.fulfillable_quantity
            } else {
                li.quantity
            });
            if planned <= 0 {
                continue;
            }
            lines.push(PlannedLine {
                line_item: li,
                explicit_quantity: explicit,
                planned_quantity: planned,
            });
        }

        if lines.is_empty() {
            return Ok(None);
        }
        Ok(Some(ShipmentPlan {
            order: order_row,
            lines,
        }))
    }

    /// Register one shipment: local rows, snapshot reconciliation, external
    /// fulfillment creation
    ///
    /// When the fulfillment order has not materialized yet, the shipment is
    /// parked in `sync_status='pending'` with a backoff deadline and the
    /// registration still counts as processed — the retry sweep finishes the
    /// external half later.
    pub async fn register_shipment(
        &self,
        vendor_id: i64,
        plan: &ShipmentPlan,
        meta: &ShipmentMeta,
    ) -> Result<Shipment, FulfillmentError> {
        let tracking_company = carrier::tracking_company_for(&meta.carrier);
        let shipment_row = shipment::create(
            self.pool(),
            plan.order.id,
            vendor_id,
            &meta.tracking_number,
            Some(&tracking_company),
            meta.tracking_url.as_deref(),
            &meta.carrier,
        )
        .await?;
        for line in &plan.lines {
            shipment::upsert_pivot(
                self.pool(),
                shipment_row.id,
                line.line_item.id,
                line.explicit_quantity,
                None,
            )
            .await?;
        }

        let shop_row = shop::find_for_order(self.pool(), plan.order.id).await?;
        let snapshots = match self
            .shopify()
            .fetch_fulfillment_orders(
                &shop_row.domain,
                &shop_row.access_token,
                plan.order.shopify_order_id,
            )
            .await
        {
            Ok(snapshots) => snapshots,
            Err(e) => {
                shipment::mark_sync_error(self.pool(), shipment_row.id, &e.to_string()).await?;
                return Err(e.into());
            }
        };

        let Some(snapshot) = snapshots.first() else {
            let deadline = pending_backoff_deadline(now_millis(), shipment_row.sync_retry_count);
            shipment::mark_sync_pending(self.pool(), shipment_row.id, deadline).await?;
            tracing::info!(
                shipment_id = shipment_row.id,
                order_id = plan.order.id,
                deadline,
                "Fulfillment order not available yet, deferring sync"
            );
            return self.refreshed_shipment(shipment_row.id).await;
        };

        self.apply_fulfillment_order_snapshot(plan.order.id, snapshot, Some(shipment_row.id))
            .await?;

        let tracking = TrackingInfo {
            number: meta.tracking_number.clone(),
            company: Some(tracking_company),
            url: meta.tracking_url.clone(),
        };
        let lines = plan_fulfillment_lines(&plan.lines, snapshot);
        if lines.is_empty() {
            shipment::mark_sync_error(self.pool(), shipment_row.id, "no fulfillable line items found")
                .await?;
            return Err(FulfillmentError::NoFulfillableLines);
        }

        match self
            .create_external_fulfillment(
                &shop_row.domain,
                &shop_row.access_token,
                snapshot.fulfillment_order_id,
                shipment_row.id,
                &lines,
                tracking,
            )
            .await
        {
            Ok(()) => self.refreshed_shipment(shipment_row.id).await,
            Err(e) => {
                shipment::mark_sync_error(self.pool(), shipment_row.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Replace a shipment's tracking metadata, locally and externally
    ///
    /// The external tracking update is idempotent, so repeating this call
    /// with the same tracking number is safe.
    pub async fn update_shipment_tracking(
        &self,
        shipment_id: i64,
        meta: &ShipmentMeta,
    ) -> Result<Shipment, FulfillmentError> {
        let shipment_row = shipment::find_by_id(self.pool(), shipment_id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("Shipment {shipment_id} not found")))?;

        let tracking_company = carrier::tracking_company_for(&meta.carrier);
        shipment::update_tracking(
            self.pool(),
            shipment_id,
            &meta.tracking_number,
            Some(&tracking_company),
            meta.tracking_url.as_deref(),
            &meta.carrier,
        )
        .await?;

        if let Some(fulfillment_id) = shipment_row.shopify_fulfillment_id {
            let shop_row = shop::find_for_order(self.pool(), shipment_row.order_id).await?;
            let tracking = TrackingInfo {
                number: meta.tracking_number.clone(),
                company: Some(tracking_company),
                url: meta.tracking_url.clone(),
            };
            self.shopify()
                .update_tracking(
                    &shop_row.domain,
                    &shop_row.access_token,
                    fulfillment_id,
                    &tracking,
                )
                .await?;
        }
        self.refreshed_shipment(shipment_id).await
    }

    /// Cancel a shipment, including its external fulfillment when one exists
    pub async fn cancel_shipment(&self, shipment_id: i64) -> Result<(), FulfillmentError> {
        let shipment_row = shipment::find_by_id(self.pool(), shipment_id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("Shipment {shipment_id} not found")))?;

        if let Some(fulfillment_id) = shipment_row.shopify_fulfillment_id {
            let shop_row = shop::find_for_order(self.pool(), shipment_row.order_id).await?;
            self.shopify()
                .cancel_fulfillment(&shop_row.domain, &shop_row.access_token, fulfillment_id)
                .await?;
        }
        shipment::mark_cancelled(self.pool(), shipment_id).await?;
        tracing::info!(shipment_id, "Shipment cancelled");
        Ok(())
    }

    /// Reactive half of registration: shipments parked in `pending` whose
    /// backoff deadline has passed
    ///
    /// Returns how many shipments reached `synced` this sweep.
    pub async fn retry_pending_shipment_syncs(
        &self,
        limit: i64,
    ) -> Result<usize, FulfillmentError> {
        let due = shipment::list_due_pending_syncs(self.pool(), now_millis(), limit).await?;
        let mut synced = 0;
        for shipment_row in due {
            match self.retry_shipment_sync(&shipment_row).await {
                Ok(true) => synced += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        shipment_id = shipment_row.id,
                        error = %e,
                        "Deferred sync attempt failed, re-arming backoff"
                    );
                    if shipment_row.sync_retry_count >= MAX_SYNC_RETRIES {
                        shipment::mark_sync_error(self.pool(), shipment_row.id, &e.to_string())
                            .await?;
                    } else {
                        let deadline = pending_backoff_deadline(
                            now_millis(),
                            shipment_row.sync_retry_count,
                        );
                        shipment::mark_sync_pending(self.pool(), shipment_row.id, deadline)
                            .await?;
                    }
                }
            }
        }
        Ok(synced)
    }

    async fn retry_shipment_sync(
        &self,
        shipment_row: &Shipment,
    ) -> Result<bool, FulfillmentError> {
        let order_row = order::find_by_id(self.pool(), shipment_row.order_id)
            .await?
            .ok_or_else(|| {
                RepoError::NotFound(format!("Order {} not found", shipment_row.order_id))
            })?;
        let shop_row = shop::find_for_order(self.pool(), order_row.id).await?;

        let snapshots = self
            .shopify()
            .fetch_fulfillment_orders(
                &shop_row.domain,
                &shop_row.access_token,
                order_row.shopify_order_id,
            )
            .await?;

        let Some(snapshot) = snapshots.first() else {
            if shipment_row.sync_retry_count >= MAX_SYNC_RETRIES {
                tracing::error!(
                    shipment_id = shipment_row.id,
                    retries = shipment_row.sync_retry_count,
                    "Giving up on deferred sync"
                );
                shipment::mark_sync_error(self.pool(), shipment_row.id, FO_UNAVAILABLE_ERROR)
                    .await?;
            } else {
                let deadline =
                    pending_backoff_deadline(now_millis(), shipment_row.sync_retry_count);
                shipment::mark_sync_pending(self.pool(), shipment_row.id, deadline).await?;
            }
            return Ok(false);
        };

        self.apply_fulfillment_order_snapshot(order_row.id, snapshot, Some(shipment_row.id))
            .await?;

        // Rebuild planned lines from the persisted pivots
        let mut planned = Vec::new();
        for pivot in shipment::list_pivots(self.pool(), shipment_row.id).await? {
            let Some(li) = order::find_line_item(self.pool(), pivot.line_item_id).await? else {
                continue;
            };
            planned.push(PlannedLine {
                explicit_quantity: pivot.quantity.filter(|q| *q > 0),
                planned_quantity: 0, // resolved against the snapshot below
                line_item: li,
            });
        }

        let lines = plan_fulfillment_lines(&planned, snapshot);
        if lines.is_empty() {
            shipment::mark_sync_error(
                self.pool(),
                shipment_row.id,
                "no fulfillable line items found",
            )
            .await?;
            return Ok(false);
        }

        let tracking = TrackingInfo {
            number: shipment_row.tracking_number.clone(),
            company: shipment_row.tracking_company.clone(),
            url: shipment_row.tracking_url.clone(),
        };
        self.create_external_fulfillment(
            &shop_row.domain,
            &shop_row.access_token,
            snapshot.fulfillment_order_id,
            shipment_row.id,
            &lines,
            tracking,
        )
        .await?;
        Ok(true)
    }

    /// Create the fulfillment externally, stamp the id, bump local counters
    async fn create_external_fulfillment(
        &self,
        shop_domain: &str,
        token: &str,
        fulfillment_order_id: i64,
        shipment_id: i64,
        lines: &[(i64, FulfillmentLine)],
        tracking: TrackingInfo,
    ) -> Result<(), FulfillmentError> {
        let fulfillment = NewFulfillment {
            fulfillment_order_id,
            lines: lines.iter().map(|(_, l)| l.clone()).collect(),
            tracking: Some(tracking),
            notify_customer: false,
        };
        let fulfillment_id = self
            .shopify()
            .create_fulfillment(shop_domain, token, &fulfillment)
            .await?;

        shipment::mark_synced(self.pool(), shipment_id, fulfillment_id).await?;
        for (line_item_id, line) in lines {
            order::add_fulfilled_quantity(self.pool(), *line_item_id, line.quantity).await?;
        }
        tracing::info!(
            shipment_id,
            fulfillment_id,
            lines = lines.len(),
            "Shipment synced to external fulfillment"
        );
        Ok(())
    }

    async fn refreshed_shipment(&self, shipment_id: i64) -> Result<Shipment, FulfillmentError> {
        Ok(shipment::find_by_id(self.pool(), shipment_id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("Shipment {shipment_id} not found")))?)
    }
}

/// Pair each planned line with its snapshot line and resolve the final
/// quantity; lines without a snapshot counterpart or resolving to zero are
/// dropped
fn plan_fulfillment_lines(
    planned: &[PlannedLine],
    snapshot: &FulfillmentOrderSnapshot,
) -> Vec<(i64, FulfillmentLine)> {
    let mut lines = Vec::new();
    for line in planned {
        let Some(fo_line) = snapshot.line_for(line.line_item.shopify_line_item_id) else {
            continue;
        };
        let quantity = resolve_fulfillment_quantity(
            line.explicit_quantity,
            Some(fo_line.remaining_quantity),
            line.line_item.fulfillable_quantity,
            line.line_item.quantity,
        );
        if quantity <= 0 {
            continue;
        }
        lines.push((
            line.line_item.id,
            FulfillmentLine {
                fulfillment_order_line_item_id: fo_line.fulfillment_order_line_item_id,
                quantity,
            },
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{order, shop};
    use crate::db::DbService;
    use crate::shopify::ShopifyFulfillmentClient;
    use std::sync::Arc;

    #[test]
    fn quantity_precedence_follows_the_chain() {
        // Explicit quantity clipped to FO remaining
        assert_eq!(resolve_fulfillment_quantity(Some(5), Some(3), 10, 10), 3);
        assert_eq!(resolve_fulfillment_quantity(Some(2), Some(3), 10, 10), 2);
        // No snapshot line: explicit stands as-is
        assert_eq!(resolve_fulfillment_quantity(Some(4), None, 10, 10), 4);
        // No explicit: positive FO remaining wins
        assert_eq!(resolve_fulfillment_quantity(None, Some(6), 2, 10), 6);
        // FO remaining exhausted: fall back to cached fulfillable
        assert_eq!(resolve_fulfillment_quantity(None, Some(0), 2, 10), 2);
        // Nothing cached: full ordered quantity
        assert_eq!(resolve_fulfillment_quantity(None, Some(0), 0, 10), 10);
        assert_eq!(resolve_fulfillment_quantity(None, None, 0, 7), 7);
    }

    #[test]
    fn backoff_doubles_from_five_minutes_and_caps_at_an_hour() {
        let now = 1_000_000;
        assert_eq!(pending_backoff_deadline(now, 0) - now, 5 * 60 * 1000);
        assert_eq!(pending_backoff_deadline(now, 1) - now, 10 * 60 * 1000);
        assert_eq!(pending_backoff_deadline(now, 2) - now, 20 * 60 * 1000);
        assert_eq!(pending_backoff_deadline(now, 3) - now, 40 * 60 * 1000);
        assert_eq!(pending_backoff_deadline(now, 4) - now, 60 * 60 * 1000);
        assert_eq!(pending_backoff_deadline(now, 10) - now, 60 * 60 * 1000);
    }

    async fn service() -> FulfillmentService {
        let pool = DbService::in_memory().await.unwrap().pool;
        let shopify = Arc::new(ShopifyFulfillmentClient::new(reqwest::Client::new()));
        FulfillmentService::new(pool, shopify)
    }

    #[tokio::test]
    async fn prepare_drops_unknown_and_zero_lines() {
        let svc = service().await;
        let pool = svc.pool().clone();

        let shop_row = shop::create(&pool, "acme.myshopify.com", "token").await.unwrap();
        let order_row = order::create(&pool, shop_row.id, 9001).await.unwrap();
        let li_a = order::create_line_item(&pool, order_row.id, 7, 5, 5, 42).await.unwrap();
        // Fully exhausted line: no fulfillable, no ordered quantity left to plan
        let li_b = order::create_line_item(&pool, order_row.id, 7, 0, 0, 43).await.unwrap();

        let plan = svc
            .prepare_shipment_batch(
                order_row.id,
                &[
                    ShipmentBatchSelection { line_item_id: li_a.id, quantity: Some(2) },
                    ShipmentBatchSelection { line_item_id: li_b.id, quantity: None },
                    ShipmentBatchSelection { line_item_id: 999_999, quantity: Some(1) },
                ],
            )
            .await
            .unwrap()
            .expect("one actionable line expected");

        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].line_item.id, li_a.id);
        assert_eq!(plan.lines[0].planned_quantity, 2);
    }

    #[tokio::test]
    async fn prepare_yields_none_when_nothing_actionable() {
        let svc = service().await;
        let pool = svc.pool().clone();

        let shop_row = shop::create(&pool, "acme.myshopify.com", "token").await.unwrap();
        let order_row = order::create(&pool, shop_row.id, 9001).await.unwrap();

        let plan = svc
            .prepare_shipment_batch(
                order_row.id,
                &[ShipmentBatchSelection { line_item_id: 1, quantity: Some(1) }],
            )
            .await
            .unwrap();
        assert!(plan.is_none());
    }
}
