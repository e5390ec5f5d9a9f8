//! Fulfillment domain services
//!
//! - [`sync`]: reconciliation of local order/line-item/shipment state against
//!   live fulfillment-order snapshots
//! - [`register`]: shipment batch preparation and registration against the
//!   external API

pub mod register;
pub mod sync;

pub use register::{PlannedLine, ShipmentPlan};
pub use sync::SyncOutcome;

use crate::db::repository::RepoError;
use crate::shopify::{ShopifyError, ShopifyFulfillmentClient};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Errors surfaced by fulfillment operations
///
/// Repository and external-API errors pass through transparently so callers
/// (the job runner) can switch on kind rather than substring-match messages.
#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Shopify(#[from] ShopifyError),

    #[error("no fulfillable line items found")]
    NoFulfillableLines,
}

/// Reconciliation + registration service
///
/// Constructed once at startup with an injected pool and Shopify client;
/// holds no mutable state of its own and is safe to share across tasks.
pub struct FulfillmentService {
    pool: SqlitePool,
    shopify: Arc<ShopifyFulfillmentClient>,
}

impl FulfillmentService {
    pub fn new(pool: SqlitePool, shopify: Arc<ShopifyFulfillmentClient>) -> Self {
        Self { pool, shopify }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn shopify(&self) -> &ShopifyFulfillmentClient {
        &self.shopify
    }
}
