//! Shipment API Module
//!
//! Operator actions on individual shipments: tracking correction and
//! cancellation. Registration itself only happens through import jobs.

mod handler;

use axum::{
    routing::{post, put},
    Router,
};

use crate::core::ServerState;

/// Shipment router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/shipments", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Replace tracking metadata (idempotent against the external API)
        .route("/{id}/tracking", put(handler::update_tracking))
        // Cancel the shipment and its external fulfillment
        .route("/{id}/cancel", post(handler::cancel))
}
