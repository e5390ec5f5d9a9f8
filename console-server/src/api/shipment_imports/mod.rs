//! Shipment Import API Module
//!
//! Enqueue bulk shipment registrations, poll their progress, and drive the
//! background sweep. Authentication/session resolution happens upstream; the
//! vendor id arrives with the request.

mod handler;

use axum::{
    routing::{get, post},
    Router,
};

use crate::core::ServerState;

/// Shipment import router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/shipment-imports", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Enqueue a new bulk registration job
        .route("/", post(handler::enqueue))
        // Background sweep (scheduler entry point)
        .route("/sweep", post(handler::sweep))
        // Poll a job's progress
        .route("/{id}", get(handler::get_summary))
        // Poll + advance one processing slice
        .route("/{id}/advance", post(handler::advance))
}
