//! Health API

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::core::ServerState;

/// Health router
pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "time": shared::util::now_millis(),
    }))
}
