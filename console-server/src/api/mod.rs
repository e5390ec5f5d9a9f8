//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`shipment_imports`] - 一括出荷登録ジョブ接口
//! - [`shipments`] - 出荷跟踪更新与取消

pub mod health;
pub mod shipment_imports;
pub mod shipments;

use axum::Router;
use http::HeaderValue;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).unwrap()))
    }
}

/// Build a router with all routes registered (no middleware, no state)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        // Shipment import jobs
        .merge(shipment_imports::router())
        // Shipment actions
        .merge(shipments::router())
        // Health API - public route
        .merge(health::router())
}

/// Build a fully configured application with middleware and state
pub fn build_app(state: &ServerState) -> Router {
    let x_request_id = http::HeaderName::from_static("x-request-id");
    build_router()
        // ========== Tower HTTP Middleware ==========
        // CORS - Handle cross-origin requests
        .layer(CorsLayer::permissive())
        // Request logging
        .layer(TraceLayer::new_for_http())
        // Request ID - generated on ingress, propagated to the response
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, XRequestId))
        .with_state(state.clone())
}
