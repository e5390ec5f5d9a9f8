//! Shared test support: a scriptable in-process Shopify mock
#![allow(dead_code)] // each test crate uses a different slice of the helpers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

type Shared = Arc<Mutex<MockShopifyState>>;

/// Scriptable behavior + call counters for the mock fulfillment API
pub struct MockShopifyState {
    /// Status codes returned (and consumed) by fetches before real handling
    pub fetch_script: VecDeque<u16>,
    /// fulfillment_orders payload per external order id
    pub fulfillment_orders: HashMap<i64, Value>,
    pub fetch_count: usize,
    pub create_count: usize,
    /// Id stamped on created fulfillments; None → response without an id
    pub next_fulfillment_id: Option<i64>,
    /// Captured create-fulfillment request bodies
    pub created: Vec<Value>,
}

impl Default for MockShopifyState {
    fn default() -> Self {
        Self {
            fetch_script: VecDeque::new(),
            fulfillment_orders: HashMap::new(),
            fetch_count: 0,
            create_count: 0,
            next_fulfillment_id: Some(7001),
            created: Vec::new(),
        }
    }
}

pub struct MockShopify {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl MockShopify {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockShopifyState::default()));

        let app = Router::new()
            .route(
                "/admin/api/2024-01/orders/{order_id}/fulfillment_orders.json",
                get(fetch_fulfillment_orders),
            )
            .route("/admin/api/2024-01/fulfillments.json", post(create_fulfillment))
            .route(
                "/admin/api/2024-01/fulfillments/{id}/update_tracking.json",
                post(plain_ok),
            )
            .route("/admin/api/2024-01/fulfillments/{id}/cancel.json", post(plain_ok))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Serve one fulfillment order for the given external order id
    pub fn set_fulfillment_order(
        &self,
        shopify_order_id: i64,
        fulfillment_order_id: i64,
        lines: &[(i64, i64, i64)],
    ) {
        let line_items: Vec<Value> = lines
            .iter()
            .map(|(fo_li_id, li_id, remaining)| {
                json!({
                    "id": fo_li_id,
                    "line_item_id": li_id,
                    "fulfillable_quantity": remaining,
                })
            })
            .collect();
        self.state.lock().unwrap().fulfillment_orders.insert(
            shopify_order_id,
            json!({
                "fulfillment_orders": [{
                    "id": fulfillment_order_id,
                    "status": "open",
                    "line_items": line_items,
                }]
            }),
        );
    }

    /// Queue status codes to be returned before fetches start succeeding
    pub fn script_fetch_statuses(&self, statuses: &[u16]) {
        let mut state = self.state.lock().unwrap();
        state.fetch_script = statuses.iter().copied().collect();
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetch_count
    }

    pub fn create_count(&self) -> usize {
        self.state.lock().unwrap().create_count
    }
}

async fn fetch_fulfillment_orders(
    State(state): State<Shared>,
    Path(order_id): Path<i64>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.fetch_count += 1;
    if let Some(code) = state.fetch_script.pop_front() {
        return StatusCode::from_u16(code).unwrap().into_response();
    }
    let body = state
        .fulfillment_orders
        .get(&order_id)
        .cloned()
        .unwrap_or_else(|| json!({ "fulfillment_orders": [] }));
    Json(body).into_response()
}

async fn create_fulfillment(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    state.create_count += 1;
    state.created.push(body);
    match state.next_fulfillment_id {
        Some(id) => Json(json!({ "fulfillment": { "id": id } })).into_response(),
        None => Json(json!({ "fulfillment": {} })).into_response(),
    }
}

async fn plain_ok() -> Json<Value> {
    Json(json!({}))
}
