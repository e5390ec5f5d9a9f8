//! HTTP contract tests: enqueue → advance → summary over a live server

mod common;

use common::MockShopify;
use console_server::api;
use console_server::core::{Config, ServerState};
use console_server::db::DbService;
use console_server::db::repository::{order, shop};
use console_server::shopify::ShopifyFulfillmentClient;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_app() -> (MockShopify, ServerState, SocketAddr) {
    let mock = MockShopify::start().await;
    let db = DbService::in_memory().await.unwrap();
    let shopify = Arc::new(ShopifyFulfillmentClient::with_base_url(
        reqwest::Client::new(),
        mock.base_url(),
    ));
    let state = ServerState::with_services(Config::from_env(), db.pool, shopify);

    let app = api::build_app(&state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (mock, state, addr)
}

#[tokio::test]
async fn enqueue_advance_and_poll_a_job_to_completion() {
    let (mock, state, addr) = spawn_app().await;
    let pool = &state.db;

    let shop_row = shop::create(pool, "acme.myshopify.com", "token").await.unwrap();
    let order_row = order::create(pool, shop_row.id, 9001).await.unwrap();
    let li = order::create_line_item(pool, order_row.id, 7, 3, 3, 42).await.unwrap();
    mock.set_fulfillment_order(9001, 1001, &[(501, 42, 3)]);

    let http = reqwest::Client::new();

    // Enqueue
    let response = http
        .post(format!("http://{addr}/api/shipment-imports"))
        .json(&json!({
            "vendorId": 7,
            "trackingNumber": "TRK-API-1",
            "carrier": "sagawa",
            "selections": [
                { "orderId": order_row.id, "lineItemId": li.id, "quantity": 2 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let enqueued: Value = response.json().await.unwrap();
    let job_id = enqueued["jobId"].as_i64().unwrap();
    assert_eq!(enqueued["totalCount"], 1);

    // Advance: runs one slice, then returns the refreshed summary
    let response = http
        .post(format!("http://{addr}/api/shipment-imports/{job_id}/advance"))
        .json(&json!({ "itemLimit": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["status"], "succeeded");
    assert_eq!(summary["processedCount"], 1);
    assert_eq!(summary["errorCount"], 0);

    // Plain poll reflects the same terminal state
    let response = http
        .get(format!("http://{addr}/api/shipment-imports/{job_id}"))
        .send()
        .await
        .unwrap();
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["status"], "succeeded");
    assert_eq!(summary["recentFailures"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn failed_items_surface_in_recent_failures() {
    let (_mock, _state, addr) = spawn_app().await;
    let http = reqwest::Client::new();

    // Selections with no usable references enqueue fine but fail to process
    let response = http
        .post(format!("http://{addr}/api/shipment-imports"))
        .json(&json!({
            "vendorId": 7,
            "trackingNumber": "TRK-API-2",
            "carrier": "yamato",
            "selections": [ {} ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let enqueued: Value = response.json().await.unwrap();
    let job_id = enqueued["jobId"].as_i64().unwrap();

    let response = http
        .post(format!("http://{addr}/api/shipment-imports/{job_id}/advance"))
        .send()
        .await
        .unwrap();
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["status"], "failed");
    assert_eq!(summary["errorCount"], 1);
    let failures = summary["recentFailures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0]["errorMessage"],
        "order or line item reference is missing"
    );
}

#[tokio::test]
async fn enqueue_rejects_invalid_payloads() {
    let (_mock, _state, addr) = spawn_app().await;
    let http = reqwest::Client::new();

    // Empty selections
    let response = http
        .post(format!("http://{addr}/api/shipment-imports"))
        .json(&json!({
            "vendorId": 7,
            "trackingNumber": "TRK",
            "carrier": "yamato",
            "selections": []
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Missing tracking number
    let response = http
        .post(format!("http://{addr}/api/shipment-imports"))
        .json(&json!({
            "vendorId": 7,
            "trackingNumber": "  ",
            "carrier": "yamato",
            "selections": [{ "orderId": 1, "lineItemId": 2 }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Unknown job id
    let response = http
        .get(format!("http://{addr}/api/shipment-imports/123456789"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn tracking_update_and_cancel_round_trip_the_external_api() {
    let (mock, state, addr) = spawn_app().await;
    let pool = &state.db;

    let shop_row = shop::create(pool, "acme.myshopify.com", "token").await.unwrap();
    let order_row = order::create(pool, shop_row.id, 9003).await.unwrap();
    let li = order::create_line_item(pool, order_row.id, 7, 2, 2, 44).await.unwrap();
    mock.set_fulfillment_order(9003, 1003, &[(503, 44, 2)]);

    let http = reqwest::Client::new();
    let response = http
        .post(format!("http://{addr}/api/shipment-imports"))
        .json(&json!({
            "vendorId": 7,
            "trackingNumber": "TRK-API-4",
            "carrier": "yamato",
            "selections": [ { "orderId": order_row.id, "lineItemId": li.id, "quantity": 2 } ]
        }))
        .send()
        .await
        .unwrap();
    let job_id = response.json::<Value>().await.unwrap()["jobId"].as_i64().unwrap();

    let response = http
        .post(format!("http://{addr}/api/shipment-imports/{job_id}/advance"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.json::<Value>().await.unwrap()["status"], "succeeded");

    let shipment_id = sqlx::query_scalar::<_, i64>("SELECT id FROM shipment WHERE order_id = ?")
        .bind(order_row.id)
        .fetch_one(pool)
        .await
        .unwrap();

    // Correct the tracking number; the synced fulfillment is updated too
    let response = http
        .put(format!("http://{addr}/api/shipments/{shipment_id}/tracking"))
        .json(&json!({ "trackingNumber": "TRK-FIXED", "carrier": "sagawa" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let shipment: Value = response.json().await.unwrap();
    assert_eq!(shipment["tracking_number"], "TRK-FIXED");
    assert_eq!(shipment["tracking_company"], "Sagawa (JA)");

    // Cancel: external fulfillment cancelled, local state marked
    let response = http
        .post(format!("http://{addr}/api/shipments/{shipment_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let sync_status =
        sqlx::query_scalar::<_, String>("SELECT sync_status FROM shipment WHERE id = ?")
            .bind(shipment_id)
            .fetch_one(pool)
            .await
            .unwrap();
    assert_eq!(sync_status, "cancelled");
}

#[tokio::test]
async fn sweep_endpoint_advances_queued_jobs() {
    let (mock, state, addr) = spawn_app().await;
    let pool = &state.db;

    let shop_row = shop::create(pool, "acme.myshopify.com", "token").await.unwrap();
    let order_row = order::create(pool, shop_row.id, 9002).await.unwrap();
    let li = order::create_line_item(pool, order_row.id, 7, 2, 2, 43).await.unwrap();
    mock.set_fulfillment_order(9002, 1002, &[(502, 43, 2)]);

    let http = reqwest::Client::new();
    let response = http
        .post(format!("http://{addr}/api/shipment-imports"))
        .json(&json!({
            "vendorId": 7,
            "trackingNumber": "TRK-API-3",
            "carrier": "fedex",
            "selections": [ { "orderId": order_row.id, "lineItemId": li.id } ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = http
        .post(format!("http://{addr}/api/shipment-imports/sweep"))
        .json(&json!({ "jobLimit": 5, "itemLimit": 50 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["claimed"], 1);
    assert_eq!(summary["succeeded"], 1);
}
