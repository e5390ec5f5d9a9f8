//! ShopifyFulfillmentClient — HTTP client for the fulfillment API
//!
//! Transient failures (429/5xx) are retried with capped exponential backoff;
//! everything else fails immediately with a closed error kind the runner can
//! switch on.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use super::types::{
    FulfillmentOrderSnapshot, FulfillmentOrdersResponse, FulfillmentResponse, NewFulfillment,
    TrackingInfo,
};

/// Admin API version pinned by the console
const API_VERSION: &str = "2024-01";
/// Max response body length carried into an error message
const ERROR_BODY_LIMIT: usize = 200;

/// Closed error taxonomy for fulfillment API calls
#[derive(Debug, thiserror::Error)]
pub enum ShopifyError {
    #[error("Fulfillment API rate limited the request")]
    RateLimited,

    #[error("Fulfillment API transient error (status {status})")]
    Transient { status: u16 },

    #[error("Fulfillment API resource not found")]
    NotFound,

    #[error("Fulfillment API rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Fulfillment API response did not include a fulfillment id")]
    MissingFulfillmentId,

    #[error("Fulfillment API transport error: {0}")]
    Transport(String),

    #[error("Unexpected fulfillment API response: {0}")]
    InvalidResponse(String),
}

impl ShopifyError {
    /// Only rate limiting and 5xx responses are worth retrying
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ShopifyError::RateLimited | ShopifyError::Transient { .. }
        )
    }
}

/// Bounded exponential backoff: `min(max_delay, base_delay * 2^(attempt-1))`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given 1-based attempt's retry
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Client for the Shopify fulfillment API
///
/// One instance per process, constructed at startup and passed by reference.
pub struct ShopifyFulfillmentClient {
    http: Client,
    retry: RetryPolicy,
    /// When set, all shops resolve to this base URL (test harness)
    base_url: Option<String>,
}

impl ShopifyFulfillmentClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            retry: RetryPolicy::default(),
            base_url: None,
        }
    }

    /// Pin every shop to a fixed base URL (used by the test harness)
    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            retry: RetryPolicy::default(),
            base_url: Some(base_url.into()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, shop: &str, path: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}/admin/api/{API_VERSION}{path}"),
            None => format!("https://{shop}/admin/api/{API_VERSION}{path}"),
        }
    }

    /// Fetch live fulfillment-order snapshots for an external order
    ///
    /// An empty list is a valid result: the order simply has not produced a
    /// fulfillment order yet.
    pub async fn fetch_fulfillment_orders(
        &self,
        shop: &str,
        token: &str,
        shopify_order_id: i64,
    ) -> Result<Vec<FulfillmentOrderSnapshot>, ShopifyError> {
        let url = self.endpoint(shop, &format!("/orders/{shopify_order_id}/fulfillment_orders.json"));
        let response: FulfillmentOrdersResponse =
            self.execute(Method::GET, &url, token, None).await?;
        Ok(response
            .fulfillment_orders
            .into_iter()
            .map(Into::into)
            .collect())
    }

    /// Create a fulfillment against one fulfillment order
    pub async fn create_fulfillment(
        &self,
        shop: &str,
        token: &str,
        fulfillment: &NewFulfillment,
    ) -> Result<i64, ShopifyError> {
        let lines: Vec<serde_json::Value> = fulfillment
            .lines
            .iter()
            .map(|l| json!({ "id": l.fulfillment_order_line_item_id, "quantity": l.quantity }))
            .collect();
        let mut body = json!({
            "fulfillment": {
                "line_items_by_fulfillment_order": [{
                    "fulfillment_order_id": fulfillment.fulfillment_order_id,
                    "fulfillment_order_line_items": lines,
                }],
                "notify_customer": fulfillment.notify_customer,
            }
        });
        if let Some(tracking) = &fulfillment.tracking {
            body["fulfillment"]["tracking_info"] = serde_json::to_value(tracking)
                .map_err(|e| ShopifyError::InvalidResponse(e.to_string()))?;
        }

        let url = self.endpoint(shop, "/fulfillments.json");
        let response: FulfillmentResponse =
            self.execute(Method::POST, &url, token, Some(body)).await?;
        response
            .fulfillment
            .and_then(|f| f.id)
            .ok_or(ShopifyError::MissingFulfillmentId)
    }

    /// Update tracking on an existing fulfillment (idempotent)
    pub async fn update_tracking(
        &self,
        shop: &str,
        token: &str,
        fulfillment_id: i64,
        tracking: &TrackingInfo,
    ) -> Result<(), ShopifyError> {
        let body = json!({
            "fulfillment": {
                "tracking_info": tracking,
                "notify_customer": false,
            }
        });
        let url = self.endpoint(shop, &format!("/fulfillments/{fulfillment_id}/update_tracking.json"));
        let _: serde_json::Value = self.execute(Method::POST, &url, token, Some(body)).await?;
        Ok(())
    }

    /// Cancel an existing fulfillment
    pub async fn cancel_fulfillment(
        &self,
        shop: &str,
        token: &str,
        fulfillment_id: i64,
    ) -> Result<(), ShopifyError> {
        let url = self.endpoint(shop, &format!("/fulfillments/{fulfillment_id}/cancel.json"));
        let _: serde_json::Value = self.execute(Method::POST, &url, token, None).await?;
        Ok(())
    }

    /// Send one API call with the bounded retry loop
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ShopifyError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let mut request = self
                .http
                .request(method.clone(), url)
                .header("X-Shopify-Access-Token", token)
                .header("Accept", "application/json");
            if let Some(b) = &body {
                request = request.json(b);
            }

            let error = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| ShopifyError::Transport(e.to_string()))?;
                        return serde_json::from_str(&text)
                            .map_err(|e| ShopifyError::InvalidResponse(e.to_string()));
                    }
                    Self::classify_status(status, response.text().await.unwrap_or_default())
                }
                Err(e) => ShopifyError::Transport(e.to_string()),
            };

            if error.is_retriable() && attempt < self.retry.max_attempts {
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    url = %url,
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Fulfillment API call failed, retrying: {error}"
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            return Err(error);
        }
    }

    fn classify_status(status: StatusCode, body: String) -> ShopifyError {
        match status.as_u16() {
            429 => ShopifyError::RateLimited,
            500 | 502 | 503 | 504 => ShopifyError::Transient {
                status: status.as_u16(),
            },
            404 => ShopifyError::NotFound,
            code => {
                let mut message = body;
                if message.len() > ERROR_BODY_LIMIT {
                    message.truncate(ERROR_BODY_LIMIT);
                }
                ShopifyError::Rejected {
                    status: code,
                    message,
                }
            }
        }
    }
}
