//! Shipment Import Job Models (一括出荷登録ジョブ)

use serde::{Deserialize, Serialize};

/// Job lifecycle state
///
/// `Running` is held only while a claimant owns the lock; a crashed claimant
/// leaves the job `Running` with a stale `locked_at` until reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Work item state: pending → succeeded | failed, exactly once per pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum JobItemStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Durable shipment import job
///
/// Invariant: `processed_count + error_count <= total_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ShipmentImportJob {
    pub id: i64,
    pub vendor_id: i64,
    pub tracking_number: String,
    pub carrier: String,
    pub total_count: i64,
    pub processed_count: i64,
    pub error_count: i64,
    pub status: JobStatus,
    /// Claim timestamp (Unix millis); null when unlocked
    pub locked_at: Option<i64>,
    pub attempts: i64,
    pub last_attempt_at: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Line-item-level work item of an import job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ShipmentImportJobItem {
    pub id: i64,
    pub job_id: i64,
    pub vendor_id: i64,
    /// Null when the enqueue payload carried no usable order reference
    pub order_id: Option<i64>,
    pub line_item_id: Option<i64>,
    /// Explicit requested quantity, clamped to [1, 9999] at enqueue;
    /// null means "ship whatever is currently fulfillable"
    pub quantity: Option<i64>,
    pub status: JobItemStatus,
    pub attempts: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One (order, line item, quantity) selection in an enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentSelection {
    pub order_id: Option<i64>,
    pub line_item_id: Option<i64>,
    /// Optional explicit quantity; clamped to [1, 9999] at enqueue
    pub quantity: Option<i64>,
}

/// Enqueue response: `{jobId, totalCount}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResult {
    pub job_id: i64,
    pub total_count: i64,
}

/// Per-item failure detail surfaced in job summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ItemFailure {
    pub item_id: i64,
    pub order_id: Option<i64>,
    pub line_item_id: Option<i64>,
    pub error_message: Option<String>,
}

/// Operator-facing job summary returned by the poll endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: i64,
    pub status: JobStatus,
    pub total_count: i64,
    pub processed_count: i64,
    pub error_count: i64,
    pub last_error: Option<String>,
    /// Up to 5 most recent failed items
    pub recent_failures: Vec<ItemFailure>,
}

/// Outcome of one runner invocation over many jobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub claimed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub requeued: i64,
}
