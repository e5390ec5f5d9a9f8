//! Import Job Runner
//!
//! Drives claimed jobs through one bounded processing slice per invocation.
//! The runner is stateless and re-entrant: any number of instances may run
//! concurrently (cron, HTTP poke, manual retry) — all coordination lives in
//! the job store's claim statements. A crashed instance leaves its jobs
//! `running` with a stale lock, which a later invocation reclaims.

use std::collections::BTreeMap;
use std::sync::Arc;

use shared::models::{JobItemStatus, JobStatus, ShipmentImportJob, ShipmentMeta, SweepSummary};
use sqlx::SqlitePool;

use crate::db::repository::import_job::{self, JobProgressUpdate};
use crate::db::repository::order;
use crate::fulfillment::register::ShipmentBatchSelection;
use crate::fulfillment::{FulfillmentError, FulfillmentService};
use crate::utils::AppError;

/// Cap on `last_error` / item error message length
const ERROR_MESSAGE_LIMIT: usize = 240;
/// Fixed message for items whose references cannot be resolved
const MISSING_REFERENCE_ERROR: &str = "order or line item reference is missing";
/// Fixed message when batch preparation yields nothing actionable
const NO_FULFILLABLE_ERROR: &str = "no fulfillable line items found";

/// Bounded batch sizes for one invocation
#[derive(Debug, Clone, Copy)]
pub struct SweepLimits {
    pub job_limit: i64,
    pub item_limit: i64,
}

impl SweepLimits {
    /// Clamp caller-supplied limits into the supported windows
    pub fn clamped(job_limit: i64, item_limit: i64) -> Self {
        Self {
            job_limit: job_limit.clamp(1, import_job::MAX_CLAIM_LIMIT),
            item_limit: item_limit.clamp(1, 100),
        }
    }
}

/// Result of one slice over one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    /// Work remains; job was unlocked and returned to the queue
    Requeued,
}

/// Stateless orchestrator over the job store and the fulfillment service
pub struct ImportJobRunner {
    pool: SqlitePool,
    fulfillment: Arc<FulfillmentService>,
    stale_after_secs: i64,
}

impl ImportJobRunner {
    pub fn new(
        pool: SqlitePool,
        fulfillment: Arc<FulfillmentService>,
        stale_after_secs: i64,
    ) -> Self {
        Self {
            pool,
            fulfillment,
            stale_after_secs: import_job::clamp_stale_secs(stale_after_secs),
        }
    }

    /// Claim and advance up to `job_limit` jobs
    ///
    /// Pending jobs are claimed first; any shortfall is filled from
    /// crashed/stale running jobs, which is what guarantees forward progress
    /// when a worker died mid-job.
    pub async fn process_jobs(&self, limits: SweepLimits) -> Result<SweepSummary, AppError> {
        let mut jobs = import_job::claim_pending_jobs(&self.pool, limits.job_limit).await?;

        let shortfall = limits.job_limit - jobs.len() as i64;
        if shortfall > 0 {
            let reclaimable =
                import_job::list_reclaimable_job_ids(&self.pool, shortfall, self.stale_after_secs)
                    .await?;
            for job_id in reclaimable {
                if let Some(job) =
                    import_job::claim_job_by_id(&self.pool, job_id, self.stale_after_secs).await?
                {
                    tracing::info!(job_id, attempts = job.attempts, "Reclaimed stale import job");
                    jobs.push(job);
                }
            }
        }

        let mut summary = SweepSummary {
            claimed: jobs.len() as i64,
            ..Default::default()
        };
        for job in &jobs {
            match self.run_slice(job, limits.item_limit).await? {
                JobOutcome::Succeeded => summary.succeeded += 1,
                JobOutcome::Failed => summary.failed += 1,
                JobOutcome::Requeued => summary.requeued += 1,
            }
        }

        if summary.claimed > 0 {
            tracing::info!(
                claimed = summary.claimed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                requeued = summary.requeued,
                "Import job sweep complete"
            );
        }
        Ok(summary)
    }

    /// Claim one specific job and advance it one slice
    ///
    /// Used by the polling endpoint. Returns None when the job could not be
    /// claimed (terminal, or locked by a live claimant).
    pub async fn process_job_by_id(
        &self,
        job_id: i64,
        item_limit: i64,
    ) -> Result<Option<JobOutcome>, AppError> {
        let Some(job) =
            import_job::claim_job_by_id(&self.pool, job_id, self.stale_after_secs).await?
        else {
            return Ok(None);
        };
        let outcome = self.run_slice(&job, item_limit.clamp(1, 100)).await?;
        Ok(Some(outcome))
    }

    /// One bounded processing slice over a claimed job
    async fn run_slice(
        &self,
        job: &ShipmentImportJob,
        item_limit: i64,
    ) -> Result<JobOutcome, AppError> {
        // Corrupt enqueue data: unrecoverable, fail the job outright
        if job.vendor_id <= 0 {
            import_job::update_job_progress(
                &self.pool,
                job.id,
                &JobProgressUpdate {
                    status: Some(JobStatus::Failed),
                    last_error: Some("job has no vendor context".into()),
                    unlock: true,
                    ..Default::default()
                },
            )
            .await?;
            tracing::error!(job_id = job.id, "Import job has no vendor context");
            return Ok(JobOutcome::Failed);
        }

        let items = import_job::load_pending_items(&self.pool, job.id, item_limit).await?;
        if items.is_empty() {
            // Last slice already drained the queue; close the job out
            return self.finalize(job.id, job.error_count, 0, 0, None).await;
        }

        let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        import_job::increment_item_attempts(&self.pool, &item_ids).await?;

        // Partition: items whose references cannot be resolved fail now
        let mut invalid_ids = Vec::new();
        let mut by_order: BTreeMap<i64, Vec<(i64, i64, Option<i64>)>> = BTreeMap::new();
        for item in &items {
            let valid = match (item.order_id, item.line_item_id) {
                (Some(order_id), Some(line_item_id)) => {
                    match order::find_line_item(&self.pool, line_item_id).await? {
                        Some(li) if li.order_id == order_id => {
                            by_order
                                .entry(order_id)
                                .or_default()
                                .push((item.id, line_item_id, item.quantity));
                            true
                        }
                        _ => false,
                    }
                }
                _ => false,
            };
            if !valid {
                invalid_ids.push(item.id);
            }
        }

        let mut processed_delta = 0i64;
        let mut error_delta = 0i64;
        let mut slice_error: Option<String> = None;

        if !invalid_ids.is_empty() {
            import_job::mark_items_result(
                &self.pool,
                &invalid_ids,
                JobItemStatus::Failed,
                Some(MISSING_REFERENCE_ERROR),
            )
            .await?;
            error_delta += invalid_ids.len() as i64;
            slice_error = Some(MISSING_REFERENCE_ERROR.into());
        }

        // One order's failure never aborts its siblings in the same slice
        for (order_id, group) in by_order {
            let group_ids: Vec<i64> = group.iter().map(|(id, _, _)| *id).collect();
            let selections: Vec<ShipmentBatchSelection> = group
                .iter()
                .map(|(_, line_item_id, quantity)| ShipmentBatchSelection {
                    line_item_id: *line_item_id,
                    quantity: *quantity,
                })
                .collect();

            let plan = self
                .fulfillment
                .prepare_shipment_batch(order_id, &selections)
                .await
                .map_err(AppError::from)?;

            let Some(plan) = plan else {
                import_job::mark_items_result(
                    &self.pool,
                    &group_ids,
                    JobItemStatus::Failed,
                    Some(NO_FULFILLABLE_ERROR),
                )
                .await?;
                error_delta += group_ids.len() as i64;
                slice_error = Some(NO_FULFILLABLE_ERROR.into());
                continue;
            };

            let meta = ShipmentMeta {
                tracking_number: job.tracking_number.clone(),
                carrier: job.carrier.clone(),
                tracking_url: None,
            };
            match self
                .fulfillment
                .register_shipment(job.vendor_id, &plan, &meta)
                .await
            {
                Ok(shipment) => {
                    import_job::mark_items_result(
                        &self.pool,
                        &group_ids,
                        JobItemStatus::Succeeded,
                        None,
                    )
                    .await?;
                    processed_delta += group_ids.len() as i64;
                    tracing::debug!(
                        job_id = job.id,
                        order_id,
                        shipment_id = shipment.id,
                        items = group_ids.len(),
                        "Registered shipment for order batch"
                    );
                }
                // Store failures have no safe degraded state; let them propagate
                Err(FulfillmentError::Repo(e)) => return Err(e.into()),
                Err(e) => {
                    let message = normalize_error(&e);
                    tracing::warn!(
                        job_id = job.id,
                        order_id,
                        error = %message,
                        "Shipment registration failed for order batch"
                    );
                    import_job::mark_items_result(
                        &self.pool,
                        &group_ids,
                        JobItemStatus::Failed,
                        Some(&message),
                    )
                    .await?;
                    error_delta += group_ids.len() as i64;
                    slice_error = Some(message);
                }
            }
        }

        self.finalize(
            job.id,
            job.error_count,
            processed_delta,
            error_delta,
            slice_error,
        )
        .await
    }

    /// Write back slice results and either requeue or close the job
    async fn finalize(
        &self,
        job_id: i64,
        prior_error_count: i64,
        processed_delta: i64,
        error_delta: i64,
        slice_error: Option<String>,
    ) -> Result<JobOutcome, AppError> {
        let pending = import_job::count_pending_items(&self.pool, job_id).await?;
        let (status, outcome) = if pending > 0 {
            (JobStatus::Pending, JobOutcome::Requeued)
        } else if prior_error_count + error_delta > 0 {
            (JobStatus::Failed, JobOutcome::Failed)
        } else {
            (JobStatus::Succeeded, JobOutcome::Succeeded)
        };

        import_job::update_job_progress(
            &self.pool,
            job_id,
            &JobProgressUpdate {
                processed_delta,
                error_delta,
                status: Some(status),
                last_error: slice_error,
                unlock: true,
            },
        )
        .await?;
        Ok(outcome)
    }
}

/// Bound an arbitrary error's display form for storage
fn normalize_error(err: &impl std::fmt::Display) -> String {
    let message = err.to_string();
    if message.chars().count() <= ERROR_MESSAGE_LIMIT {
        return message;
    }
    let mut truncated: String = message.chars().take(ERROR_MESSAGE_LIMIT).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_errors_pass_through_untruncated() {
        assert_eq!(normalize_error(&"boom"), "boom");
    }

    #[test]
    fn long_errors_are_bounded_with_ellipsis() {
        let long = "x".repeat(1000);
        let normalized = normalize_error(&long);
        assert_eq!(normalized.chars().count(), ERROR_MESSAGE_LIMIT + 1);
        assert!(normalized.ends_with('…'));
    }
}
