//! Shipment Import Job Store
//!
//! Durable, crash-safe queue semantics over jobs and their work items.
//! Every claim is a single conditional UPDATE … RETURNING statement; SQLite's
//! single-writer transaction makes it atomic, so two concurrent runners can
//! never claim the same job. A crashed claimant leaves `locked_at` behind and
//! the job becomes reclaimable once the stale threshold passes.

use super::{RepoError, RepoResult};
use shared::models::{
    ItemFailure, JobItemStatus, JobStatus, ShipmentImportJob, ShipmentImportJobItem,
    ShipmentSelection,
};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Hard cap on jobs claimed per invocation
pub const MAX_CLAIM_LIMIT: i64 = 5;
/// Hard cap on items loaded per slice
pub const MAX_ITEM_BATCH: i64 = 200;
/// Default lock staleness threshold
pub const DEFAULT_STALE_AFTER_SECS: i64 = 90;
/// Explicit quantity bounds at enqueue
pub const QUANTITY_MIN: i64 = 1;
pub const QUANTITY_MAX: i64 = 9999;

const JOB_COLUMNS: &str = "id, vendor_id, tracking_number, carrier, total_count, processed_count, error_count, status, locked_at, attempts, last_attempt_at, last_error, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, job_id, vendor_id, order_id, line_item_id, quantity, status, attempts, error_message, created_at, updated_at";

/// Clamp a stale threshold into the supported window
pub fn clamp_stale_secs(secs: i64) -> i64 {
    secs.clamp(30, 3600)
}

/// Progress delta applied at the end of a slice
///
/// `update_job_progress` is the only path that moves a job out of `running`.
#[derive(Debug, Default)]
pub struct JobProgressUpdate {
    pub processed_delta: i64,
    pub error_delta: i64,
    pub status: Option<JobStatus>,
    pub last_error: Option<String>,
    pub unlock: bool,
}

// ========== Job lifecycle ==========

pub async fn find_job(pool: &SqlitePool, job_id: i64) -> RepoResult<Option<ShipmentImportJob>> {
    let job = sqlx::query_as::<_, ShipmentImportJob>(&format!(
        "SELECT {JOB_COLUMNS} FROM shipment_import_job WHERE id = ?"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;
    Ok(job)
}

/// Create a job plus one work item per unique (order, line item) selection
///
/// Selections are deduplicated keeping the first occurrence; explicit
/// quantities are clamped to [1, 9999]. An empty normalized set is rejected.
/// If item insertion fails the job row is removed — no orphaned jobs.
pub async fn create_job(
    pool: &SqlitePool,
    vendor_id: i64,
    tracking_number: &str,
    carrier: &str,
    selections: &[ShipmentSelection],
) -> RepoResult<ShipmentImportJob> {
    let mut seen: HashSet<(Option<i64>, Option<i64>)> = HashSet::new();
    let mut normalized: Vec<(Option<i64>, Option<i64>, Option<i64>)> = Vec::new();
    for sel in selections {
        if !seen.insert((sel.order_id, sel.line_item_id)) {
            continue;
        }
        let quantity = sel.quantity.map(|q| q.clamp(QUANTITY_MIN, QUANTITY_MAX));
        normalized.push((sel.order_id, sel.line_item_id, quantity));
    }

    if normalized.is_empty() {
        return Err(RepoError::Validation(
            "No valid shipment selections supplied".into(),
        ));
    }

    let now = now_millis();
    let job_id = snowflake_id();
    let total = normalized.len() as i64;

    sqlx::query(
        "INSERT INTO shipment_import_job (id, vendor_id, tracking_number, carrier, total_count, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(job_id)
    .bind(vendor_id)
    .bind(tracking_number)
    .bind(carrier)
    .bind(total)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    for (order_id, line_item_id, quantity) in &normalized {
        let insert = sqlx::query(
            "INSERT INTO shipment_import_job_item (id, job_id, vendor_id, order_id, line_item_id, quantity, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(snowflake_id())
        .bind(job_id)
        .bind(vendor_id)
        .bind(order_id)
        .bind(line_item_id)
        .bind(quantity)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await;

        if let Err(e) = insert {
            // Roll the job back by hand: items first, then the job row
            let _ = sqlx::query("DELETE FROM shipment_import_job_item WHERE job_id = ?")
                .bind(job_id)
                .execute(pool)
                .await;
            let _ = sqlx::query("DELETE FROM shipment_import_job WHERE id = ?")
                .bind(job_id)
                .execute(pool)
                .await;
            return Err(e.into());
        }
    }

    find_job(pool, job_id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create import job".into()))
}

/// Atomically claim up to `limit` pending jobs
///
/// pending → running, stamping `locked_at` and bumping `attempts`, in one
/// statement.
pub async fn claim_pending_jobs(
    pool: &SqlitePool,
    limit: i64,
) -> RepoResult<Vec<ShipmentImportJob>> {
    let limit = limit.clamp(1, MAX_CLAIM_LIMIT);
    let now = now_millis();
    let jobs = sqlx::query_as::<_, ShipmentImportJob>(&format!(
        "UPDATE shipment_import_job \
         SET status = 'running', locked_at = ?, attempts = attempts + 1, last_attempt_at = ?, updated_at = ? \
         WHERE id IN (SELECT id FROM shipment_import_job WHERE status = 'pending' ORDER BY id ASC LIMIT ?) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(now)
    .bind(now)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(jobs)
}

/// Running jobs presumed abandoned: NULL lock first (crashed before
/// stamping), then locks older than the stale threshold, oldest first
pub async fn list_reclaimable_job_ids(
    pool: &SqlitePool,
    limit: i64,
    stale_after_secs: i64,
) -> RepoResult<Vec<i64>> {
    let cutoff = now_millis() - clamp_stale_secs(stale_after_secs) * 1000;
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM shipment_import_job \
         WHERE status = 'running' AND (locked_at IS NULL OR locked_at <= ?) \
         ORDER BY CASE WHEN locked_at IS NULL THEN 0 ELSE 1 END, locked_at ASC, id ASC \
         LIMIT ?",
    )
    .bind(cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Claim one specific job, re-validating its current state
///
/// Pending jobs claim unconditionally; running jobs only when their lock is
/// absent or stale. Returns None when another claimant already refreshed the
/// lock — the safety net against double-claiming a job found via the reclaim
/// scan.
pub async fn claim_job_by_id(
    pool: &SqlitePool,
    job_id: i64,
    stale_after_secs: i64,
) -> RepoResult<Option<ShipmentImportJob>> {
    let now = now_millis();
    let cutoff = now - clamp_stale_secs(stale_after_secs) * 1000;
    let job = sqlx::query_as::<_, ShipmentImportJob>(&format!(
        "UPDATE shipment_import_job \
         SET status = 'running', locked_at = ?, attempts = attempts + 1, last_attempt_at = ?, updated_at = ? \
         WHERE id = ? AND (status = 'pending' \
             OR (status = 'running' AND (locked_at IS NULL OR locked_at <= ?))) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(now)
    .bind(now)
    .bind(now)
    .bind(job_id)
    .bind(cutoff)
    .fetch_optional(pool)
    .await?;
    Ok(job)
}

/// Apply counter deltas and optionally finalize / unlock the job
pub async fn update_job_progress(
    pool: &SqlitePool,
    job_id: i64,
    update: &JobProgressUpdate,
) -> RepoResult<ShipmentImportJob> {
    let now = now_millis();
    let job = sqlx::query_as::<_, ShipmentImportJob>(&format!(
        "UPDATE shipment_import_job \
         SET processed_count = processed_count + ?, \
             error_count = error_count + ?, \
             status = COALESCE(?, status), \
             last_error = COALESCE(?, last_error), \
             locked_at = CASE WHEN ? THEN NULL ELSE locked_at END, \
             updated_at = ? \
         WHERE id = ? \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(update.processed_delta)
    .bind(update.error_delta)
    .bind(update.status)
    .bind(update.last_error.as_deref())
    .bind(update.unlock)
    .bind(now)
    .bind(job_id)
    .fetch_optional(pool)
    .await?;
    job.ok_or_else(|| RepoError::NotFound(format!("Import job {job_id} not found")))
}

// ========== Work items ==========

pub async fn load_pending_items(
    pool: &SqlitePool,
    job_id: i64,
    limit: i64,
) -> RepoResult<Vec<ShipmentImportJobItem>> {
    let limit = limit.clamp(1, MAX_ITEM_BATCH);
    let items = sqlx::query_as::<_, ShipmentImportJobItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM shipment_import_job_item \
         WHERE job_id = ? AND status = 'pending' ORDER BY id ASC LIMIT ?"
    ))
    .bind(job_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

/// Bump attempts on a batch of items (crash visibility / retry signal)
pub async fn increment_item_attempts(pool: &SqlitePool, item_ids: &[i64]) -> RepoResult<()> {
    if item_ids.is_empty() {
        return Ok(());
    }
    let now = now_millis();
    let placeholders = vec!["?"; item_ids.len()].join(", ");
    let sql = format!(
        "UPDATE shipment_import_job_item SET attempts = attempts + 1, updated_at = ? WHERE id IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(now);
    for id in item_ids {
        query = query.bind(id);
    }
    query.execute(pool).await?;
    Ok(())
}

/// Transition a batch of items to succeeded/failed
pub async fn mark_items_result(
    pool: &SqlitePool,
    item_ids: &[i64],
    status: JobItemStatus,
    error_message: Option<&str>,
) -> RepoResult<()> {
    if item_ids.is_empty() {
        return Ok(());
    }
    let now = now_millis();
    let placeholders = vec!["?"; item_ids.len()].join(", ");
    let sql = format!(
        "UPDATE shipment_import_job_item SET status = ?, error_message = ?, updated_at = ? WHERE id IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(status).bind(error_message).bind(now);
    for id in item_ids {
        query = query.bind(id);
    }
    query.execute(pool).await?;
    Ok(())
}

pub async fn count_pending_items(pool: &SqlitePool, job_id: i64) -> RepoResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM shipment_import_job_item WHERE job_id = ? AND status = 'pending'",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Most recent failed items, for the operator-facing job summary
pub async fn recent_failures(
    pool: &SqlitePool,
    job_id: i64,
    limit: i64,
) -> RepoResult<Vec<ItemFailure>> {
    let failures = sqlx::query_as::<_, ItemFailure>(
        "SELECT id AS item_id, order_id, line_item_id, error_message \
         FROM shipment_import_job_item \
         WHERE job_id = ? AND status = 'failed' \
         ORDER BY updated_at DESC, id DESC LIMIT ?",
    )
    .bind(job_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    async fn test_pool() -> SqlitePool {
        DbService::in_memory().await.unwrap().pool
    }

    fn selection(order_id: i64, line_item_id: i64, quantity: Option<i64>) -> ShipmentSelection {
        ShipmentSelection {
            order_id: Some(order_id),
            line_item_id: Some(line_item_id),
            quantity,
        }
    }

    #[tokio::test]
    async fn create_job_dedupes_and_clamps() {
        let pool = test_pool().await;
        let job = create_job(
            &pool,
            7,
            "TRK-1",
            "yamato",
            &[
                selection(1, 10, Some(3)),
                selection(1, 10, Some(99)), // duplicate pair, dropped
                selection(1, 11, Some(0)),  // clamped up to 1
                selection(2, 20, Some(123_456)), // clamped down to 9999
                selection(2, 21, None),     // no explicit quantity
            ],
        )
        .await
        .unwrap();

        assert_eq!(job.total_count, 4);
        assert_eq!(job.status, JobStatus::Pending);

        let items = load_pending_items(&pool, job.id, 200).await.unwrap();
        assert_eq!(items.len(), 4);
        let quantities: Vec<Option<i64>> = items.iter().map(|i| i.quantity).collect();
        assert!(quantities.contains(&Some(3)));
        assert!(quantities.contains(&Some(1)));
        assert!(quantities.contains(&Some(9999)));
        assert!(quantities.contains(&None));
    }

    #[tokio::test]
    async fn create_job_rejects_empty_selections() {
        let pool = test_pool().await;
        let err = create_job(&pool, 7, "TRK-1", "yamato", &[]).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[tokio::test]
    async fn claim_is_exclusive_across_concurrent_claimants() {
        let pool = test_pool().await;
        let job = create_job(&pool, 7, "TRK-1", "yamato", &[selection(1, 10, Some(1))])
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                claim_pending_jobs(&pool, 1).await.unwrap().len()
            }));
        }

        let mut total_claimed = 0;
        for handle in handles {
            total_claimed += handle.await.unwrap();
        }
        assert_eq!(total_claimed, 1, "exactly one claimant may win");

        let claimed = find_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.locked_at.is_some());
        assert_eq!(claimed.attempts, 1);
    }

    #[tokio::test]
    async fn fresh_lock_is_never_reclaimed() {
        let pool = test_pool().await;
        let job = create_job(&pool, 7, "TRK-1", "yamato", &[selection(1, 10, Some(1))])
            .await
            .unwrap();
        claim_pending_jobs(&pool, 1).await.unwrap();

        let reclaimable = list_reclaimable_job_ids(&pool, 5, 30).await.unwrap();
        assert!(reclaimable.is_empty());

        let reclaimed = claim_job_by_id(&pool, job.id, 30).await.unwrap();
        assert!(reclaimed.is_none(), "a live lock must not be stolen");
    }

    #[tokio::test]
    async fn stale_lock_is_always_reclaimable() {
        let pool = test_pool().await;
        let job = create_job(&pool, 7, "TRK-1", "yamato", &[selection(1, 10, Some(1))])
            .await
            .unwrap();
        claim_pending_jobs(&pool, 1).await.unwrap();

        // Backdate the lock past the maximum threshold
        let stale = now_millis() - 4000 * 1000;
        sqlx::query("UPDATE shipment_import_job SET locked_at = ? WHERE id = ?")
            .bind(stale)
            .bind(job.id)
            .execute(&pool)
            .await
            .unwrap();

        let reclaimable = list_reclaimable_job_ids(&pool, 5, 90).await.unwrap();
        assert_eq!(reclaimable, vec![job.id]);

        let reclaimed = claim_job_by_id(&pool, job.id, 90).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn crashed_claim_with_null_lock_is_reclaimed_first() {
        let pool = test_pool().await;
        let job_a = create_job(&pool, 7, "TRK-1", "yamato", &[selection(1, 10, Some(1))])
            .await
            .unwrap();
        let job_b = create_job(&pool, 7, "TRK-2", "yamato", &[selection(2, 20, Some(1))])
            .await
            .unwrap();
        claim_pending_jobs(&pool, 2).await.unwrap();

        let stale = now_millis() - 200 * 1000;
        sqlx::query("UPDATE shipment_import_job SET locked_at = NULL WHERE id = ?")
            .bind(job_b.id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE shipment_import_job SET locked_at = ? WHERE id = ?")
            .bind(stale)
            .bind(job_a.id)
            .execute(&pool)
            .await
            .unwrap();

        let reclaimable = list_reclaimable_job_ids(&pool, 5, 90).await.unwrap();
        assert_eq!(reclaimable, vec![job_b.id, job_a.id]);
    }

    #[tokio::test]
    async fn progress_counters_and_unlock() {
        let pool = test_pool().await;
        let job = create_job(
            &pool,
            7,
            "TRK-1",
            "yamato",
            &[selection(1, 10, Some(1)), selection(1, 11, Some(1))],
        )
        .await
        .unwrap();
        claim_pending_jobs(&pool, 1).await.unwrap();

        let updated = update_job_progress(
            &pool,
            job.id,
            &JobProgressUpdate {
                processed_delta: 1,
                error_delta: 1,
                status: Some(JobStatus::Failed),
                last_error: Some("boom".into()),
                unlock: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.processed_count, 1);
        assert_eq!(updated.error_count, 1);
        assert!(updated.processed_count + updated.error_count <= updated.total_count);
        assert_eq!(updated.status, JobStatus::Failed);
        assert_eq!(updated.last_error.as_deref(), Some("boom"));
        assert!(updated.locked_at.is_none());
    }

    #[tokio::test]
    async fn item_result_transitions_and_failure_listing() {
        let pool = test_pool().await;
        let job = create_job(
            &pool,
            7,
            "TRK-1",
            "yamato",
            &[selection(1, 10, Some(1)), selection(2, 20, Some(1))],
        )
        .await
        .unwrap();

        let items = load_pending_items(&pool, job.id, 200).await.unwrap();
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        increment_item_attempts(&pool, &ids).await.unwrap();
        mark_items_result(&pool, &ids[..1], JobItemStatus::Succeeded, None)
            .await
            .unwrap();
        mark_items_result(&pool, &ids[1..], JobItemStatus::Failed, Some("no stock"))
            .await
            .unwrap();

        assert_eq!(count_pending_items(&pool, job.id).await.unwrap(), 0);

        let failures = recent_failures(&pool, job.id, 5).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_message.as_deref(), Some("no stock"));

        let remaining = load_pending_items(&pool, job.id, 200).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn stale_threshold_is_clamped() {
        assert_eq!(clamp_stale_secs(5), 30);
        assert_eq!(clamp_stale_secs(90), 90);
        assert_eq!(clamp_stale_secs(10_000), 3600);
    }
}
