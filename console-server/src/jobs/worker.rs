//! ImportSweepWorker — background worker that advances queued import jobs
//!
//! Periodically runs one bounded sweep of the job queue and retries
//! shipments whose external sync was deferred. The worker holds no state of
//! its own; crash recovery is entirely the job store's concern.

use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::fulfillment::FulfillmentService;
use crate::jobs::runner::{ImportJobRunner, SweepLimits};

pub struct ImportSweepWorker {
    runner: Arc<ImportJobRunner>,
    fulfillment: Arc<FulfillmentService>,
    limits: SweepLimits,
    interval: Duration,
    sync_retry_batch: i64,
    shutdown: CancellationToken,
}

impl ImportSweepWorker {
    pub fn new(
        runner: Arc<ImportJobRunner>,
        fulfillment: Arc<FulfillmentService>,
        limits: SweepLimits,
        interval: Duration,
        sync_retry_batch: i64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            runner,
            fulfillment,
            limits,
            interval,
            sync_retry_batch,
            shutdown,
        }
    }

    /// Run the sweep loop until shutdown
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            job_limit = self.limits.job_limit,
            item_limit = self.limits.item_limit,
            "ImportSweepWorker started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("ImportSweepWorker shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        tracing::info!("ImportSweepWorker stopped");
    }

    async fn sweep_once(&self) {
        match self.runner.process_jobs(self.limits).await {
            Ok(summary) if summary.claimed > 0 => {
                tracing::debug!(
                    claimed = summary.claimed,
                    requeued = summary.requeued,
                    "Sweep advanced import jobs"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Import job sweep failed");
            }
        }

        match self
            .fulfillment
            .retry_pending_shipment_syncs(self.sync_retry_batch)
            .await
        {
            Ok(0) => {}
            Ok(n) => tracing::info!(synced = n, "Deferred shipment syncs completed"),
            Err(e) => tracing::error!(error = %e, "Deferred shipment sync sweep failed"),
        }
    }
}
