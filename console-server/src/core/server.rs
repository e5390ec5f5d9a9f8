//! Server Implementation
//!
//! HTTP 服务器启动和后台任务装配

use tokio::time::Duration;

use crate::api;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, ServerState};
use crate::jobs::worker::ImportSweepWorker;
use crate::utils::AppError;

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state (tests inject a prepared state)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<(), AppError> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config).await,
        };

        // Background workers
        let mut tasks = BackgroundTasks::new();
        let worker = ImportSweepWorker::new(
            state.runner.clone(),
            state.fulfillment.clone(),
            state.sweep_limits(),
            Duration::from_secs(self.config.sweep_interval_secs),
            self.config.sync_retry_batch,
            tasks.shutdown_token(),
        );
        tasks.spawn("import_sweep", TaskKind::Periodic, worker.run());
        tracing::info!("Background tasks registered: {}", tasks.len());

        let app = api::build_app(&state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        tracing::info!("Fulfillment console listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down...");
            })
            .await
            .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

        tasks.shutdown().await;
        Ok(())
    }
}
