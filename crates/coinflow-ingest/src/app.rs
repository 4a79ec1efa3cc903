//! Main application orchestration.
//!
//! Builds the pipeline from configuration, runs the feed supervisor on the
//! current task until Ctrl-C, then performs the final flush.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::pipeline::IngestPipeline;
use coinflow_feed::TickerNormalizer;
use coinflow_persistence::{MemorySink, PgTickStore, TickSink};
use coinflow_telemetry::serve;
use coinflow_ws::{ConnectionConfig, ConnectionManager};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    /// Keep records in memory instead of writing to PostgreSQL.
    dry_run: bool,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let tracked = self.config.tracked_symbols()?;
        let buffer = self.config.buffer.buffer_config()?;
        info!(
            symbols = ?tracked.sorted().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            size_threshold = buffer.size_threshold,
            time_threshold_ms = buffer.time_threshold.as_millis() as u64,
            max_retained = buffer.max_retained,
            "Pipeline configured"
        );

        let connection = ConnectionManager::new(ConnectionConfig::from(&self.config.feed));
        let shutdown = connection.shutdown_token();
        spawn_signal_handler(shutdown.clone());
        let metrics_task = self.start_metrics_server(shutdown.clone()).await?;

        let normalizer = TickerNormalizer::new(tracked);
        if self.dry_run {
            warn!("Dry run: records are kept in memory and discarded at exit");
            let pipeline = IngestPipeline::new(normalizer, buffer, MemorySink::new());
            let sink = drive(connection, pipeline).await;
            info!(rows = sink.len(), "Dry run finished");
        } else {
            let store = self.open_store().await?;
            let pipeline = IngestPipeline::new(normalizer, buffer, store);
            drive(connection, pipeline).await.close().await;
        }

        // Supervisor has returned; make sure the metrics server stops too
        shutdown.cancel();
        if let Some(task) = metrics_task {
            if let Err(e) = task.await {
                warn!(error = %e, "Metrics server task failed");
            }
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Connect to the store and bootstrap the schema.
    ///
    /// An unreachable store is not fatal: the pipeline starts disconnected,
    /// buffers, and reconnects on its first flush.
    async fn open_store(&self) -> AppResult<PgTickStore> {
        let db = &self.config.database;
        let store_config = db.store_config();

        match PgTickStore::connect(store_config.clone()).await {
            Ok(mut store) => {
                if db.ensure_schema {
                    store.ensure_schema().await?;
                }
                Ok(store)
            }
            Err(e) => {
                error!(
                    host = %db.host,
                    port = db.port,
                    error = %e,
                    "Store unreachable at startup, buffering until it returns"
                );
                if db.ensure_schema {
                    warn!("Schema bootstrap skipped; tables must already exist");
                }
                Ok(PgTickStore::disconnected(store_config))
            }
        }
    }

    /// Bind `/metrics` and `/health` unless the port is 0.
    async fn start_metrics_server(
        &self,
        shutdown: CancellationToken,
    ) -> AppResult<Option<JoinHandle<()>>> {
        let port = self.config.telemetry.metrics_port;
        if port == 0 {
            info!("Metrics server disabled");
            return Ok(None);
        }

        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        info!(port, "Starting metrics server");
        Ok(Some(tokio::spawn(async move {
            if let Err(e) = serve(listener, shutdown).await {
                error!(error = %e, "Metrics server stopped");
            }
        })))
    }
}

/// Run the supervisor to completion, then flush what is left.
async fn drive<S: TickSink + Send>(
    mut connection: ConnectionManager,
    mut pipeline: IngestPipeline<S>,
) -> S {
    connection.run(&mut pipeline).await;
    pipeline.shutdown().await;
    pipeline.into_sink()
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to install Ctrl-C handler"),
        }
    });
}
