//! Warehouse Ops API - operational tooling for an Azure data warehouse
//!
//! Surfaces ETL pipeline health from the warehouse's control tables and
//! drives Azure Data Factory pipeline runs:
//! - Metrics: today's load summary, recent loads, data-quality score
//! - Schema: verification of the staging/dimension objects ETL relies on
//! - Orchestration: trigger runs, inspect them, and wait for completion

mod config;
mod db;
mod error;
mod metrics;
mod models;
mod orchestration;
mod routes;
mod schema_check;
mod state;
#[cfg(test)]
mod testing;

use crate::config::Settings;
use crate::db::{Warehouse, WarehouseClient};
use crate::orchestration::credential::AzureCredential;
use crate::orchestration::poller::cancel_channel;
use crate::orchestration::{DataFactoryClient, PipelineOrchestrator, RunPoller};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("Starting Warehouse Ops API...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let warehouse = WarehouseClient::new(&settings.database)?;
    // Per-request connections: an unreachable warehouse at boot is not fatal.
    match warehouse.ping().await {
        Ok(()) => info!("Warehouse connection verified"),
        Err(e) => warn!("Warehouse not reachable at startup: {}", e),
    }

    let orchestrator: Option<Arc<dyn PipelineOrchestrator>> = match &settings.data_factory {
        Some(factory) => {
            let credential = AzureCredential::from_env(&factory.management_endpoint)?;
            info!("Using Azure credential {:?}", credential);
            Some(Arc::new(DataFactoryClient::new(factory, credential)?))
        }
        None => {
            warn!("Data Factory not configured; orchestration endpoints will return 503");
            None
        }
    };

    info!(
        "Pipeline waits poll every {:?} and give up after {:?}",
        settings.poll.interval, settings.poll.timeout
    );

    let (shutdown_tx, shutdown_rx) = cancel_channel();
    let state = Arc::new(AppState::new(
        Arc::new(warehouse),
        orchestrator,
        RunPoller::new(settings.poll),
        shutdown_rx,
    ));

    // Build the router
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("API Endpoints:");
    info!("   GET  /api/health                         - Liveness");
    info!("   GET  /api/health/ready                   - Warehouse readiness");
    info!("   GET  /api/metrics/summary                - Today's load summary");
    info!("   GET  /api/pipelines/recent?limit=N       - Recent control rows");
    info!("   GET  /api/data-quality/score             - Data-quality score");
    info!("   GET  /api/warehouse/schema               - Schema verification");
    info!("   POST /api/pipelines/trigger              - Trigger a pipeline");
    info!("   GET  /api/pipelines/runs?hours=H         - Runs in a time window");
    info!("   GET  /api/pipelines/runs/:run_id         - Run status");
    info!("   POST /api/pipelines/runs/:run_id/wait    - Wait for completion");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,warehouse_ops=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
///
/// Also releases in-flight pipeline waits so the server can drain.
async fn shutdown_signal(waits: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }

    let _ = waits.send(true);
}
