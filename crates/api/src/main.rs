use std::time::Duration;

use anyhow::Result;
use tracing::info;

use report_scheduler_api::app;
use report_scheduler_api::config::Config;
use report_scheduler_api::jobs::{DueReportsJob, JobScheduler, PoolMetricsJob};
use report_scheduler_api::middleware;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting report scheduler v{}", env!("CARGO_PKG_VERSION"));

    let db_config: persistence::db::DatabaseConfig = (&config.database).into();
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    tokio::fs::create_dir_all(&config.renderer.artifacts_dir).await?;

    let addr = config.socket_addr()?;
    let state = app::create_state(config, pool.clone())?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool));
    if state.config.scheduler.enabled {
        scheduler.register(DueReportsJob::new(
            state.report_store.clone(),
            state.tracker.clone(),
            Duration::from_secs(state.config.scheduler.poll_interval_secs),
            state.config.scheduler.batch_size,
        ));
    } else {
        info!("Due-report poller disabled");
    }
    scheduler.start();

    let router = app::create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
