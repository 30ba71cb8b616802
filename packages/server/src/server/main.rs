// Main entry point for the meal-request backend core

use anyhow::{Context, Result};
use mealdesk_core::common::db::connect_pool;
use mealdesk_core::kernel::{ensure_default_jobs, register_builtin_jobs, ServerKernel};
use mealdesk_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mealdesk_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting meal-request backend core");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to both data sources
    tracing::info!("Connecting to databases...");
    let db_pool = connect_pool(&config.database_url, 10)
        .await
        .context("application database")?;
    let hris_pool = connect_pool(&config.hris_database_url, 5)
        .await
        .context("HRIS database")?;
    tracing::info!("Databases connected");

    // Build the kernel and start the scheduler
    let kernel = ServerKernel::build(config, db_pool, hris_pool, None, None)
        .await
        .context("Failed to build kernel")?;
    register_builtin_jobs(&kernel)
        .await
        .map_err(|e| anyhow::anyhow!("failed to register job functions: {e}"))?;
    kernel
        .scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start scheduler: {e}"))?;
    if kernel.config.scheduler.enabled {
        ensure_default_jobs(&kernel)
            .await
            .map_err(|e| anyhow::anyhow!("failed to seed default jobs: {e}"))?;
    }

    tracing::info!("Core services running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    // Graceful shutdown: stop the scheduler, then dispose both pools before
    // the process exits.
    tracing::info!("Shutting down...");
    kernel.scheduler.stop().await;
    kernel.db_pool.close().await;
    kernel.hris_pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}
