use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use staff_desk::config::DeskConfig;
use staff_desk::desk::{TaskDesk, spawn_assignment_sweep};
use staff_desk::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = DeskConfig::from_env().context("invalid configuration")?;

    eprintln!("Staff desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Sweep: every {}s", config.sweep_interval.as_secs());

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open {}", config.db_path.display()))?,
    );

    let desk = Arc::new(TaskDesk::with_event_capacity(db, config.event_capacity));
    let sweep = spawn_assignment_sweep(Arc::clone(&desk), config.sweep_interval);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutting down");
    sweep.abort();
    Ok(())
}
