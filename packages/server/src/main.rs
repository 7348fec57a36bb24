use std::sync::Arc;

use anyhow::Context;
use common::storage::filesystem::FilesystemBlobStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use server::config::AppConfig;
use server::maintenance::run_maintenance_scheduler;
use server::state::AppState;
use server::store::SeaOrmRecordStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = server::database::init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    let blob_store = FilesystemBlobStore::new(config.storage.uploads_dir.clone())
        .await
        .with_context(|| {
            format!(
                "Failed to open uploads directory {}",
                config.storage.uploads_dir.display()
            )
        })?;

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        config.clone(),
        Arc::new(SeaOrmRecordStore::new(db.clone())),
        Arc::new(blob_store),
        shutdown.clone(),
    );

    let scheduler = config.maintenance.schedule_interval().map(|interval| {
        tokio::spawn(run_maintenance_scheduler(
            state.maintenance.clone(),
            state.inventory.clone(),
            interval,
            shutdown.clone(),
        ))
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        %addr,
        display_mode = ?config.display.mode,
        uploads_dir = %config.storage.uploads_dir.display(),
        "Server listening"
    );

    axum::serve(listener, server::build_router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler
        && let Err(e) = handle.await
    {
        error!(error = %e, "Maintenance scheduler task failed");
    }
    db.close().await.context("Failed to close database")?;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = token.cancelled() => {}
    }
    token.cancel();
}
