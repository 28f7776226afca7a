use std::sync::Arc;

use playlist_transfer_core::config::AppConfig;
use playlist_transfer_core::models::task::TaskKind;
use playlist_transfer_core::providers::DefaultProviderFactory;
use playlist_transfer_core::services::credential_store::{CredentialStore, StaticCredentialStore};
use playlist_transfer_core::services::recovery_sweeper::RecoverySweeper;
use playlist_transfer_core::services::task_handler::TaskHandler;
use playlist_transfer_core::services::task_store::TaskStore;
use playlist_transfer_core::services::transfer_handler::PlaylistTransferHandler;
use playlist_transfer_core::services::worker_pool::WorkerPool;
use playlist_transfer_core::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config);

    metrics_prometheus::install();
    playlist_transfer_core::metrics::describe();

    let task_store = Arc::new(TaskStore::new(&config.redis.url)?);

    tracing::info!("running startup recovery sweep");
    let sweeper = RecoverySweeper::new(&task_store, config.worker.stale_threshold);
    match sweeper.sweep().await {
        Ok(failed) => tracing::info!(failed, "startup recovery sweep complete"),
        Err(err) => tracing::error!(%err, "startup recovery sweep failed"),
    }

    let credential_store: Arc<dyn CredentialStore> = Arc::new(StaticCredentialStore::new());
    let factory = Arc::new(DefaultProviderFactory::new(
        credential_store,
        config.providers.clone(),
        config.redis.url.clone(),
    ));

    let mut pool = WorkerPool::new(
        task_store.clone(),
        config.worker.worker_count,
        config.worker.poll_timeout,
        config.worker.heartbeat_interval,
    );
    let handler: Arc<dyn TaskHandler> = Arc::new(PlaylistTransferHandler::new(factory));
    pool.register_handler(TaskKind::UserInitiatedPlaylistTransfer, handler);
    let pool = Arc::new(pool);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_pool_handle = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run(shutdown_rx).await }
    });

    let state = AppState { task_store: task_store.clone() };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
    tracing::info!(address = %config.server.bind_address(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining workers");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = worker_pool_handle.await;
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.environment.is_production() {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
