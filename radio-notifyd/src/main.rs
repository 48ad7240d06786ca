mod api;
mod catalog;
mod config;
mod notifier;
mod playback;
mod scoreboard;
mod sink;
mod store;
mod store_manager;
#[cfg(test)]
mod test_support;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::catalog::StationCatalog;
use crate::config::{Config, StoreBackend};
use crate::notifier::Notifier;
use crate::playback::{PlaybackLifecycle, VoiceRegistry};
use crate::scoreboard::ScoreboardClient;
use crate::sink::WebhookSink;
use crate::store::{ActivityStore, MemoryStore, SqliteStore};
use crate::store_manager::StoreHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("radio_notifyd=info"))
        )
        .init();

    tracing::info!("Starting radio-notifyd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/radio-notify/notifyd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Open the activity store
    let backend: Box<dyn ActivityStore> = match config.store.backend {
        StoreBackend::Sqlite => {
            let db = SqliteStore::open(&config.store.db_path)?;
            tracing::info!("Opened database at {:?}", config.store.db_path);
            Box::new(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, activity is lost on restart");
            Box::new(MemoryStore::new())
        }
    };
    let store = StoreHandle::spawn(backend);

    let catalog = Arc::new(StationCatalog::load(&store, &config.stations).await?);
    if catalog.is_empty() {
        tracing::warn!("No stations configured, playback requests will be rejected");
    }

    // Scoreboard client and webhook sink share one connection pool
    let http = reqwest::Client::new();
    let fetch_timeout = Duration::from_secs(config.notifier.fetch_timeout_secs);
    let mut scoreboard = ScoreboardClient::with_client(http.clone(), fetch_timeout);
    if let Some(path) = &config.notifier.headers_path {
        scoreboard = scoreboard.with_headers(ScoreboardClient::load_headers(path)?);
        tracing::info!("Loaded scoreboard headers from {}", path.display());
    }
    let sink = WebhookSink::new(http, &config.channels, fetch_timeout);

    let playback = PlaybackLifecycle::new(store.clone(), catalog.clone());
    let voice = Arc::new(VoiceRegistry::new());

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn notifier task
    let notifier = Notifier::new(store.clone(), catalog.clone(), scoreboard, sink);
    let notifier_interval = Duration::from_secs(config.notifier.interval_secs);
    let notifier_handle = spawn_worker("Notifier", cancel.clone(), {
        let cancel = cancel.clone();
        async move { notifier.run(notifier_interval, cancel).await }
    });

    // Spawn liveness sweep task
    let liveness_interval = Duration::from_secs(config.notifier.liveness_interval_secs);
    let liveness_handle = spawn_worker("Liveness sweep", cancel.clone(), playback::run_liveness(
        playback.clone(),
        voice.clone(),
        liveness_interval,
        cancel.clone(),
    ));

    // Build API router
    let app_state = api::routes::AppState {
        store: store.clone(),
        catalog: catalog.clone(),
        playback,
        voice,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal or a fatal task failure
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutdown signal received");
        }
        _ = cancel.cancelled() => {
            tracing::error!("Fatal error, shutting down");
        }
    }

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let (notifier_result, liveness_result, _) =
        tokio::join!(notifier_handle, liveness_handle, server_handle);

    // Shutdown store thread
    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    notifier_result.context("Notifier task panicked")??;
    liveness_result.context("Liveness task panicked")??;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Spawn a long-running task. Its end, by error or panic, shuts the daemon down.
fn spawn_worker<F>(name: &'static str, cancel: CancellationToken, task: F) -> JoinHandle<Result<()>>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let _shutdown = cancel.drop_guard();
        let result = task.await;
        if let Err(e) = &result {
            tracing::error!("{} error: {:#}", name, e);
        }
        result
    })
}
