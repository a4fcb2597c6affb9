//! Relay server binary
//!
//! Configuration comes from the environment:
//! - `RELAY_BIND`: listen address (default `0.0.0.0:8080`)
//! - `RELAY_DB`: sqlite database path (default `urls.db`)
//! - `RUST_LOG`: tracing filter (default `relay_rs=info`)

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use relay_rs::http::{router, AppState};
use relay_rs::relay::RelayManager;
use relay_rs::store::{SqliteStore, StreamStore};
use relay_rs::ServerConfig;

#[tokio::main]
async fn main() -> relay_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay_rs=info")),
        )
        .init();

    let config = config_from_env();

    let store = SqliteStore::open(&config.db_path)?;
    store.init()?;
    let store: Arc<dyn StreamStore> = Arc::new(store);

    let client = reqwest::Client::builder().build()?;
    let manager = Arc::new(RelayManager::new(config.relay.clone(), client));
    let cleanup = manager.spawn_cleanup_task();

    let app = router(AppState {
        manager,
        store,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, db = %config.db_path.display(), "Relay server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cleanup.abort();
    Ok(())
}

fn config_from_env() -> ServerConfig {
    let mut config = ServerConfig::default();

    if let Ok(bind) = std::env::var("RELAY_BIND") {
        match bind.parse::<SocketAddr>() {
            Ok(addr) => config = config.bind(addr),
            Err(e) => tracing::warn!(value = %bind, error = %e, "Ignoring invalid RELAY_BIND"),
        }
    }

    if let Ok(db) = std::env::var("RELAY_DB") {
        config = config.db_path(db);
    }

    config
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
