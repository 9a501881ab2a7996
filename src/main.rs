//! bustrack server binary.

use std::sync::Arc;

use bustrack::config::ServerConfig;
use bustrack::database::Database;
use bustrack::hub::BroadcastHub;
use bustrack::server::{self, state::AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bustrack=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let db = Database::open(&config.database_path)?;
    let hub = Arc::new(BroadcastHub::new(Arc::new(db), config.broadcast_capacity));

    let cors = server::cors_layer(&config.client_url)?;
    let app = server::router(Arc::new(AppState::new(Arc::clone(&hub))), cors);

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    server::serve(listener, app, shutdown_signal()).await?;

    tracing::info!("Shutting down, flushing pending writes");
    hub.flush().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "Failed to listen for Ctrl+C");
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
