//! HTTP server module for API and WebSocket endpoints.
//!
//! Serves the real-time channel at `/ws` plus a few read-only REST routes.

pub mod routes;
pub mod state;
pub mod ws;

use crate::server::routes::{buses, health};
use crate::server::state::AppState;
use crate::server::ws::ws_handler;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// CORS layer admitting the configured web client, with credentials.
pub fn cors_layer(client_url: &str) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    let origin = HeaderValue::from_str(client_url)?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Builds the application router.
pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Bus API
        .route("/api/buses", get(buses::list_buses))
        .route("/api/buses/active", get(buses::list_active_buses))
        .route("/api/buses/:bus_number", get(buses::get_bus))
        // WebSocket
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP server listening on http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
