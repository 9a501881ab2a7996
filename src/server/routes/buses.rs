//! Read-only bus endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::server::state::AppState;
use crate::store::{Bus, BusStore, StoreError};

/// Error body returned on failure.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal(message: &str, e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            message: message.to_string(),
            error: Some(e.to_string()),
        }),
    )
}

/// Runs a blocking store query off the async workers.
async fn query<T, F>(state: &AppState, message: &str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn BusStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store();
    match tokio::task::spawn_blocking(move || f(store.as_ref())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(?e, "{}", message);
            Err(internal(message, e))
        }
        Err(e) => Err(internal(message, e)),
    }
}

/// GET /api/buses - Every bus, ordered by bus number.
pub async fn list_buses(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Bus>>, ApiError> {
    query(&state, "Failed to fetch buses", |store| store.list_all())
        .await
        .map(Json)
}

/// GET /api/buses/active - Buses with a live driver, ordered by bus number.
pub async fn list_active_buses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Bus>>, ApiError> {
    query(&state, "Failed to fetch active buses", |store| {
        store.list_active()
    })
    .await
    .map(Json)
}

/// GET /api/buses/:bus_number - One bus, looked up case-insensitively.
pub async fn get_bus(
    State(state): State<Arc<AppState>>,
    Path(bus_number): Path<String>,
) -> Result<Json<Bus>, ApiError> {
    let bus = query(&state, "Failed to fetch bus", move |store| {
        store.get_bus(&bus_number)
    })
    .await?;

    bus.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                message: "Bus not found".to_string(),
                error: None,
            }),
        )
    })
}
