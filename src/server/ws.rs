//! WebSocket handler for the real-time channel.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::server::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles an individual WebSocket connection.
///
/// The connection subscribes before the snapshot is loaded, so nothing
/// broadcast in between is lost; those events queue up behind the snapshot.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let mut rx = state.subscribe();

    // Snapshot goes out before any broadcast
    if let Some(snapshot) = state.hub.snapshot().await {
        if sender.send(Message::Text(snapshot)).await.is_err() {
            tracing::debug!(conn_id = %conn_id, "Client left before snapshot");
            return;
        }
    }

    // Forward broadcasts to this socket
    let task_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(conn_id = %task_conn_id, skipped, "Slow client missed events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Inbound frames are handled one at a time, in arrival order
    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => state.hub.handle_text(&conn_id, &text),
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong handled by axum; binary frames are not part of the protocol
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    state.hub.disconnect(&conn_id);
    send_task.abort();

    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
