//! Shared application state for the HTTP server.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::hub::BroadcastHub;
use crate::store::BusStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    /// Creates new app state around the given hub.
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.hub.subscribe()
    }

    pub fn store(&self) -> Arc<dyn BusStore> {
        self.hub.store()
    }
}
