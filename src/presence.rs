//! Presence registry: which live connection reports which bus.
//!
//! Only consulted to find the bus to take offline when a connection drops
//! without an explicit stop. Never persisted.

use std::collections::HashMap;

/// Identifier assigned to each WebSocket connection.
pub type ConnId = String;

/// Connection -> normalized bus number.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<ConnId, String>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `conn_id` now reports `bus_number`.
    ///
    /// Returns the bus previously registered for this connection, if any.
    pub fn register(&mut self, conn_id: &str, bus_number: String) -> Option<String> {
        self.entries.insert(conn_id.to_string(), bus_number)
    }

    pub fn lookup(&self, conn_id: &str) -> Option<&str> {
        self.entries.get(conn_id).map(String::as_str)
    }

    /// Removes the entry, returning the bus it pointed to.
    pub fn unregister(&mut self, conn_id: &str) -> Option<String> {
        self.entries.remove(conn_id)
    }

    /// Number of connections currently reporting a bus.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
