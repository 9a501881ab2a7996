//! Broadcast hub: the real-time core.
//!
//! Validates driver events, updates presence, queues persistence and fans
//! the resulting events out to every connected socket. One hub instance owns
//! the presence registry; there is no global state.

pub mod persist;
pub mod protocol;
pub mod session;

pub use persist::{PersistOp, Persister};
pub use protocol::{ClientEvent, DriverCommand, ServerEvent};
pub use session::{transition, DriverState, Effect};

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::presence::PresenceRegistry;
use crate::store::BusStore;

/// Shared broadcast hub.
pub struct BroadcastHub {
    store: Arc<dyn BusStore>,
    presence: Mutex<PresenceRegistry>,
    events_tx: broadcast::Sender<String>,
    persister: Persister,
}

impl BroadcastHub {
    /// Creates a hub over `store`. `capacity` bounds how far a slow socket may
    /// lag behind before it starts missing events.
    pub fn new(store: Arc<dyn BusStore>, capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity);
        let persister = Persister::spawn(Arc::clone(&store));

        Self {
            store,
            presence: Mutex::new(PresenceRegistry::new()),
            events_tx,
            persister,
        }
    }

    /// The store this hub persists to.
    pub fn store(&self) -> Arc<dyn BusStore> {
        Arc::clone(&self.store)
    }

    /// Subscribes to every event broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events_tx.subscribe()
    }

    /// Builds the connection-scoped `buses:all` message.
    ///
    /// Returns `None` if the store cannot be read; the connection then simply
    /// starts from incremental events.
    pub async fn snapshot(&self) -> Option<String> {
        let store = self.store();
        let result = tokio::task::spawn_blocking(move || store.list_active()).await;

        let buses = match result {
            Ok(Ok(buses)) => buses,
            Ok(Err(e)) => {
                tracing::error!(?e, "Failed to load active buses");
                return None;
            }
            Err(e) => {
                tracing::error!(?e, "Snapshot task failed");
                return None;
            }
        };

        match ServerEvent::BusesAll(buses).to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!(?e, "Failed to encode snapshot");
                None
            }
        }
    }

    /// Handles one raw text frame from `conn_id`. Malformed frames are dropped.
    pub fn handle_text(&self, conn_id: &str, text: &str) {
        let event = match ClientEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(conn_id, error = %e, "Ignoring unparseable frame");
                return;
            }
        };

        match event.validate() {
            Some(command) => self.handle(conn_id, command),
            None => tracing::debug!(conn_id, "Ignoring malformed driver event"),
        }
    }

    /// Runs a validated command through the driver state machine.
    pub fn handle(&self, conn_id: &str, command: DriverCommand) {
        // Held across the whole transition so the queue order of writes matches
        // the order events reach subscribers.
        let mut presence = match self.presence.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let state = match presence.lookup(conn_id) {
            Some(bus_number) => DriverState::Active {
                bus_number: bus_number.to_string(),
            },
            None => DriverState::Disconnected,
        };

        let (next, effects) = transition(&state, command, Utc::now());
        if next != state {
            tracing::info!(conn_id, from = ?state, to = ?next, "Driver state changed");
        }

        for effect in effects {
            match effect {
                Effect::Register(bus_number) => {
                    let previous = presence
                        .register(conn_id, bus_number)
                        .filter(|prev| presence.lookup(conn_id) != Some(prev.as_str()));
                    // The old bus stays active until stopped; last write wins
                    if let Some(previous) = previous {
                        tracing::debug!(conn_id, previous = %previous, "Connection switched bus");
                    }
                }
                Effect::Unregister => {
                    presence.unregister(conn_id);
                }
                Effect::Persist(op) => self.persister.submit(op),
                Effect::Broadcast(event) => self.broadcast(&event),
            }
        }
    }

    /// Connection closed: equivalent to a stop for whatever bus it reported.
    pub fn disconnect(&self, conn_id: &str) {
        self.handle(conn_id, DriverCommand::Disconnect);
    }

    /// Waits for every queued store write to land.
    pub async fn flush(&self) {
        self.persister.flush().await;
    }

    /// Number of connections currently reporting a bus.
    pub fn active_drivers(&self) -> usize {
        self.presence.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn broadcast(&self, event: &ServerEvent) {
        match event.to_json() {
            // Err only means nobody is listening
            Ok(json) => {
                let _ = self.events_tx.send(json);
            }
            Err(e) => tracing::error!(?e, "Failed to encode event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::store::{Bus, BusUpdate, StoreError};
    use serde_json::{json, Value};

    const CAPACITY: usize = 64;

    fn hub() -> (BroadcastHub, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (BroadcastHub::new(db.clone(), CAPACITY), db)
    }

    fn send(hub: &BroadcastHub, conn_id: &str, frame: Value) {
        hub.handle_text(conn_id, &frame.to_string());
    }

    fn drain(rx: &mut broadcast::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(serde_json::from_str(&msg).unwrap());
        }
        out
    }

    /// Store that rejects every operation.
    struct BrokenStore;

    impl BusStore for BrokenStore {
        fn upsert_bus(&self, _: &str, _: &BusUpdate) -> Result<Bus, StoreError> {
            Err(StoreError::LockPoisoned)
        }
        fn set_active(&self, _: &str, _: bool) -> Result<bool, StoreError> {
            Err(StoreError::LockPoisoned)
        }
        fn list_active(&self) -> Result<Vec<Bus>, StoreError> {
            Err(StoreError::LockPoisoned)
        }
        fn list_all(&self) -> Result<Vec<Bus>, StoreError> {
            Err(StoreError::LockPoisoned)
        }
        fn get_bus(&self, _: &str) -> Result<Option<Bus>, StoreError> {
            Err(StoreError::LockPoisoned)
        }
    }

    #[tokio::test]
    async fn test_start_then_update_scenario() {
        let (hub, db) = hub();
        let mut rx = hub.subscribe();

        send(
            &hub,
            "driver",
            json!({"event": "driver:start", "data": {
                "busNumber": "bus-9", "busName": "Loop A", "driverName": "Asha", "driverId": "d1"
            }}),
        );
        send(
            &hub,
            "driver",
            json!({"event": "driver:updateLocation", "data": {
                "busNumber": "BUS-9", "lat": 22.5, "lng": 75.8
            }}),
        );

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            json!({"event": "bus:online", "data": {
                "busNumber": "BUS-9", "busName": "Loop A", "driverName": "Asha"
            }})
        );
        assert_eq!(events[1]["event"], "bus:locationUpdated");
        assert_eq!(events[1]["data"]["busNumber"], "BUS-9");
        assert_eq!(events[1]["data"]["lat"], 22.5);
        assert_eq!(events[1]["data"]["lng"], 75.8);
        assert!(events[1]["data"]["updatedAt"].is_string());

        hub.flush().await;
        let bus = db.get_bus("BUS-9").unwrap().unwrap();
        assert!(bus.is_active);
        assert_eq!(bus.bus_name.as_deref(), Some("Loop A"));
        assert_eq!(bus.driver_id.as_deref(), Some("d1"));
        assert_eq!(bus.current_location.map(|l| (l.lat, l.lng)), Some((22.5, 75.8)));
    }

    #[tokio::test]
    async fn test_mixed_case_hits_single_record() {
        let (hub, db) = hub();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "bus-7"}}));
        send(
            &hub,
            "c1",
            json!({"event": "driver:updateLocation", "data": {"busNumber": "BUS-7", "lat": 1.0, "lng": 2.0}}),
        );
        hub.flush().await;

        let all = db.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].bus_number, "BUS-7");
    }

    #[tokio::test]
    async fn test_malformed_events_change_nothing() {
        let (hub, db) = hub();
        let mut rx = hub.subscribe();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": ""}}));
        send(
            &hub,
            "c1",
            json!({"event": "driver:updateLocation", "data": {"busNumber": "B1", "lat": "abc", "lng": 2.0}}),
        );
        send(&hub, "c1", json!({"event": "driver:stop", "data": {"busNumber": ""}}));
        hub.handle_text("c1", "{garbage");
        hub.flush().await;

        assert!(drain(&mut rx).is_empty());
        assert!(db.list_all().unwrap().is_empty());
        assert_eq!(hub.active_drivers(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_without_stop() {
        let (hub, db) = hub();
        let mut rx = hub.subscribe();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "B1"}}));
        hub.disconnect("c1");
        // A second close notification must not re-announce
        hub.disconnect("c1");
        hub.flush().await;

        let offline: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| e["event"] == "bus:offline")
            .collect();
        assert_eq!(offline, vec![json!({"event": "bus:offline", "data": {"busNumber": "B1"}})]);

        assert!(!db.get_bus("B1").unwrap().unwrap().is_active);
        assert_eq!(hub.active_drivers(), 0);
    }

    #[tokio::test]
    async fn test_stop_then_disconnect_announces_once() {
        let (hub, _db) = hub();
        let mut rx = hub.subscribe();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "B1"}}));
        send(&hub, "c1", json!({"event": "driver:stop", "data": {"busNumber": "b1"}}));
        hub.disconnect("c1");

        let offline = drain(&mut rx)
            .into_iter()
            .filter(|e| e["event"] == "bus:offline")
            .count();
        assert_eq!(offline, 1);
    }

    #[tokio::test]
    async fn test_final_active_flag_follows_last_event() {
        let (hub, db) = hub();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "B1"}}));
        send(&hub, "c1", json!({"event": "driver:stop", "data": {"busNumber": "B1"}}));
        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "b1"}}));
        hub.flush().await;
        assert!(db.get_bus("B1").unwrap().unwrap().is_active);

        send(&hub, "c1", json!({"event": "driver:stop", "data": {"busNumber": "B1"}}));
        hub.flush().await;
        assert!(!db.get_bus("B1").unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_viewer_disconnect_is_silent() {
        let (hub, _db) = hub();
        let mut rx = hub.subscribe();

        hub.disconnect("viewer");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_broadcast() {
        let hub = BroadcastHub::new(Arc::new(BrokenStore), CAPACITY);
        let mut rx = hub.subscribe();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "B1"}}));
        hub.disconnect("c1");
        hub.flush().await;

        let names: Vec<_> = drain(&mut rx)
            .into_iter()
            .map(|e| e["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["bus:online", "bus:offline"]);
        assert!(hub.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_lists_only_active() {
        let (hub, _db) = hub();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "A1"}}));
        send(&hub, "c2", json!({"event": "driver:start", "data": {"busNumber": "B2"}}));
        send(&hub, "c2", json!({"event": "driver:stop", "data": {"busNumber": "B2"}}));
        hub.flush().await;

        let snapshot: Value = serde_json::from_str(&hub.snapshot().await.unwrap()).unwrap();
        assert_eq!(snapshot["event"], "buses:all");
        let buses = snapshot["data"].as_array().unwrap();
        assert_eq!(buses.len(), 1);
        assert_eq!(buses[0]["busNumber"], "A1");
        assert_eq!(buses[0]["isActive"], true);
    }

    #[tokio::test]
    async fn test_independent_drivers() {
        let (hub, db) = hub();

        send(&hub, "c1", json!({"event": "driver:start", "data": {"busNumber": "A1"}}));
        send(&hub, "c2", json!({"event": "driver:start", "data": {"busNumber": "B2"}}));
        hub.disconnect("c1");
        hub.flush().await;

        assert!(!db.get_bus("A1").unwrap().unwrap().is_active);
        assert!(db.get_bus("B2").unwrap().unwrap().is_active);
        assert_eq!(hub.active_drivers(), 1);
    }
}
