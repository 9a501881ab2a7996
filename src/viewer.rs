//! Viewer session: folds server events into a local map of live buses.
//!
//! This is the client half of the protocol. It starts from the `buses:all`
//! snapshot and patches its map with each incremental event, keeping a
//! selected ("focused") bus that always points at an entry in the map.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::hub::protocol::{BusOffline, BusOnline, LocationUpdated, ServerEvent};
use crate::store::{normalize_bus_number, Bus};

/// What a viewer knows about one bus.
///
/// Empty name strings mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerBus {
    pub bus_number: String,
    pub bus_name: String,
    pub driver_name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ViewerBus {
    fn from_record(bus: Bus, bus_number: String) -> Self {
        let location = bus.current_location;
        Self {
            bus_number,
            bus_name: bus.bus_name.unwrap_or_default(),
            driver_name: bus.driver_name.unwrap_or_default(),
            lat: location.map(|l| l.lat),
            lng: location.map(|l| l.lng),
            updated_at: location.map(|l| l.updated_at),
        }
    }

    /// Overwrites a name only when the event actually carries one.
    fn merge_names(&mut self, bus_name: Option<String>, driver_name: Option<String>) {
        if let Some(name) = bus_name.filter(|n| !n.is_empty()) {
            self.bus_name = name;
        }
        if let Some(name) = driver_name.filter(|n| !n.is_empty()) {
            self.driver_name = name;
        }
    }
}

/// Per-connection display state.
///
/// Buses are kept ordered by bus number, so "the first bus" used for
/// selection repair is the lowest bus number.
#[derive(Debug, Default)]
pub struct ViewerSession {
    buses: BTreeMap<String, ViewerBus>,
    selected: Option<String>,
}

impl ViewerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event, stamping location updates that lack a time with now.
    pub fn apply(&mut self, event: ServerEvent) {
        self.apply_at(event, Utc::now());
    }

    /// Parses and applies one text frame.
    pub fn apply_json(&mut self, text: &str) -> Result<(), serde_json::Error> {
        let event = ServerEvent::parse(text)?;
        self.apply(event);
        Ok(())
    }

    /// Applies one event using `now` as the client clock.
    pub fn apply_at(&mut self, event: ServerEvent, now: DateTime<Utc>) {
        match event {
            ServerEvent::BusesAll(buses) => self.replace_all(buses),
            ServerEvent::BusOnline(online) => self.bus_online(online),
            ServerEvent::LocationUpdated(update) => self.location_updated(update, now),
            ServerEvent::BusOffline(offline) => self.bus_offline(offline),
        }
        self.repair_selection();
    }

    /// Focuses a bus. Returns `false` (and changes nothing) for unknown buses.
    pub fn select(&mut self, bus_number: &str) -> bool {
        match normalize_bus_number(bus_number) {
            Some(key) if self.buses.contains_key(&key) => {
                self.selected = Some(key);
                true
            }
            _ => false,
        }
    }

    pub fn selected(&self) -> Option<&ViewerBus> {
        self.selected.as_ref().and_then(|key| self.buses.get(key))
    }

    pub fn selected_bus_number(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn get(&self, bus_number: &str) -> Option<&ViewerBus> {
        self.buses.get(&normalize_bus_number(bus_number)?)
    }

    pub fn buses(&self) -> impl Iterator<Item = &ViewerBus> {
        self.buses.values()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    fn replace_all(&mut self, buses: Vec<Bus>) {
        self.buses = buses
            .into_iter()
            .filter_map(|bus| {
                let key = normalize_bus_number(&bus.bus_number)?;
                Some((key.clone(), ViewerBus::from_record(bus, key)))
            })
            .collect();
    }

    fn bus_online(&mut self, online: BusOnline) {
        let Some(key) = normalize_bus_number(&online.bus_number) else {
            return;
        };
        let entry = self.entry(key);
        entry.merge_names(online.bus_name, online.driver_name);
    }

    fn location_updated(&mut self, update: LocationUpdated, now: DateTime<Utc>) {
        let Some(key) = normalize_bus_number(&update.bus_number) else {
            return;
        };
        let entry = self.entry(key);
        entry.merge_names(update.bus_name, update.driver_name);
        entry.lat = Some(update.lat);
        entry.lng = Some(update.lng);
        entry.updated_at = Some(update.updated_at.unwrap_or(now));
    }

    fn bus_offline(&mut self, offline: BusOffline) {
        let Some(key) = normalize_bus_number(&offline.bus_number) else {
            return;
        };
        self.buses.remove(&key);
        if self.selected.as_deref() == Some(key.as_str()) {
            self.selected = None;
        }
    }

    fn entry(&mut self, key: String) -> &mut ViewerBus {
        self.buses.entry(key.clone()).or_insert_with(|| ViewerBus {
            bus_number: key,
            ..Default::default()
        })
    }

    fn repair_selection(&mut self) {
        let still_valid = self
            .selected
            .as_ref()
            .is_some_and(|key| self.buses.contains_key(key));

        if !still_valid {
            self.selected = self.buses.keys().next().cloned();
        }
    }
}
