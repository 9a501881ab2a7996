//! Wire format of the real-time channel.
//!
//! Every WebSocket text frame carries one envelope:
//! `{"event": "<name>", "data": <payload>}` with camelCase payload fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{normalize_bus_number, normalize_label, Bus};

// ============================================
// Client -> server
// ============================================

/// Event sent by a driver connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "driver:start")]
    Start(StartPayload),
    #[serde(rename = "driver:updateLocation")]
    UpdateLocation(LocationPayload),
    #[serde(rename = "driver:stop")]
    Stop(StopPayload),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartPayload {
    pub bus_number: Option<String>,
    pub bus_name: Option<String>,
    pub driver_name: Option<String>,
    pub driver_id: Option<String>,
}

/// Coordinates stay untyped here so that `"lat": "abc"` is rejected by
/// validation instead of failing the whole frame.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationPayload {
    pub bus_number: Option<String>,
    pub bus_name: Option<String>,
    pub lat: Option<Value>,
    pub lng: Option<Value>,
    pub driver_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StopPayload {
    pub bus_number: Option<String>,
}

/// A client event that passed validation, with its bus number normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    Start {
        bus_number: String,
        bus_name: Option<String>,
        driver_name: Option<String>,
        driver_id: Option<String>,
    },
    UpdateLocation {
        bus_number: String,
        bus_name: Option<String>,
        driver_name: Option<String>,
        lat: f64,
        lng: f64,
    },
    Stop {
        bus_number: String,
    },
    /// The connection closed, for whatever reason.
    Disconnect,
}

impl ClientEvent {
    /// Parses one text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Validates and normalizes the event.
    ///
    /// Returns `None` for malformed events, which are dropped without reply.
    pub fn validate(self) -> Option<DriverCommand> {
        match self {
            ClientEvent::Start(p) => Some(DriverCommand::Start {
                bus_number: normalize_bus_number(p.bus_number.as_deref()?)?,
                bus_name: normalize_label(p.bus_name),
                driver_name: normalize_label(p.driver_name),
                driver_id: normalize_label(p.driver_id),
            }),
            ClientEvent::UpdateLocation(p) => Some(DriverCommand::UpdateLocation {
                bus_number: normalize_bus_number(p.bus_number.as_deref()?)?,
                lat: p.lat.as_ref().and_then(Value::as_f64)?,
                lng: p.lng.as_ref().and_then(Value::as_f64)?,
                bus_name: normalize_label(p.bus_name),
                driver_name: normalize_label(p.driver_name),
            }),
            ClientEvent::Stop(p) => Some(DriverCommand::Stop {
                bus_number: normalize_bus_number(p.bus_number.as_deref()?)?,
            }),
        }
    }
}

// ============================================
// Server -> client
// ============================================

/// Event fanned out by the hub (or sent once, for the snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Connection-scoped snapshot of every active bus.
    #[serde(rename = "buses:all")]
    BusesAll(Vec<Bus>),
    #[serde(rename = "bus:online")]
    BusOnline(BusOnline),
    #[serde(rename = "bus:locationUpdated")]
    LocationUpdated(LocationUpdated),
    #[serde(rename = "bus:offline")]
    BusOffline(BusOffline),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusOnline {
    pub bus_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdated {
    pub bus_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    /// Always set by the server; optional so older producers still decode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusOffline {
    pub bus_number: String,
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
