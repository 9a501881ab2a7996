//! Data types for bus state.
//!
//! Defines the durable bus record and the partial update applied by upserts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last reported GPS fix for a bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusLocation {
    pub lat: f64,
    pub lng: f64,
    /// Server time at which the fix was received.
    pub updated_at: DateTime<Utc>,
}

/// A tracked vehicle, keyed by its normalized bus number.
///
/// Serialized in the same camelCase shape the `buses:all` snapshot and the
/// REST endpoints expose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    /// Trimmed, uppercase identifier. Unique.
    pub bus_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,

    /// True while a driver connection is live for this bus.
    #[serde(default)]
    pub is_active: bool,

    /// Last known location. Not cleared when the bus goes offline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<BusLocation>,

    pub created_at: DateTime<Utc>,
}

/// Fields supplied to an upsert.
///
/// `None` means "not supplied": the stored value is left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusUpdate {
    pub bus_name: Option<String>,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub is_active: Option<bool>,
    pub location: Option<BusLocation>,
}

impl BusUpdate {
    /// Update issued when a driver starts sharing.
    pub fn started(
        bus_name: Option<String>,
        driver_name: Option<String>,
        driver_id: Option<String>,
    ) -> Self {
        Self {
            bus_name,
            driver_id,
            driver_name,
            is_active: Some(true),
            location: None,
        }
    }

    /// Update issued for every accepted GPS sample.
    pub fn located(
        bus_name: Option<String>,
        driver_name: Option<String>,
        location: BusLocation,
    ) -> Self {
        Self {
            bus_name,
            driver_id: None,
            driver_name,
            is_active: Some(true),
            location: Some(location),
        }
    }
}
