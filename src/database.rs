//! SQLite database for persistent bus state.
//!
//! One row per normalized bus number. Writes are single-statement upserts, so
//! concurrent drivers never produce duplicate rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::store::{normalize_bus_number, Bus, BusLocation, BusStore, BusUpdate, StoreError};

const BUS_COLUMNS: &str = "bus_number, bus_name, driver_id, driver_name, is_active, \
                           lat, lng, location_updated_at, created_at";

/// Database wrapper with a thread-safe connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        tracing::info!(path = ?path, "Opening database");

        let conn = Connection::open(path)?;

        // WAL keeps readers (snapshots, REST queries) off the writer's back
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Returns the default database path.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bustrack")
            .join("buses.db")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Initializes the database schema.
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS buses (
                bus_number TEXT PRIMARY KEY,
                bus_name TEXT,
                driver_id TEXT,
                driver_name TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                -- Location columns are written together or not at all
                lat REAL,
                lng REAL,
                location_updated_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_buses_active ON buses(is_active);
            "#,
        )?;

        tracing::debug!("Database schema initialized");
        Ok(())
    }

    fn fetch_bus(conn: &Connection, bus_number: &str) -> Result<Option<Bus>, StoreError> {
        let sql = format!("SELECT {} FROM buses WHERE bus_number = ?1", BUS_COLUMNS);
        let raw = conn
            .query_row(&sql, params![bus_number], RawBus::from_row)
            .optional()?;
        raw.map(RawBus::into_bus).transpose()
    }

    fn query_buses(&self, where_clause: &str) -> Result<Vec<Bus>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM buses {} ORDER BY bus_number ASC",
            BUS_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawBus::from_row)?;

        rows.map(|r| r.map_err(StoreError::from).and_then(RawBus::into_bus))
            .collect()
    }
}

impl BusStore for Database {
    fn upsert_bus(&self, bus_number: &str, update: &BusUpdate) -> Result<Bus, StoreError> {
        let bus_number = normalize_bus_number(bus_number).ok_or(StoreError::EmptyBusNumber)?;
        let conn = self.lock()?;

        let (lat, lng, located_at) = match &update.location {
            Some(loc) => (Some(loc.lat), Some(loc.lng), Some(loc.updated_at.to_rfc3339())),
            None => (None, None, None),
        };

        // ?5 is referenced in both branches: default on insert, untouched when absent
        conn.execute(
            "INSERT INTO buses (bus_number, bus_name, driver_id, driver_name, is_active,
                                lat, lng, location_updated_at, created_at)
             VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 0), ?6, ?7, ?8, ?9)
             ON CONFLICT(bus_number) DO UPDATE SET
                bus_name = COALESCE(excluded.bus_name, buses.bus_name),
                driver_id = COALESCE(excluded.driver_id, buses.driver_id),
                driver_name = COALESCE(excluded.driver_name, buses.driver_name),
                is_active = COALESCE(?5, buses.is_active),
                lat = COALESCE(excluded.lat, buses.lat),
                lng = COALESCE(excluded.lng, buses.lng),
                location_updated_at = COALESCE(excluded.location_updated_at, buses.location_updated_at)",
            params![
                bus_number,
                update.bus_name,
                update.driver_id,
                update.driver_name,
                update.is_active,
                lat,
                lng,
                located_at,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Self::fetch_bus(&conn, &bus_number)?.ok_or_else(|| StoreError::Corrupt {
            bus_number,
            reason: "row missing after upsert".to_string(),
        })
    }

    fn set_active(&self, bus_number: &str, active: bool) -> Result<bool, StoreError> {
        let bus_number = normalize_bus_number(bus_number).ok_or(StoreError::EmptyBusNumber)?;
        let conn = self.lock()?;

        let changed = conn.execute(
            "UPDATE buses SET is_active = ?2 WHERE bus_number = ?1",
            params![bus_number, active],
        )?;

        Ok(changed > 0)
    }

    fn list_active(&self) -> Result<Vec<Bus>, StoreError> {
        self.query_buses("WHERE is_active = 1")
    }

    fn list_all(&self) -> Result<Vec<Bus>, StoreError> {
        self.query_buses("")
    }

    fn get_bus(&self, bus_number: &str) -> Result<Option<Bus>, StoreError> {
        let Some(bus_number) = normalize_bus_number(bus_number) else {
            return Ok(None);
        };
        let conn = self.lock()?;
        Self::fetch_bus(&conn, &bus_number)
    }
}

/// Row as stored, before timestamp decoding.
struct RawBus {
    bus_number: String,
    bus_name: Option<String>,
    driver_id: Option<String>,
    driver_name: Option<String>,
    is_active: bool,
    lat: Option<f64>,
    lng: Option<f64>,
    location_updated_at: Option<String>,
    created_at: String,
}

impl RawBus {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            bus_number: row.get(0)?,
            bus_name: row.get(1)?,
            driver_id: row.get(2)?,
            driver_name: row.get(3)?,
            is_active: row.get(4)?,
            lat: row.get(5)?,
            lng: row.get(6)?,
            location_updated_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_bus(self) -> Result<Bus, StoreError> {
        let created_at = parse_timestamp(&self.bus_number, &self.created_at)?;

        let current_location = match (self.lat, self.lng, self.location_updated_at) {
            (Some(lat), Some(lng), Some(at)) => Some(BusLocation {
                lat,
                lng,
                updated_at: parse_timestamp(&self.bus_number, &at)?,
            }),
            _ => None,
        };

        Ok(Bus {
            bus_number: self.bus_number,
            bus_name: self.bus_name,
            driver_id: self.driver_id,
            driver_name: self.driver_name,
            is_active: self.is_active,
            current_location,
            created_at,
        })
    }
}

fn parse_timestamp(bus_number: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            bus_number: bus_number.to_string(),
            reason: e.to_string(),
        })
}
