//! Bus state storage.
//!
//! The [`BusStore`] trait is the durable record of every bus the tracker has
//! seen. The SQLite [`Database`](crate::database::Database) is the production
//! implementation; the broadcast hub only ever talks to the trait.

pub mod types;

pub use types::*;

use thiserror::Error;

/// Errors raised by a bus store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A writer panicked while holding the connection
    #[error("database connection lock poisoned")]
    LockPoisoned,

    /// Bus number was empty after normalization
    #[error("bus number must not be empty")]
    EmptyBusNumber,

    /// Stored value could not be decoded
    #[error("corrupt record for {bus_number}: {reason}")]
    Corrupt { bus_number: String, reason: String },
}

/// Durable store of bus records, keyed by normalized bus number.
///
/// Implementations must normalize `bus_number` with [`normalize_bus_number`]
/// on every read and write path.
pub trait BusStore: Send + Sync {
    /// Creates the record if missing, otherwise merges only the supplied fields.
    fn upsert_bus(&self, bus_number: &str, update: &BusUpdate) -> Result<Bus, StoreError>;

    /// Sets the active flag of an existing record.
    ///
    /// Returns `false` when no record exists; nothing is created.
    fn set_active(&self, bus_number: &str, active: bool) -> Result<bool, StoreError>;

    /// All records with `is_active = true`, ordered by bus number.
    fn list_active(&self) -> Result<Vec<Bus>, StoreError>;

    /// Every record, ordered by bus number.
    fn list_all(&self) -> Result<Vec<Bus>, StoreError>;

    /// Looks up one record.
    fn get_bus(&self, bus_number: &str) -> Result<Option<Bus>, StoreError>;
}

/// Normalizes a raw bus number: surrounding whitespace trimmed, uppercased.
///
/// Returns `None` when nothing is left.
pub fn normalize_bus_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Normalizes an optional free-text label. Blank labels count as absent.
pub fn normalize_label(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
