//! bustrack - live vehicle location tracker.
//!
//! Drivers stream GPS fixes over a WebSocket; the broadcast hub persists bus
//! state to SQLite and fans every change out to all connected viewers.

pub mod config;
pub mod database;
pub mod hub;
pub mod presence;
pub mod server;
pub mod store;
pub mod viewer;
