//! Server configuration loaded from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

use crate::database::Database;

/// Default HTTP/WebSocket port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default allowed browser origin.
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";

/// Default depth of the broadcast channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("BROADCAST_CAPACITY must be greater than 0")]
    ZeroCapacity,
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Origin allowed by CORS (the viewer/driver web client).
    pub client_url: String,
    pub database_path: PathBuf,
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            client_url: DEFAULT_CLIENT_URL.to_string(),
            database_path: Database::default_path(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `PORT`, `CLIENT_URL`, `DATABASE_PATH` and
    /// `BROADCAST_CAPACITY`, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BIND_ADDR") {
            config.bind_addr = parse("BIND_ADDR", value)?;
        }
        if let Some(value) = lookup("PORT") {
            config.port = parse("PORT", value)?;
        }
        if let Some(value) = lookup("CLIENT_URL").filter(|v| !v.trim().is_empty()) {
            config.client_url = value.trim().to_string();
        }
        if let Some(value) = lookup("DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            config.database_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("BROADCAST_CAPACITY") {
            config.broadcast_capacity = parse("BROADCAST_CAPACITY", value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.client_url, DEFAULT_CLIENT_URL);
        assert_eq!(config.broadcast_capacity, DEFAULT_BROADCAST_CAPACITY);
        assert!(config.database_path.ends_with("buses.db"));
        assert_eq!(config.socket_addr().port(), DEFAULT_PORT);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("BIND_ADDR", "127.0.0.1"),
            ("CLIENT_URL", "https://tracker.example"),
            ("DATABASE_PATH", "/tmp/b.db"),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.client_url, "https://tracker.example");
        assert_eq!(config.database_path, PathBuf::from("/tmp/b.db"));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            load(&[("BROADCAST_CAPACITY", "0")]),
            Err(ConfigError::ZeroCapacity)
        ));
    }
}
