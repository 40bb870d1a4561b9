//! Server Configuration
//!
//! Defaults plus `SNAKE_*` environment overrides.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::network::room::RoomConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Settings for every room created.
    pub room: RoomConfig,
    /// JSON-lines file for match results (log only when unset).
    pub match_log: Option<PathBuf>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            outbound_buffer: 64,
            room: RoomConfig::default(),
            match_log: None,
            version: crate::VERSION.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be used.
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse(&lookup, "SNAKE_BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = parse(&lookup, "SNAKE_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(rate) = parse::<u32, _>(&lookup, "SNAKE_TICK_RATE")? {
            if rate == 0 {
                return Err(invalid("SNAKE_TICK_RATE", "0"));
            }
            config.room.tick_rate = rate;
        }
        if let Some(capacity) = parse::<usize, _>(&lookup, "SNAKE_ROOM_CAPACITY")? {
            if capacity == 0 || capacity > config.room.simulation.max_agents() {
                return Err(invalid("SNAKE_ROOM_CAPACITY", &capacity.to_string()));
            }
            config.room.capacity = capacity;
        }
        if let Some(secs) = parse(&lookup, "SNAKE_RESET_COOLDOWN_SECS")? {
            config.room.reset_cooldown = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("SNAKE_MATCH_LOG").filter(|p| !p.trim().is_empty()) {
            config.match_log = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, &raw)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}
