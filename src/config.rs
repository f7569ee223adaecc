//! Server configuration, read from the environment.
//!
//! | Variable          | Default      | Meaning                                  |
//! |-------------------|--------------|------------------------------------------|
//! | `BIND_ADDR`       | `0.0.0.0`    | Listen address                           |
//! | `PORT`            | `8080`       | Listen port                              |
//! | `DATABASE`        | `memory`     | `memory` or a SQLite file path           |
//! | `MAX_GAME_DAYS`   | unset        | Purge unfinished games older than this   |
//! | `SERVER_ID`       | random       | Identifies this instance in logs         |
//! | `MAX_CONNECTIONS` | `1000`       | Concurrent WebSocket clients             |
//! | `IDLE_TIMEOUT_SECS` | `300`      | Drop clients silent for this long        |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Where snapshots are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// Process memory; lost on restart.
    Memory,
    /// SQLite database file.
    Sqlite(PathBuf),
}

impl DatabaseConfig {
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "memory" | ":memory:" => DatabaseConfig::Memory,
            path => DatabaseConfig::Sqlite(PathBuf::from(path.strip_prefix("sqlite:").unwrap_or(path))),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle clients are dropped after this long.
    pub idle_timeout: Duration,
    /// Snapshot backend.
    pub database: DatabaseConfig,
    /// Age-based purge of unfinished games; `None` disables it.
    pub max_game_days: Option<u32>,
    /// Instance identifier.
    pub server_id: String,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            database: DatabaseConfig::Memory,
            max_game_days: None,
            server_id: uuid::Uuid::new_v4().simple().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ip = match get("BIND_ADDR") {
            Some(raw) => parse::<IpAddr>("BIND_ADDR", &raw)?,
            None => defaults.bind_addr.ip(),
        };
        let port = match get("PORT") {
            Some(raw) => parse::<u16>("PORT", &raw)?,
            None => defaults.bind_addr.port(),
        };
        let max_connections = match get("MAX_CONNECTIONS") {
            Some(raw) => positive("MAX_CONNECTIONS", parse::<usize>("MAX_CONNECTIONS", &raw)?)?,
            None => defaults.max_connections,
        };
        let idle_timeout = match get("IDLE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(positive("IDLE_TIMEOUT_SECS", parse::<u64>("IDLE_TIMEOUT_SECS", &raw)?)?),
            None => defaults.idle_timeout,
        };
        let max_game_days = get("MAX_GAME_DAYS")
            .map(|raw| parse::<u32>("MAX_GAME_DAYS", &raw).and_then(|d| positive("MAX_GAME_DAYS", d)))
            .transpose()?;

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            max_connections,
            idle_timeout,
            database: get("DATABASE").map_or(DatabaseConfig::Memory, |raw| DatabaseConfig::parse(&raw)),
            max_game_days,
            server_id: get("SERVER_ID").unwrap_or(defaults.server_id),
            version: defaults.version,
        })
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn positive<T: Default + PartialEq>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Zero { key });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.database, DatabaseConfig::Memory);
        assert_eq!(config.max_game_days, None);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.server_id.len(), 32);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("BIND_ADDR", "127.0.0.1"),
            ("PORT", "9000"),
            ("DATABASE", "sqlite:/var/lib/turnkeep/games.db"),
            ("MAX_GAME_DAYS", "10"),
            ("SERVER_ID", "replica-a"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.database, DatabaseConfig::Sqlite(PathBuf::from("/var/lib/turnkeep/games.db")));
        assert_eq!(config.max_game_days, Some(10));
        assert_eq!(config.server_id, "replica-a");
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = config(&[("MAX_GAME_DAYS", ""), ("DATABASE", " ")]).unwrap();
        assert_eq!(config.max_game_days, None);
        assert_eq!(config.database, DatabaseConfig::Memory);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            config(&[("PORT", "eighty")]).unwrap_err(),
            ConfigError::Invalid { key: "PORT", value: "eighty".to_string() }
        );
        assert_eq!(
            config(&[("MAX_GAME_DAYS", "0")]).unwrap_err(),
            ConfigError::Zero { key: "MAX_GAME_DAYS" }
        );
    }
}
