//! Server configuration, loaded from TOML.
//!
//! ```toml
//! bind_address = "0.0.0.0:5000"
//! host_name = "app1"
//! hosts = ["app1", "app2"]
//! broadcast_interval_ms = 500
//! forecast_horizon_ms = 1000
//! catalog_path = "data/items.toml"
//! journal_path = "var/tapworks.jl"
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tapworks_shared::{BROADCAST_INTERVAL_MS, DEFAULT_BIND, FORECAST_HORIZON_MS};

use crate::error::{ServerError, ServerResult};

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: String,
    /// This server's name in the host directory.
    pub host_name: String,
    /// Every host rooms may be assigned to.
    pub hosts: Vec<String>,
    /// Period of the status broadcast.
    pub broadcast_interval_ms: u64,
    /// Forecast horizon of each status.
    pub forecast_horizon_ms: i64,
    /// Item catalog file.
    pub catalog_path: PathBuf,
    /// Ledger journal file. In-memory ledger when absent.
    pub journal_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND.to_string(),
            host_name: "localhost".to_string(),
            hosts: vec!["localhost".to_string()],
            broadcast_interval_ms: BROADCAST_INTERVAL_MS,
            forecast_horizon_ms: FORECAST_HORIZON_MS,
            catalog_path: PathBuf::from("data/items.toml"),
            journal_path: None,
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] naming the first bad value.
    pub fn validate(&self) -> ServerResult<()> {
        if self.broadcast_interval_ms == 0 {
            return Err(ServerError::Config("broadcast_interval_ms must be positive".into()));
        }
        if self.forecast_horizon_ms < 0 {
            return Err(ServerError::Config("forecast_horizon_ms must not be negative".into()));
        }
        if self.hosts.is_empty() {
            return Err(ServerError::Config("hosts must not be empty".into()));
        }
        if !self.hosts.contains(&self.host_name) {
            tracing::warn!(host = %self.host_name, "host_name is not in hosts; no room will be assigned here");
        }
        Ok(())
    }

    /// Broadcast period.
    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.broadcast_interval(), Duration::from_millis(500));
        assert_eq!(config.forecast_horizon_ms, 1000);
    }

    #[test]
    fn test_full_file() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind_address = "127.0.0.1:9000"
            host_name = "app2"
            hosts = ["app1", "app2"]
            broadcast_interval_ms = 250
            forecast_horizon_ms = 3000
            catalog_path = "items.toml"
            journal_path = "/tmp/ledger.jl"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.journal_path, Some(PathBuf::from("/tmp/ledger.jl")));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ServerConfig::from_toml_str("broadcast_interval_ms = 0").is_err());
        assert!(ServerConfig::from_toml_str("hosts = []").is_err());
        assert!(ServerConfig::from_toml_str("forecast_horizon_ms = -1").is_err());
        assert!(ServerConfig::from_toml_str("no_such_key = 1").is_err());
    }
}
