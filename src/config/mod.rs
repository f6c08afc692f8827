//! Server configuration (layered: defaults < environment < config file).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};

const ENV_BIND_ADDR: &str = "BEACON_BIND_ADDR";
const ENV_HEARTBEAT_SECS: &str = "BEACON_HEARTBEAT_SECS";
const ENV_HEARTBEAT_TIMEOUT_SECS: &str = "BEACON_HEARTBEAT_TIMEOUT_SECS";

/// Configuration for the realtime server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Interval between server-initiated pings.
    pub heartbeat_secs: u64,
    /// A connection missing pongs for this long is treated as disconnected.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9300".to_string(),
            heartbeat_secs: 25,
            heartbeat_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by environment variables. Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Resolve the full layering: defaults, then environment, then the
    /// optional TOML file.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_env();
        if let Some(path) = config_file {
            config = config.merged_with_file(path)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides via a lookup, so tests can inject values
    /// without touching process state.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(ENV_BIND_ADDR).filter(|value| !value.trim().is_empty()) {
            self.bind_addr = addr;
        }
        if let Some(secs) = lookup(ENV_HEARTBEAT_SECS).and_then(|value| value.parse().ok()) {
            self.heartbeat_secs = secs;
        }
        if let Some(secs) =
            lookup(ENV_HEARTBEAT_TIMEOUT_SECS).and_then(|value| value.parse().ok())
        {
            self.heartbeat_timeout_secs = secs;
        }
    }

    /// Overlay values from a TOML file on top of this config.
    pub fn merged_with_file(&self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let overlay: FileOverlay = toml::from_str(&raw).map_err(|error| {
            BeaconError::Configuration(format!(
                "failed to parse config file {}: {error}",
                path.display()
            ))
        })?;
        let mut merged = self.clone();
        if let Some(bind_addr) = overlay.bind_addr {
            merged.bind_addr = bind_addr;
        }
        if let Some(heartbeat_secs) = overlay.heartbeat_secs {
            merged.heartbeat_secs = heartbeat_secs;
        }
        if let Some(heartbeat_timeout_secs) = overlay.heartbeat_timeout_secs {
            merged.heartbeat_timeout_secs = heartbeat_timeout_secs;
        }
        Ok(merged)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(BeaconError::Configuration(
                "bind address cannot be empty".into(),
            ));
        }
        if self.heartbeat_secs == 0 {
            return Err(BeaconError::Configuration(
                "heartbeat interval must be at least one second".into(),
            ));
        }
        if self.heartbeat_timeout_secs <= self.heartbeat_secs {
            return Err(BeaconError::Configuration(
                "heartbeat timeout must exceed the heartbeat interval".into(),
            ));
        }
        Ok(())
    }
}

/// Partial view of the TOML file; absent keys keep the lower layer's value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileOverlay {
    bind_addr: Option<String>,
    heartbeat_secs: Option<u64>,
    heartbeat_timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn env_overrides_defaults() {
        let mut config = ServerConfig::default();
        config.apply_env(|name| match name {
            ENV_BIND_ADDR => Some("0.0.0.0:7000".to_string()),
            ENV_HEARTBEAT_SECS => Some("10".to_string()),
            _ => None,
        });

        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.heartbeat_secs, 10);
        assert_eq!(
            config.heartbeat_timeout_secs,
            ServerConfig::default().heartbeat_timeout_secs
        );
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env(|name| match name {
            ENV_HEARTBEAT_SECS => Some("soon".to_string()),
            _ => None,
        });
        assert_eq!(config.heartbeat_secs, ServerConfig::default().heartbeat_secs);
    }

    #[test]
    fn validate_rejects_timeout_not_exceeding_interval() {
        let config = ServerConfig {
            heartbeat_secs: 30,
            heartbeat_timeout_secs: 30,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BeaconError::Configuration(_))
        ));
    }

    #[test]
    fn durations_reflect_configured_seconds() {
        let config = ServerConfig {
            heartbeat_secs: 5,
            heartbeat_timeout_secs: 12,
            ..ServerConfig::default()
        };
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(12));
    }
}
