use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Semaphore;

/// Environment variable that overrides `database.password`.
pub const PASSWORD_ENV: &str = "ORASOCKS_PASSWORD";

/// Application configuration loaded from a TOML file.
///
/// # Fields Overview
///
/// - `database`: the [`ConnectionProfile`] for the control connection. May be
///   absent when only the local relay is used.
/// - `proxy`: port and optional payload override for the deployed relay
/// - `lifecycle`: kill-and-verify retry budget used when stopping
/// - `relay`: settings for running the relay engine locally
///
/// # Examples
///
/// ```toml
/// [database]
/// host = "db.internal"
/// service = "ORCL"
/// username = "system"
/// sysdba = true
/// naming = "sid"
///
/// [proxy]
/// port = 1080
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: Option<ConnectionProfile>,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Reads, parses and validates a configuration file, then applies
    /// environment overrides.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Config, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let (Some(profile), Ok(secret)) = (self.database.as_mut(), std::env::var(PASSWORD_ENV)) {
            debug!("Using database password from {}", PASSWORD_ENV);
            profile.password = secret;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(profile) = &self.database {
            if profile.host.trim().is_empty() {
                return Err(ConfigError::MissingField("database.host".to_string()));
            }
            if profile.service.trim().is_empty() {
                return Err(ConfigError::MissingField("database.service".to_string()));
            }
            if profile.username.trim().is_empty() {
                return Err(ConfigError::MissingField("database.username".to_string()));
            }
            if profile.port == 0 {
                return Err(ConfigError::BadPort("database.port must not be 0".to_string()));
            }
        }
        if self.proxy.port == 0 {
            return Err(ConfigError::BadPort("proxy.port must not be 0".to_string()));
        }
        if self.lifecycle.kill_attempts == 0 {
            return Err(ConfigError::NotInRange(
                "lifecycle.kill_attempts must be at least 1".to_string(),
            ));
        }
        if self.relay.max_connections == Some(0) {
            return Err(ConfigError::NotInRange(
                "relay.max_connections must be at least 1 when set".to_string(),
            ));
        }
        if let Some(max) = self.relay.max_connections {
            if max > Semaphore::MAX_PERMITS {
                return Err(ConfigError::NotInRange(format!(
                    "relay.max_connections must be at most {}",
                    Semaphore::MAX_PERMITS
                )));
            }
        }
        if self.relay.connect_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "relay.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the database profile or an error naming the missing section.
    pub fn profile(&self) -> Result<ConnectionProfile, ConfigError> {
        self.database
            .clone()
            .ok_or_else(|| ConfigError::MissingField("[database] section".to_string()))
    }
}
