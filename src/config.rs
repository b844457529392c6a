//! Configuration loading and identity validation.
//!
//! The host decides where configuration lives; this module reads a JSON
//! document (or nothing at all) and applies `HUBBUS_*` environment
//! overrides on top. Turning the result into a [`ServerIdentity`] is the
//! fatal gate: a process without a valid identity must not start.

use std::path::Path;
use std::{env, fs};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::debug::parse_toggle;
use crate::error::BusError;
use crate::identity::ServerIdentity;

/// Environment variable overriding [`Config::hub_name`].
pub const ENV_HUB_NAME: &str = "HUBBUS_HUB_NAME";
/// Environment variable overriding [`Config::server_name`].
pub const ENV_SERVER_NAME: &str = "HUBBUS_SERVER_NAME";
/// Environment variable overriding [`Config::is_hub`].
pub const ENV_IS_HUB: &str = "HUBBUS_IS_HUB";
/// Environment variable overriding [`Config::debug`].
pub const ENV_DEBUG: &str = "HUBBUS_DEBUG";

/// Bus configuration for one process.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Hub namespace shared by every process on the same hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_name: Option<String>,
    /// This worker's name. Ignored for the hub process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Whether this process is the hub.
    #[serde(default)]
    pub is_hub: bool,
    /// Start with per-frame trace logging enabled.
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// Parse a JSON document.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid bus configuration JSON")
    }

    /// Read `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read bus configuration: {}", path.display()))?;
        let mut config = Self::from_json(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Configuration from environment variables alone.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Persist as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write bus configuration: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(hub_name) = lookup(ENV_HUB_NAME) {
            self.hub_name = Some(hub_name);
        }

        if let Some(server_name) = lookup(ENV_SERVER_NAME) {
            self.server_name = Some(server_name);
        }

        if let Some(is_hub) = lookup(ENV_IS_HUB) {
            match parse_toggle(&is_hub) {
                Some(flag) => self.is_hub = flag,
                None => log::warn!("Ignoring {ENV_IS_HUB}={is_hub:?}: expected on/off"),
            }
        }

        if let Some(debug) = lookup(ENV_DEBUG) {
            match parse_toggle(&debug) {
                Some(flag) => self.debug = flag,
                None => log::warn!("Ignoring {ENV_DEBUG}={debug:?}: expected on/off"),
            }
        }
    }

    /// Validate and build this process's identity.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the hub name is missing, a worker has
    /// no server name, or a name is otherwise invalid.
    pub fn identity(&self) -> Result<ServerIdentity, BusError> {
        let hub_name = self
            .hub_name
            .as_deref()
            .ok_or_else(|| BusError::Configuration("hub name not specified".into()))?;

        if self.is_hub {
            return ServerIdentity::hub(hub_name);
        }

        let server_name = self
            .server_name
            .as_deref()
            .ok_or_else(|| BusError::Configuration("server name not specified".into()))?;
        ServerIdentity::worker(hub_name, server_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_has_no_identity() {
        let config = Config::default();
        assert!(matches!(config.identity(), Err(BusError::Configuration(_))));
    }

    #[test]
    fn test_worker_identity_from_json() {
        let config = Config::from_json(r#"{"hub_name": "NetA", "server_name": "Lobby"}"#).unwrap();
        let identity = config.identity().unwrap();
        assert_eq!(identity.name(), "Lobby");
        assert_eq!(identity.hub_name(), "NetA");
        assert!(!config.debug);
    }

    #[test]
    fn test_hub_identity_ignores_server_name() {
        let config =
            Config::from_json(r#"{"hub_name": "NetA", "server_name": "x", "is_hub": true}"#).unwrap();
        assert!(config.identity().unwrap().is_hub());
    }

    #[test]
    fn test_worker_without_name_is_fatal() {
        let config = Config::from_json(r#"{"hub_name": "NetA"}"#).unwrap();
        assert!(matches!(config.identity(), Err(BusError::Configuration(_))));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_SERVER_NAME, "Survival"),
            (ENV_DEBUG, "on"),
            (ENV_IS_HUB, "sometimes"),
        ]);
        let mut config = Config::from_json(r#"{"hub_name": "NetA", "server_name": "Lobby"}"#).unwrap();
        config.apply_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.hub_name.as_deref(), Some("NetA"));
        assert_eq!(config.server_name.as_deref(), Some("Survival"));
        assert!(config.debug);
        assert!(!config.is_hub);
    }

    #[test]
    fn test_debug_off_override_disables() {
        let mut config = Config {
            debug: true,
            ..Config::default()
        };
        config.apply_overrides_from(|key| (key == ENV_DEBUG).then(|| "off".to_string()));
        assert!(!config.debug);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bus.json");
        let config = Config {
            hub_name: Some("NetA".into()),
            server_name: Some("Lobby".into()),
            is_hub: false,
            debug: true,
        };
        config.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(Config::from_json(&content).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load(&dir.path().join("missing.json")).is_err());
    }
}
