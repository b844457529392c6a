//! Process identity on the bus.
//!
//! A [`ServerIdentity`] is fixed at process start and never changes. It
//! derives every broker-side name the process uses: its own subscribe
//! channel, the publish channel of any destination, and the registry key.

use std::fmt;

use crate::codec::is_header_safe;
use crate::constants::{HUB_TOKEN, NAMESPACE_SEPARATOR, SERVERS_KEY_SUFFIX};
use crate::error::{BusError, Result};

/// Name of this process plus the hub namespace it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    name: String,
    hub_name: String,
}

impl ServerIdentity {
    /// Identity of a worker process named `name` under hub `hub_name`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Configuration`] when either name is blank, holds
    /// the frame delimiter, or the worker name collides with the hub token.
    pub fn worker(hub_name: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let hub_name = validate_hub_name(hub_name.into())?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BusError::Configuration("server name not specified".into()));
        }
        if name == HUB_TOKEN {
            return Err(BusError::Configuration(format!(
                "server name {name:?} is reserved for the hub"
            )));
        }
        if !is_header_safe(&name) {
            return Err(BusError::Configuration(format!(
                "server name {name:?} contains the frame delimiter"
            )));
        }
        Ok(Self { name, hub_name })
    }

    /// Identity of the hub process for `hub_name`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Configuration`] for a blank or delimiter-bearing
    /// hub name.
    pub fn hub(hub_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: HUB_TOKEN.to_owned(),
            hub_name: validate_hub_name(hub_name.into())?,
        })
    }

    /// Server name (the hub token for the hub process).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hub namespace.
    pub fn hub_name(&self) -> &str {
        &self.hub_name
    }

    /// Whether this identity is the hub process.
    pub fn is_hub(&self) -> bool {
        self.name == HUB_TOKEN
    }

    /// Whether `dest` addresses this process.
    pub fn is_self(&self, dest: &str) -> bool {
        self.name == dest
    }

    /// Channel carrying messages for `dest`: `"{hub}:{dest}"`.
    pub fn channel_for(&self, dest: &str) -> String {
        format!("{}{NAMESPACE_SEPARATOR}{dest}", self.hub_name)
    }

    /// Channel this process subscribes to.
    pub fn subscribe_channel(&self) -> String {
        self.channel_for(&self.name)
    }

    /// Registry set key: `"{hub}:servers"`.
    pub fn registry_key(&self) -> String {
        self.channel_for(SERVERS_KEY_SUFFIX)
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.hub_name)
    }
}

fn validate_hub_name(hub_name: String) -> Result<String> {
    if hub_name.trim().is_empty() {
        return Err(BusError::Configuration("hub name not specified".into()));
    }
    if !is_header_safe(&hub_name) {
        return Err(BusError::Configuration(format!(
            "hub name {hub_name:?} contains the frame delimiter"
        )));
    }
    Ok(hub_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_channels() {
        let id = ServerIdentity::worker("NetA", "Lobby").unwrap();
        assert_eq!(id.subscribe_channel(), "NetA:Lobby");
        assert_eq!(id.channel_for("Survival"), "NetA:Survival");
        assert_eq!(id.channel_for(HUB_TOKEN), "NetA:HUB");
        assert_eq!(id.registry_key(), "NetA:servers");
        assert!(!id.is_hub());
    }

    #[test]
    fn test_hub_identity_uses_reserved_token() {
        let id = ServerIdentity::hub("NetA").unwrap();
        assert!(id.is_hub());
        assert_eq!(id.name(), HUB_TOKEN);
        assert_eq!(id.subscribe_channel(), "NetA:HUB");
        assert_eq!(id.to_string(), "HUB@NetA");
    }

    #[test]
    fn test_rejects_invalid_names() {
        assert!(matches!(
            ServerIdentity::worker("", "Lobby"),
            Err(BusError::Configuration(_))
        ));
        assert!(matches!(
            ServerIdentity::worker("NetA", "  "),
            Err(BusError::Configuration(_))
        ));
        assert!(matches!(
            ServerIdentity::worker("NetA", HUB_TOKEN),
            Err(BusError::Configuration(_))
        ));
        assert!(matches!(
            ServerIdentity::worker("NetA", "Lob/\\by"),
            Err(BusError::Configuration(_))
        ));
        assert!(matches!(
            ServerIdentity::hub("Net/\\A"),
            Err(BusError::Configuration(_))
        ));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let id = ServerIdentity::worker("NetA", "World").unwrap();
        assert!(id.is_self("World"));
        assert!(!id.is_self("world"));
    }
}
