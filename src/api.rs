//! Public facade used by host applications.
//!
//! [`BusApi`] wraps a [`MessageBus`] and the host's [`EventSink`] behind an
//! explicit lifecycle:
//!
//! ```text
//! Created ──start()──► Running ──shutdown()──► ShutDown
//!    └──────────────shutdown()───────────────────┘
//! ```
//!
//! Once shut down, every operation fails with [`BusError::ShutDown`]
//! instead of silently doing nothing. Publishing and refreshing also
//! require `Running`.
//!
//! # Ownership
//!
//! A process has one active facade. Hosts keep it in an [`ApiSlot`] that
//! they pass to whatever needs it. Installing a new facade shuts the
//! previous one down first, then starts the new one, so a replacement with
//! the same name ends up registered.
//!
//! # Loopback
//!
//! Publishing to this process's own name never touches the broker: the
//! event is handed to the sink synchronously, on the caller's thread.

// Rust guideline compliant 2026-02

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::task::JoinHandle;

use crate::bus::MessageBus;
use crate::codec::{self, is_header_safe};
use crate::constants::{HUB_TOKEN, TRACE_TARGET};
use crate::error::{BusError, Result};
use crate::event::{BusEvent, EventSink};
use crate::identity::ServerIdentity;
use crate::registry::ServerSnapshot;

/// Lifecycle state of a [`BusApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed; not registered or subscribed yet.
    Created,
    /// Registered, subscribed, and accepting publishes.
    Running,
    /// Shut down; all operations are rejected.
    ShutDown,
}

/// Facade over the bus for one process.
pub struct BusApi {
    bus: MessageBus,
    sink: Arc<dyn EventSink>,
    state: RwLock<Lifecycle>,
    transition: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for BusApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusApi")
            .field("identity", self.bus.identity())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BusApi {
    /// Wrap `bus`, delivering inbound and loopback events to `sink`.
    pub fn new(bus: MessageBus, sink: Arc<dyn EventSink>) -> Self {
        Self {
            bus,
            sink,
            state: RwLock::new(Lifecycle::Created),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: Lifecycle) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn ensure_live(&self) -> Result<()> {
        match self.state() {
            Lifecycle::ShutDown => Err(BusError::ShutDown),
            Lifecycle::Created | Lifecycle::Running => Ok(()),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            Lifecycle::Running => Ok(()),
            Lifecycle::Created => Err(BusError::NotRunning),
            Lifecycle::ShutDown => Err(BusError::ShutDown),
        }
    }

    /// Register, subscribe, and kick off the first registry refresh.
    ///
    /// Calling `start` on a running facade is a no-op. If subscribing fails
    /// the registration is withdrawn again and the facade stays `Created`.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        match self.state() {
            Lifecycle::Running => return Ok(()),
            Lifecycle::ShutDown => return Err(BusError::ShutDown),
            Lifecycle::Created => {}
        }

        self.bus.setup().await?;
        if let Err(e) = self.bus.start_listener(Arc::clone(&self.sink)).await {
            if let Err(teardown) = self.bus.registry().teardown().await {
                log::warn!(
                    "Failed to deregister {} after failed start: {teardown}",
                    self.bus.identity()
                );
            }
            return Err(e);
        }
        self.set_state(Lifecycle::Running);
        drop(self.bus.registry().refresh());
        log::info!("Bus started for {}", self.bus.identity());
        Ok(())
    }

    /// Deregister, unsubscribe, and close the broker connection.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ShutDown`] if already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        if self.state() == Lifecycle::ShutDown {
            return Err(BusError::ShutDown);
        }
        self.set_state(Lifecycle::ShutDown);
        self.bus.shutdown().await;
        Ok(())
    }

    /// Hub namespace this process belongs to.
    pub fn hub_name(&self) -> Result<&str> {
        self.ensure_live()?;
        Ok(self.bus.identity().hub_name())
    }

    /// This process's server name (the hub token for the hub).
    pub fn server_name(&self) -> Result<&str> {
        self.ensure_live()?;
        Ok(self.bus.identity().name())
    }

    /// This process's identity.
    pub fn identity(&self) -> Result<&ServerIdentity> {
        self.ensure_live()?;
        Ok(self.bus.identity())
    }

    /// Send `payload` to `dest` on `channel`.
    ///
    /// A destination equal to this process is delivered to the sink right
    /// away on the calling thread. Anything else is published in the
    /// background; broker failures there are logged, not returned.
    ///
    /// # Errors
    ///
    /// [`BusError::NotRunning`] / [`BusError::ShutDown`] outside `Running`,
    /// and [`BusError::InvalidChannel`] for a channel holding the delimiter.
    pub fn publish(&self, dest: &str, channel: &str, payload: &str) -> Result<()> {
        self.ensure_running()?;
        if !is_header_safe(channel) {
            return Err(BusError::InvalidChannel(channel.to_owned()));
        }

        let identity = self.bus.identity();
        if identity.is_self(dest) {
            if self.bus.debug().is_enabled() {
                log::info!(target: TRACE_TARGET, "Loopback {{channel: {channel}, payload: {payload}}}");
            }
            self.sink
                .dispatch(BusEvent::new(identity.name(), channel, payload));
            return Ok(());
        }

        let handle = self.bus.publish_async(dest, channel, payload);
        self.bus
            .runtime()
            .spawn(log_publish_failure(handle, dest.to_owned(), channel.to_owned()));
        Ok(())
    }

    /// Send a message built from `parts` joined with the frame delimiter.
    ///
    /// Receivers recover the pieces with [`BusEvent::parts`].
    pub fn publish_parts<S: AsRef<str>>(&self, dest: &str, channel: &str, parts: &[S]) -> Result<()> {
        self.publish(dest, channel, &codec::join_parts(parts))
    }

    /// Worker names from the latest snapshot. No I/O.
    pub fn cached_servers(&self) -> Result<BTreeSet<String>> {
        Ok(self.snapshot()?.members().clone())
    }

    /// Whether the hub was registered at the latest snapshot. No I/O.
    pub fn is_hub_online(&self) -> Result<bool> {
        Ok(self.snapshot()?.hub_online())
    }

    /// The latest registry snapshot. No I/O.
    pub fn snapshot(&self) -> Result<Arc<ServerSnapshot>> {
        self.ensure_live()?;
        Ok(self.bus.registry().snapshot())
    }

    /// Cached worker names starting with `partial`, ignoring case.
    pub fn matching_servers(&self, partial: &str) -> Result<Vec<String>> {
        Ok(self.snapshot()?.matching_prefix(partial))
    }

    /// Whether a publish to `dest` is expected to reach someone.
    ///
    /// True for this process itself, for cached workers, and for the hub
    /// token while the hub is online.
    pub fn is_reachable(&self, dest: &str) -> Result<bool> {
        if self.bus.identity().is_self(dest) {
            self.ensure_live()?;
            return Ok(true);
        }
        let snapshot = self.snapshot()?;
        Ok(if dest == HUB_TOKEN {
            snapshot.hub_online()
        } else {
            snapshot.contains(dest)
        })
    }

    /// Ask the registry for fresh membership in the background.
    pub fn refresh(&self) -> Result<JoinHandle<()>> {
        self.ensure_running()?;
        Ok(self.bus.registry().refresh())
    }

    /// Turn per-frame trace logging on or off.
    pub fn set_debug(&self, enabled: bool) -> Result<()> {
        self.ensure_live()?;
        self.bus.debug().set(enabled);
        Ok(())
    }

    /// Whether per-frame trace logging is on.
    pub fn debug_enabled(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.bus.debug().is_enabled())
    }
}

async fn log_publish_failure(handle: JoinHandle<Result<u64>>, dest: String, channel: String) {
    match handle.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => log::warn!("Publish to {dest} on {channel} failed: {e}"),
        Err(e) => log::warn!("Publish task for {dest} on {channel} aborted: {e}"),
    }
}

/// Single-owner slot for the process's active [`BusApi`].
///
/// Hosts create one slot at startup and hand references to it to the
/// components that publish. Installing a facade shuts the previous owner
/// down and only then starts the new one.
#[derive(Debug, Default)]
pub struct ApiSlot {
    current: RwLock<Option<Arc<BusApi>>>,
    transition: tokio::sync::Mutex<()>,
}

impl ApiSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `api` the active facade.
    ///
    /// The previous owner is shut down first. `api` is then started, or
    /// registered again if it was already running, since the previous
    /// owner's teardown removes a shared name from the registry.
    ///
    /// # Errors
    ///
    /// Returns the start or registration failure of `api`; the slot is left
    /// empty in that case.
    pub async fn install(&self, api: Arc<BusApi>) -> Result<()> {
        let _guard = self.transition.lock().await;
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            if Arc::ptr_eq(&previous, &api) {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(api);
                return Ok(());
            }
            log::info!("Replacing active bus facade; shutting down the previous one");
            if let Err(e) = previous.shutdown().await {
                log::debug!("Previous bus facade already stopped: {e}");
            }
        }

        if api.state() == Lifecycle::Running {
            api.bus.setup().await?;
        } else {
            api.start().await?;
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(api);
        Ok(())
    }

    /// The active facade, if any.
    pub fn current(&self) -> Option<Arc<BusApi>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shut down and remove the active facade.
    pub async fn clear(&self) {
        let _guard = self.transition.lock().await;
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            if let Err(e) = previous.shutdown().await {
                log::debug!("Bus facade already stopped: {e}");
            }
        }
    }
}
