//! Cached registry of live servers under a hub.
//!
//! Membership lives broker-side in the set `"{hub}:servers"`. Every process
//! adds itself on setup and removes itself on teardown; presence in the set
//! is the liveness signal. The hub registers the reserved [`HUB_TOKEN`].
//!
//! Reading the broker on every lookup would put network I/O on hot paths,
//! so processes keep a local [`ServerSnapshot`] and ask for a new one with
//! [`ServerRegistry::refresh`].
//!
//! # Snapshot discipline
//!
//! - Snapshots are immutable and shared as `Arc<ServerSnapshot>`.
//! - A refresh builds the complete replacement off to the side, then swaps
//!   the pointer. The lock guards only that pointer read/write and is never
//!   held across I/O, so readers see either the old set or the new one.
//! - A failed refresh keeps the previous snapshot (stale but consistent).
//! - Concurrent refreshes are not ordered: the last one to complete wins.
//! - After [`ServerRegistry::clear`] the snapshot stays empty; late refresh
//!   results are dropped.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::broker::SharedBroker;
use crate::constants::{HUB_TOKEN, TRACE_TARGET};
use crate::debug::DebugMode;
use crate::error::Result;
use crate::identity::ServerIdentity;

/// Point-in-time view of registry membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSnapshot {
    members: BTreeSet<String>,
    hub_online: bool,
}

impl ServerSnapshot {
    /// Build a snapshot from the raw broker set.
    ///
    /// The hub token is removed from the member set and reported through
    /// [`ServerSnapshot::hub_online`] instead.
    pub fn from_registry_set(mut raw: BTreeSet<String>) -> Self {
        let hub_online = raw.remove(HUB_TOKEN);
        Self {
            members: raw,
            hub_online,
        }
    }

    /// Worker names, hub token excluded.
    ///
    /// Empty before the first refresh completes: treat that as "unknown".
    pub fn members(&self) -> &BTreeSet<String> {
        &self.members
    }

    /// Whether the hub was registered when this snapshot was taken.
    pub fn hub_online(&self) -> bool {
        self.hub_online
    }

    /// Whether `name` is a registered worker.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    /// Worker names starting with `partial`, ignoring case.
    pub fn matching_prefix(&self, partial: &str) -> Vec<String> {
        let partial = partial.to_lowercase();
        self.members
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&partial))
            .cloned()
            .collect()
    }
}

/// Registry client for one process.
pub struct ServerRegistry {
    broker: SharedBroker,
    identity: ServerIdentity,
    key: String,
    snapshot: Arc<RwLock<Arc<ServerSnapshot>>>,
    cleared: Arc<AtomicBool>,
    runtime: Handle,
    debug: DebugMode,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("identity", &self.identity)
            .field("key", &self.key)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl ServerRegistry {
    /// Create a registry client. The snapshot starts empty.
    pub fn new(
        broker: SharedBroker,
        identity: ServerIdentity,
        runtime: Handle,
        debug: DebugMode,
    ) -> Self {
        let key = identity.registry_key();
        Self {
            broker,
            identity,
            key,
            snapshot: Arc::new(RwLock::new(Arc::new(ServerSnapshot::default()))),
            cleared: Arc::new(AtomicBool::new(false)),
            runtime,
            debug,
        }
    }

    /// Broker-side key of the server set.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Add this process to the server set. Safe to repeat.
    pub async fn setup(&self) -> Result<()> {
        let added = self
            .broker
            .add_set_member(&self.key, self.identity.name())
            .await?;
        log::debug!(
            "Registered {} in {} (newly added: {added})",
            self.identity.name(),
            self.key
        );
        Ok(())
    }

    /// Remove this process from the server set. Safe to repeat.
    pub async fn teardown(&self) -> Result<()> {
        let removed = self
            .broker
            .remove_set_member(&self.key, self.identity.name())
            .await?;
        log::debug!(
            "Deregistered {} from {} (was present: {removed})",
            self.identity.name(),
            self.key
        );
        Ok(())
    }

    /// Request fresh membership in the background.
    ///
    /// Returns immediately. The returned handle completes once the snapshot
    /// has been swapped (or the failure logged); awaiting it is optional.
    pub fn refresh(&self) -> JoinHandle<()> {
        let broker = Arc::clone(&self.broker);
        let key = self.key.clone();
        let slot = Arc::clone(&self.snapshot);
        let cleared = Arc::clone(&self.cleared);
        let debug = self.debug.clone();

        self.runtime.spawn(async move {
            match broker.set_members(&key).await {
                Ok(raw) => {
                    let next = Arc::new(ServerSnapshot::from_registry_set(raw));
                    if debug.is_enabled() {
                        log::info!(
                            target: TRACE_TARGET,
                            "Refreshed {key}: {:?} (hub online: {})",
                            next.members(),
                            next.hub_online()
                        );
                    }
                    let mut current = slot.write().unwrap_or_else(PoisonError::into_inner);
                    // Checked under the lock so a late refresh cannot undo clear().
                    if cleared.load(Ordering::SeqCst) {
                        log::debug!("Registry {key} cleared; discarding refresh result");
                        return;
                    }
                    *current = next;
                }
                Err(e) => {
                    log::warn!("Registry refresh for {key} failed, keeping previous snapshot: {e}");
                }
            }
        })
    }

    /// Latest snapshot. No I/O.
    pub fn snapshot(&self) -> Arc<ServerSnapshot> {
        let current = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    /// Discard the cached snapshot for good.
    ///
    /// Refreshes still in flight, and any requested later, leave the empty
    /// snapshot in place.
    pub fn clear(&self) {
        self.cleared.store(true, Ordering::SeqCst);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(ServerSnapshot::default());
    }
}
