//! In-process broker implementing the [`BrokerConnection`] contract.
//!
//! One [`MemoryBroker`] plays the role of the shared broker server; every
//! bus participant gets its own [`MemoryConnection`] from
//! [`MemoryBroker::connect`]. Channels and sets are shared across
//! connections exactly as they would be on a real broker, so a hub and
//! several workers can run against it inside one process.
//!
//! Deliveries run on the publishing task once the broker lock is released,
//! so every subscriber sees a channel's messages in publish order.
//!
//! [`MemoryBroker::set_online`] simulates an outage: while offline every
//! command fails with [`BrokerError::Unavailable`].

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{BrokerConnection, SubscriptionHandler};
use crate::error::BrokerError;

struct Subscriber {
    connection_id: u64,
    handler: Arc<dyn SubscriptionHandler>,
}

struct BrokerState {
    online: bool,
    next_connection_id: u64,
    channels: HashMap<String, Vec<Subscriber>>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl BrokerState {
    fn subscription_count(&self, connection_id: u64) -> u64 {
        self.channels
            .values()
            .filter(|subs| subs.iter().any(|s| s.connection_id == connection_id))
            .count() as u64
    }

    fn remove_subscriber(&mut self, channel: &str, connection_id: u64) -> bool {
        let Some(subs) = self.channels.get_mut(channel) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.connection_id != connection_id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared in-process broker.
///
/// Cheap to clone; clones refer to the same channels and sets.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MemoryBroker")
            .field("online", &state.online)
            .field("channels", &state.channels.len())
            .field("sets", &state.sets.len())
            .finish()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create an empty, online broker.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                online: true,
                next_connection_id: 1,
                channels: HashMap::new(),
                sets: HashMap::new(),
            })),
        }
    }

    /// Open a new client connection.
    pub fn connect(&self) -> MemoryConnection {
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_connection_id;
            state.next_connection_id += 1;
            id
        };
        MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            publishes: AtomicU64::new(0),
        }
    }

    /// Take the broker offline (`false`) or bring it back (`true`).
    pub fn set_online(&self, online: bool) {
        lock(&self.state).online = online;
        log::info!("Memory broker {}", if online { "online" } else { "offline" });
    }

    /// Whether the broker currently accepts commands.
    pub fn is_online(&self) -> bool {
        lock(&self.state).online
    }

    /// Current members of the set at `key`, read directly.
    pub fn members(&self, key: &str) -> BTreeSet<String> {
        lock(&self.state).sets.get(key).cloned().unwrap_or_default()
    }

    /// Number of connections subscribed to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        lock(&self.state).channels.get(channel).map_or(0, Vec::len)
    }
}

/// A client connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    id: u64,
    state: Arc<Mutex<BrokerState>>,
    closed: AtomicBool,
    publishes: AtomicU64,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MemoryConnection {
    /// Number of publish commands issued on this connection.
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }

    /// Whether [`BrokerConnection::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self, state: &BrokerState) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        if !state.online {
            return Err(BrokerError::Unavailable("memory broker offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, BrokerError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        let handlers: Vec<Arc<dyn SubscriptionHandler>> = {
            let state = lock(&self.state);
            self.ensure_usable(&state)?;
            state
                .channels
                .get(channel)
                .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
                .unwrap_or_default()
        };

        for handler in &handlers {
            handler.on_message(channel, message);
        }
        Ok(handlers.len() as u64)
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<(), BrokerError> {
        let count = {
            let mut state = lock(&self.state);
            self.ensure_usable(&state)?;
            state.remove_subscriber(channel, self.id);
            state
                .channels
                .entry(channel.to_owned())
                .or_default()
                .push(Subscriber {
                    connection_id: self.id,
                    handler: Arc::clone(&handler),
                });
            state.subscription_count(self.id)
        };
        handler.on_subscribed(channel, count);
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), BrokerError> {
        let (handler, count) = {
            let mut state = lock(&self.state);
            self.ensure_usable(&state)?;
            let handler = state.channels.get(channel).and_then(|subs| {
                subs.iter()
                    .find(|s| s.connection_id == self.id)
                    .map(|s| Arc::clone(&s.handler))
            });
            state.remove_subscriber(channel, self.id);
            (handler, state.subscription_count(self.id))
        };
        if let Some(handler) = handler {
            handler.on_unsubscribed(channel, count);
        }
        Ok(())
    }

    async fn add_set_member(&self, key: &str, member: &str) -> Result<bool, BrokerError> {
        let mut state = lock(&self.state);
        self.ensure_usable(&state)?;
        Ok(state
            .sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned()))
    }

    async fn remove_set_member(&self, key: &str, member: &str) -> Result<bool, BrokerError> {
        let mut state = lock(&self.state);
        self.ensure_usable(&state)?;
        let Some(set) = state.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, BrokerError> {
        let state = lock(&self.state);
        self.ensure_usable(&state)?;
        Ok(state.sets.get(key).cloned().unwrap_or_default())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = lock(&self.state);
        let id = self.id;
        state.channels.retain(|_, subs| {
            subs.retain(|s| s.connection_id != id);
            !subs.is_empty()
        });
    }
}
