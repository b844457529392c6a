//! Broker transport abstraction.
//!
//! The bus talks to its pub/sub broker exclusively through the
//! [`BrokerConnection`] trait. Production hosts wrap their broker client
//! (connection bootstrap, auth, reconnect policy) in an implementation of
//! this trait; the crate ships [`MemoryBroker`] for tests and single-process
//! setups.
//!
//! # Architecture
//!
//! ```text
//! BrokerConnection (trait)
//!     │
//!     ├── pub/sub:  publish / subscribe / unsubscribe
//!     │             └── deliveries arrive on SubscriptionHandler callbacks
//!     │
//!     └── sets:     add_set_member / remove_set_member / set_members
//!                   └── backs the "{hub}:servers" registry
//! ```
//!
//! # Threading
//!
//! Handler callbacks run on threads owned by the broker implementation.
//! They must return quickly; the listener hands events off to its own
//! dispatch thread for exactly this reason.

// Rust guideline compliant 2026-02

pub mod memory;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BrokerError;

pub use memory::{MemoryBroker, MemoryConnection};

/// Shared handle to a broker connection.
pub type SharedBroker = Arc<dyn BrokerConnection>;

/// Callbacks for a pub/sub subscription.
pub trait SubscriptionHandler: Send + Sync {
    /// A message arrived on `channel`.
    fn on_message(&self, channel: &str, message: &str);

    /// The subscription to `channel` became active. `count` is the number of
    /// channels this connection is now subscribed to.
    fn on_subscribed(&self, channel: &str, count: u64) {
        let _ = (channel, count);
    }

    /// The subscription to `channel` ended.
    fn on_unsubscribed(&self, channel: &str, count: u64) {
        let _ = (channel, count);
    }
}

/// Pub/sub and set-command transport used by the bus.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Publish `message` on `channel`.
    ///
    /// Returns the number of subscribers that received it. Zero is a normal
    /// result, not an error.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, BrokerError>;

    /// Subscribe `handler` to `channel`.
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<(), BrokerError>;

    /// Drop the subscription to `channel`, if any.
    async fn unsubscribe(&self, channel: &str) -> Result<(), BrokerError>;

    /// Add `member` to the set at `key`. Returns whether it was newly added.
    async fn add_set_member(&self, key: &str, member: &str) -> Result<bool, BrokerError>;

    /// Remove `member` from the set at `key`. Returns whether it was present.
    async fn remove_set_member(&self, key: &str, member: &str) -> Result<bool, BrokerError>;

    /// All members of the set at `key` (empty if the key does not exist).
    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, BrokerError>;

    /// Close the connection. Later commands fail with [`BrokerError::Closed`].
    async fn close(&self);
}
