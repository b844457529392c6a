//! hubbus - hub/worker messaging over a shared pub/sub broker.
//!
//! Independent server processes (one hub and many workers) exchange short
//! text events through a broker, and keep a cached registry of which
//! workers are currently connected.
//!
//! # Architecture
//!
//! ```text
//! BusApi (facade, lifecycle, loopback)
//!     │
//!     └── MessageBus ──────────────► BrokerConnection (trait)
//!             ├── ServerRegistry        ├── MemoryBroker (in-process)
//!             ├── codec                 └── host-provided clients
//!             └── SubscriptionListener ──► EventSink (host)
//! ```
//!
//! Outbound: `BusApi::publish` → loopback to the sink when the destination
//! is this process, otherwise `MessageBus::publish_async` → `codec::encode`
//! → `broker.publish("{hub}:{dest}")`.
//!
//! Inbound: broker delivery on `"{hub}:{self}"` → `SubscriptionListener` →
//! `codec::decode` → dispatch thread → `EventSink::dispatch`.
//!
//! # Modules
//!
//! - [`api`] - Facade, lifecycle, and single-owner slot
//! - [`broker`] - Transport trait and the in-process broker
//! - [`bus`] - Outbound publishing and connection ownership
//! - [`codec`] - Text wire frame
//! - [`config`] - Configuration loading and identity validation
//! - [`registry`] - Cached server registry

pub mod api;
pub mod broker;
pub mod bus;
pub mod codec;
pub mod config;
pub mod constants;
pub mod debug;
pub mod error;
pub mod event;
pub mod identity;
pub mod listener;
pub mod registry;

pub use api::{ApiSlot, BusApi, Lifecycle};
pub use broker::{BrokerConnection, MemoryBroker, SharedBroker, SubscriptionHandler};
pub use bus::MessageBus;
pub use config::Config;
pub use debug::DebugMode;
pub use error::{BrokerError, BusError};
pub use event::{BusEvent, ChannelSink, EventSink};
pub use identity::ServerIdentity;
pub use listener::SubscriptionListener;
pub use registry::{ServerRegistry, ServerSnapshot};
