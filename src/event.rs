//! Events handed to the host application.
//!
//! The bus never interprets payloads. Whatever arrives on this process's
//! channel (or is published to self) becomes a [`BusEvent`] and goes to the
//! host's [`EventSink`].

use tokio::sync::mpsc;

use crate::codec::{split_parts, Frame};

/// An event received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    /// Sending server name (the hub token when sent by the hub).
    pub source: String,
    /// Application channel.
    pub channel: String,
    /// Text payload.
    pub payload: String,
}

impl BusEvent {
    /// Create an event from its fields.
    pub fn new(
        source: impl Into<String>,
        channel: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Payload pieces of a message built with `publish_parts`.
    pub fn parts(&self) -> Vec<&str> {
        split_parts(&self.payload)
    }
}

impl From<Frame> for BusEvent {
    fn from(frame: Frame) -> Self {
        Self {
            source: frame.source,
            channel: frame.channel,
            payload: frame.payload,
        }
    }
}

/// Receiver of bus events, supplied by the host application.
///
/// Called from the listener's dispatch thread for remote events, and from
/// the publishing thread for loopback events. Implementations must be cheap
/// to call concurrently from both.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn dispatch(&self, event: BusEvent);
}

impl<F> EventSink for F
where
    F: Fn(BusEvent) + Send + Sync,
{
    fn dispatch(&self, event: BusEvent) {
        self(event);
    }
}

/// Sink that forwards events into a tokio channel.
///
/// Useful when the host consumes events from an async task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BusEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn dispatch(&self, event: BusEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Event receiver dropped; discarding event");
        }
    }
}
