//! Inbound side of the bus: broker callbacks to host events.
//!
//! The listener is subscribed to exactly one channel, `"{hub}:{self}"`.
//! Broker callbacks arrive on threads the broker owns, so the listener does
//! as little as possible there: decode the frame and queue the event. A
//! dedicated dispatch thread drains the queue into the host's
//! [`EventSink`], which keeps a slow handler from stalling broker I/O.
//!
//! ```text
//! broker thread ──on_message──► decode ──queue──► dispatch thread ──► EventSink
//!                                  │
//!                                  └─ malformed: log + drop
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::broker::SubscriptionHandler;
use crate::codec;
use crate::constants::TRACE_TARGET;
use crate::debug::DebugMode;
use crate::event::{BusEvent, EventSink};

/// Decodes frames from the broker and hands them to an [`EventSink`].
pub struct SubscriptionListener {
    queue: Mutex<Option<std_mpsc::Sender<BusEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    debug: DebugMode,
    malformed: AtomicU64,
}

impl std::fmt::Debug for SubscriptionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionListener")
            .field("malformed", &self.malformed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SubscriptionListener {
    /// Create a listener and start its dispatch thread.
    pub fn new(sink: Arc<dyn EventSink>, debug: DebugMode) -> Self {
        let (tx, rx) = std_mpsc::channel();
        let worker = thread::Builder::new()
            .name("hubbus-dispatch".into())
            .spawn(move || Self::dispatch_loop(&rx, sink.as_ref()));

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to spawn bus dispatch thread: {e}");
                None
            }
        };

        Self {
            queue: Mutex::new(worker.as_ref().map(|_| tx)),
            worker: Mutex::new(worker),
            debug,
            malformed: AtomicU64::new(0),
        }
    }

    /// Dispatch loop - runs on the dedicated thread until the queue closes.
    fn dispatch_loop(rx: &std_mpsc::Receiver<BusEvent>, sink: &dyn EventSink) {
        while let Ok(event) = rx.recv() {
            sink.dispatch(event);
        }
        log::debug!("Bus dispatch thread exiting");
    }

    /// Number of frames dropped because they failed to decode.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Stop accepting events, drain what is queued, and join the thread.
    ///
    /// Safe to call more than once, and from the sink itself.
    pub fn stop(&self) {
        drop(self.queue.lock().unwrap_or_else(PoisonError::into_inner).take());

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from a sink on the dispatch thread; it exits on return.
                return;
            }
            if handle.join().is_err() {
                log::error!("Bus dispatch thread panicked");
            }
        }
    }

    fn enqueue(&self, event: BusEvent) {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    log::warn!("Bus dispatch thread gone; dropping event");
                }
            }
            None => log::debug!("Listener stopped; dropping event on {}", event.channel),
        }
    }
}

impl SubscriptionHandler for SubscriptionListener {
    fn on_message(&self, _channel: &str, message: &str) {
        match codec::decode(message) {
            Ok(frame) => {
                if self.debug.is_enabled() {
                    log::info!(
                        target: TRACE_TARGET,
                        "Received {{source: {}, channel: {}, payload: {}}}",
                        frame.source,
                        frame.channel,
                        frame.payload
                    );
                }
                self.enqueue(BusEvent::from(frame));
            }
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                log::error!("Dropping badly formatted bus message: {e}");
            }
        }
    }

    fn on_subscribed(&self, channel: &str, count: u64) {
        log::debug!("Listener subscribed to {channel} ({count} subscriptions)");
    }

    fn on_unsubscribed(&self, channel: &str, count: u64) {
        log::debug!("Listener unsubscribed from {channel} ({count} subscriptions)");
    }
}

impl Drop for SubscriptionListener {
    fn drop(&mut self) {
        self.stop();
    }
}
