//! Message bus: publishing frames and owning the broker connection.
//!
//! [`MessageBus`] composes the registry, the codec, and the broker. It
//! stamps every outgoing frame with this process as the source and routes
//! it to `"{hub}:{dest}"`.
//!
//! # Publishing modes
//!
//! | Method                        | Blocks caller | Intended use               |
//! |-------------------------------|---------------|----------------------------|
//! | [`MessageBus::publish`]       | awaits        | async code                 |
//! | [`MessageBus::publish_async`] | no            | fire-and-forget from sync  |
//! | [`MessageBus::publish_sync`]  | yes           | setup / teardown paths     |
//!
//! Self-delivery is not handled here: a publish to this process's own name
//! goes through the broker like any other. The facade short-circuits that
//! case before it reaches the bus.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::broker::{SharedBroker, SubscriptionHandler};
use crate::codec;
use crate::constants::TRACE_TARGET;
use crate::debug::DebugMode;
use crate::error::{BusError, Result};
use crate::event::EventSink;
use crate::identity::ServerIdentity;
use crate::listener::SubscriptionListener;
use crate::registry::ServerRegistry;

/// Publishes frames for one process and owns its broker connection.
pub struct MessageBus {
    broker: SharedBroker,
    identity: ServerIdentity,
    registry: ServerRegistry,
    runtime: Handle,
    debug: DebugMode,
    listener: Mutex<Option<Arc<SubscriptionListener>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("identity", &self.identity)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MessageBus {
    /// Create a bus over a live broker connection.
    ///
    /// `runtime` drives background publishes, refreshes, and is the context
    /// `publish_sync` blocks on.
    pub fn new(
        broker: SharedBroker,
        identity: ServerIdentity,
        runtime: Handle,
        debug: DebugMode,
    ) -> Self {
        let registry = ServerRegistry::new(
            Arc::clone(&broker),
            identity.clone(),
            runtime.clone(),
            debug.clone(),
        );
        Self {
            broker,
            identity,
            registry,
            runtime,
            debug,
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// This process's identity.
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// The registry client.
    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Runtime that drives background publishes and refreshes.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Shared debug toggle.
    pub fn debug(&self) -> &DebugMode {
        &self.debug
    }

    /// Register this process in the server set.
    pub async fn setup(&self) -> Result<()> {
        self.ensure_open()?;
        self.registry.setup().await
    }

    /// Subscribe to this process's channel, forwarding events to `sink`.
    ///
    /// Replaces (and stops) any listener started earlier.
    pub async fn start_listener(&self, sink: Arc<dyn EventSink>) -> Result<()> {
        self.ensure_open()?;
        let channel = self.identity.subscribe_channel();
        let listener = Arc::new(SubscriptionListener::new(sink, self.debug.clone()));
        let handler: Arc<dyn SubscriptionHandler> = Arc::clone(&listener) as _;
        self.broker.subscribe(&channel, handler).await?;

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener);
        if let Some(previous) = previous {
            self.stop_listener(previous).await;
        }
        Ok(())
    }

    /// Stop `listener` off the async workers.
    ///
    /// Stopping joins the dispatch thread, which waits for queued sink calls.
    async fn stop_listener(&self, listener: Arc<SubscriptionListener>) {
        let stopped = self.runtime.spawn_blocking(move || listener.stop());
        if let Err(e) = stopped.await {
            log::error!("Listener stop task failed: {e}");
        }
    }

    /// Publish `payload` to `dest` on `channel` and await the receiver count.
    ///
    /// A count of zero means nobody was subscribed; it is not an error.
    pub async fn publish(&self, dest: &str, channel: &str, payload: &str) -> Result<u64> {
        self.ensure_open()?;
        send_frame(&self.broker, &self.identity, &self.debug, dest, channel, payload).await
    }

    /// Publish in the background and return immediately.
    ///
    /// The handle resolves to the receiver count; dropping it detaches the
    /// task without cancelling the publish.
    pub fn publish_async(
        &self,
        dest: &str,
        channel: &str,
        payload: &str,
    ) -> JoinHandle<Result<u64>> {
        let broker = Arc::clone(&self.broker);
        let identity = self.identity.clone();
        let debug = self.debug.clone();
        let closed = self.closed.load(Ordering::SeqCst);
        let (dest, channel, payload) = (dest.to_owned(), channel.to_owned(), payload.to_owned());

        self.runtime.spawn(async move {
            if closed {
                return Err(BusError::ShutDown);
            }
            send_frame(&broker, &identity, &debug, &dest, &channel, &payload).await
        })
    }

    /// Publish and block the calling thread until the broker answers.
    ///
    /// Reserved for host setup/teardown hooks running on plain threads.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::BlockingInAsyncContext`] when called from a thread
    /// that is driving a tokio runtime, where blocking would stall it.
    ///
    /// Threads started by `spawn_blocking` also carry a runtime context and
    /// are refused the same way, even though blocking there would be legal.
    /// From those threads, use `runtime().block_on(bus.publish(..))`.
    pub fn publish_sync(&self, dest: &str, channel: &str, payload: &str) -> Result<u64> {
        if Handle::try_current().is_ok() {
            return Err(BusError::BlockingInAsyncContext);
        }
        self.runtime.block_on(self.publish(dest, channel, payload))
    }

    /// Unsubscribe, deregister, and close the broker connection.
    ///
    /// The connection is closed exactly once; later calls are no-ops.
    /// Unsubscribe and deregistration failures are logged, not returned, so
    /// the connection is always released.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            let channel = self.identity.subscribe_channel();
            if let Err(e) = self.broker.unsubscribe(&channel).await {
                log::warn!("Failed to unsubscribe from {channel}: {e}");
            }
            self.stop_listener(listener).await;
        }

        if let Err(e) = self.registry.teardown().await {
            log::warn!("Failed to deregister {}: {e}", self.identity);
        }
        self.registry.clear();
        self.broker.close().await;
        log::info!("Message bus for {} shut down", self.identity);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BusError::ShutDown)
        } else {
            Ok(())
        }
    }
}

async fn send_frame(
    broker: &SharedBroker,
    identity: &ServerIdentity,
    debug: &DebugMode,
    dest: &str,
    channel: &str,
    payload: &str,
) -> Result<u64> {
    let target = identity.channel_for(dest);
    let frame = codec::encode(identity.name(), channel, payload);
    if debug.is_enabled() {
        log::info!(
            target: TRACE_TARGET,
            "Publish {{dest: {dest}, channel: {channel}, payload: {payload}}}"
        );
    }

    let receivers = broker.publish(&target, &frame).await?;
    if receivers == 0 {
        log::debug!("No subscribers on {target} for channel {channel}");
    }
    Ok(receivers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::event::{BusEvent, ChannelSink};
    use std::time::Duration;

    fn bus(broker: &MemoryBroker, name: &str) -> MessageBus {
        MessageBus::new(
            Arc::new(broker.connect()),
            ServerIdentity::worker("NetA", name).unwrap(),
            Handle::current(),
            DebugMode::default(),
        )
    }

    async fn recv(rx: &mut tokio::sync::mpsc::UnboundedReceiver<BusEvent>) -> BusEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed")
    }

    #[tokio::test]
    async fn test_publish_routes_to_destination_channel() {
        let broker = MemoryBroker::new();
        let lobby = bus(&broker, "Lobby");
        let survival = bus(&broker, "Survival");
        let (sink, mut rx) = ChannelSink::new();
        survival.start_listener(Arc::new(sink)).await.unwrap();

        let count = lobby.publish("Survival", "chat", "hello").await.unwrap();
        assert_eq!(count, 1);

        let event = recv(&mut rx).await;
        assert_eq!(event, BusEvent::new("Lobby", "chat", "hello"));
    }

    #[tokio::test]
    async fn test_publish_with_no_listener_returns_zero() {
        let broker = MemoryBroker::new();
        let lobby = bus(&broker, "Lobby");
        assert_eq!(lobby.publish("Nowhere", "chat", "x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_async_resolves_to_count() {
        let broker = MemoryBroker::new();
        let lobby = bus(&broker, "Lobby");
        let survival = bus(&broker, "Survival");
        let (sink, _rx) = ChannelSink::new();
        survival.start_listener(Arc::new(sink)).await.unwrap();

        let count = lobby.publish_async("Survival", "chat", "hi").await.unwrap().unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_publish_to_self_goes_through_broker() {
        let broker = MemoryBroker::new();
        let lobby = bus(&broker, "Lobby");
        let (sink, mut rx) = ChannelSink::new();
        lobby.start_listener(Arc::new(sink)).await.unwrap();

        assert_eq!(lobby.publish("Lobby", "echo", "x").await.unwrap(), 1);
        assert_eq!(recv(&mut rx).await.source, "Lobby");
    }

    #[tokio::test]
    async fn test_publish_sync_refuses_inside_runtime() {
        let broker = MemoryBroker::new();
        let lobby = bus(&broker, "Lobby");
        assert!(matches!(
            lobby.publish_sync("HUB", "c", "p"),
            Err(BusError::BlockingInAsyncContext)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_pool_threads_use_block_on_instead() {
        let broker = MemoryBroker::new();
        let lobby = Arc::new(bus(&broker, "Lobby"));

        let (refused, count) = tokio::task::spawn_blocking({
            let lobby = Arc::clone(&lobby);
            move || {
                let refused = matches!(
                    lobby.publish_sync("HUB", "c", "p"),
                    Err(BusError::BlockingInAsyncContext)
                );
                let count = lobby.runtime().block_on(lobby.publish("HUB", "c", "p"));
                (refused, count)
            }
        })
        .await
        .unwrap();

        assert!(refused);
        assert_eq!(count.unwrap(), 0);
    }

    #[test]
    fn test_publish_sync_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let broker = MemoryBroker::new();
        let listener_conn = Arc::new(broker.connect());
        let (sink, _rx) = ChannelSink::new();
        let hub = MessageBus::new(
            listener_conn,
            ServerIdentity::hub("NetA").unwrap(),
            runtime.handle().clone(),
            DebugMode::default(),
        );
        runtime
            .block_on(hub.start_listener(Arc::new(sink)))
            .unwrap();

        let lobby = MessageBus::new(
            Arc::new(broker.connect()),
            ServerIdentity::worker("NetA", "Lobby").unwrap(),
            runtime.handle().clone(),
            DebugMode::default(),
        );
        assert_eq!(lobby.publish_sync("HUB", "startup", "Lobby").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_deregisters_and_closes_once() {
        let broker = MemoryBroker::new();
        let conn = Arc::new(broker.connect());
        let lobby = MessageBus::new(
            Arc::clone(&conn) as SharedBroker,
            ServerIdentity::worker("NetA", "Lobby").unwrap(),
            Handle::current(),
            DebugMode::default(),
        );
        let (sink, _rx) = ChannelSink::new();
        lobby.setup().await.unwrap();
        lobby.start_listener(Arc::new(sink)).await.unwrap();
        assert!(broker.members("NetA:servers").contains("Lobby"));
        assert_eq!(broker.subscriber_count("NetA:Lobby"), 1);

        lobby.shutdown().await;
        lobby.shutdown().await;

        assert!(conn.is_closed());
        assert!(broker.members("NetA:servers").is_empty());
        assert_eq!(broker.subscriber_count("NetA:Lobby"), 0);
        assert!(matches!(
            lobby.publish("HUB", "c", "p").await,
            Err(BusError::ShutDown)
        ));
        assert!(matches!(
            lobby.publish_async("HUB", "c", "p").await.unwrap(),
            Err(BusError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_with_slow_sink_keeps_runtime_responsive() {
        let broker = MemoryBroker::new();
        let hub = MessageBus::new(
            Arc::new(broker.connect()),
            ServerIdentity::hub("NetA").unwrap(),
            Handle::current(),
            DebugMode::default(),
        );
        let sink = |_event: BusEvent| std::thread::sleep(Duration::from_millis(600));
        hub.start_listener(Arc::new(sink)).await.unwrap();

        let lobby = bus(&broker, "Lobby");
        assert_eq!(lobby.publish("HUB", "chat", "slow").await.unwrap(), 1);

        let started = std::time::Instant::now();
        let ((), timer_fired) = tokio::join!(hub.shutdown(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });

        assert!(
            timer_fired < Duration::from_millis(300),
            "timer delayed by shutdown: {timer_fired:?}"
        );
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_publish_fails_while_broker_offline() {
        let broker = MemoryBroker::new();
        let lobby = bus(&broker, "Lobby");
        broker.set_online(false);
        assert!(matches!(
            lobby.publish("HUB", "c", "p").await,
            Err(BusError::Broker(_))
        ));
        broker.set_online(true);
        assert_eq!(lobby.publish("HUB", "c", "p").await.unwrap(), 0);
    }
}
