//! hubbus demo - runs a hub and several workers over the in-process broker.
//!
//! Every node registers itself, workers greet the hub, the hub welcomes
//! each worker back, and everyone prints the registry as they see it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hubbus::{
    ApiSlot, BusApi, BusEvent, ChannelSink, Config, DebugMode, MemoryBroker, MessageBus,
    ServerIdentity,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

/// How long to wait for an expected event before giving up.
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "hubbus", version, about = "Hub/worker messaging bus demo")]
struct Cli {
    /// Hub namespace.
    #[arg(long, default_value = "NetA")]
    hub_name: String,

    /// Worker names to start (repeat or comma-separate).
    #[arg(long = "worker", value_delimiter = ',', default_values_t = [String::from("Lobby"), String::from("Survival")])]
    workers: Vec<String>,

    /// Enable per-frame trace logging.
    #[arg(long)]
    debug: bool,

    /// Read hub name and debug flag from a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

type Node = (Arc<BusApi>, UnboundedReceiver<BusEvent>);

fn build_node(broker: &MemoryBroker, identity: ServerIdentity, debug: bool) -> Node {
    let bus = MessageBus::new(
        Arc::new(broker.connect()),
        identity,
        Handle::current(),
        DebugMode::new(debug),
    );
    let (sink, rx) = ChannelSink::new();
    (Arc::new(BusApi::new(bus, Arc::new(sink))), rx)
}

async fn start_node(broker: &MemoryBroker, identity: ServerIdentity, debug: bool) -> Result<Node> {
    let (api, rx) = build_node(broker, identity.clone(), debug);
    api.start()
        .await
        .with_context(|| format!("Failed to start {identity}"))?;
    Ok((api, rx))
}

async fn next_event(rx: &mut UnboundedReceiver<BusEvent>) -> Option<BusEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv()).await.ok().flatten()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let (hub_name, debug) = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            let hub_name = config.hub_name.unwrap_or_else(|| cli.hub_name.clone());
            (hub_name, config.debug || cli.debug)
        }
        None => (cli.hub_name.clone(), cli.debug),
    };

    let broker = MemoryBroker::new();
    let slot = ApiSlot::new();

    // The slot starts the hub once it owns it.
    let (hub, mut hub_rx) = build_node(&broker, ServerIdentity::hub(&hub_name)?, debug);
    slot.install(Arc::clone(&hub))
        .await
        .context("Failed to start the hub")?;

    let mut workers = Vec::with_capacity(cli.workers.len());
    for name in &cli.workers {
        let identity = ServerIdentity::worker(&hub_name, name)?;
        workers.push(start_node(&broker, identity, debug).await?);
    }

    for (api, _) in &workers {
        let name = api.server_name()?.to_owned();
        api.publish_parts(hubbus::constants::HUB_TOKEN, "greeting", &[name.as_str(), "hello"])?;
    }

    for _ in 0..workers.len() {
        let Some(event) = next_event(&mut hub_rx).await else {
            log::warn!("Hub timed out waiting for greetings");
            break;
        };
        println!("hub <- {}: {:?}", event.source, event.parts());
        hub.publish(&event.source, "welcome", &format!("welcome to {hub_name}"))?;
    }

    for (api, rx) in &mut workers {
        let name = api.server_name()?.to_owned();
        if let Some(event) = next_event(rx).await {
            println!("{name} <- {}: {}", event.source, event.payload);
        }
        api.refresh()?.await?;
        println!(
            "{name} sees servers {:?} (hub online: {})",
            api.cached_servers()?,
            api.is_hub_online()?
        );
    }

    hub.publish(hub.server_name()?, "note", "loopback delivery")?;
    if let Some(event) = next_event(&mut hub_rx).await {
        println!("hub <- self: {}", event.payload);
    }

    for (api, _) in &workers {
        api.shutdown().await?;
    }
    slot.clear().await;
    println!("registry after shutdown: {:?}", broker.members(&format!("{hub_name}:servers")));
    Ok(())
}
