//! Bus Monitor: State Bus debug tool
//!
//! Subscribes to registered channels and prints their latest values or
//! liveness, or publishes a JSON-described message at a channel's rate.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use state_bus::{
    ChannelRegistry, LiveLocation, Message, MessageType, MessageView, Publisher, RateKeeper,
    Settings, SubscriberHub,
};

/// Bus Monitor: inspect and drive State Bus channels
#[derive(Parser, Debug)]
#[command(name = "bus-monitor")]
#[command(about = "Debug monitor for State Bus channels")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every channel's latest value at a fixed interval
    Watch(WatchArgs),
    /// Print the liveness of every channel once
    Alive(AliveArgs),
    /// Publish a JSON message on a channel at its registered rate
    Publish(PublishArgs),
}

#[derive(Args, Debug)]
struct RegistryArgs {
    /// Channel registry (TOML)
    #[arg(short, long, default_value = "channels.toml")]
    registry: PathBuf,

    /// Channels to subscribe to (default: all registered)
    #[arg(short, long = "channel")]
    channels: Vec<String>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    registry: RegistryArgs,

    /// Print interval in milliseconds
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Stop after this many prints
    #[arg(long)]
    count: Option<u64>,
}

#[derive(Args, Debug)]
struct AliveArgs {
    #[command(flatten)]
    registry: RegistryArgs,

    /// How long to listen before reporting, in milliseconds
    #[arg(long, default_value = "1000")]
    settle_ms: u64,
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// Channel registry (TOML)
    #[arg(short, long, default_value = "channels.toml")]
    registry: PathBuf,

    /// Channel to publish on
    #[arg(short, long)]
    channel: String,

    /// Message body as JSON; omitted fields take their defaults
    #[arg(long, default_value = "{}")]
    json: String,

    /// Stop after this many messages
    #[arg(long)]
    count: Option<u64>,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Watch(args) => watch(args),
        Command::Alive(args) => alive(args),
        Command::Publish(args) => publish(args),
    }
}

/// `STATE_BUS_LOG` wins over `RUST_LOG`; both fall back to `info`.
fn init_logging() {
    let filter = std::env::var("STATE_BUS_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_registry(path: &Path) -> Result<ChannelRegistry> {
    ChannelRegistry::load(path)
        .with_context(|| format!("loading channel registry {}", path.display()))
}

fn open_hub(args: &RegistryArgs, registry: &ChannelRegistry) -> Result<SubscriberHub> {
    let hub = if args.channels.is_empty() {
        SubscriberHub::open_all(registry)
    } else {
        SubscriberHub::open(&args.channels, registry)
    };
    hub.context("subscribing to channels")
}

fn watch(args: WatchArgs) -> Result<()> {
    let registry = load_registry(&args.registry.registry)?;
    let hub = open_hub(&args.registry, &registry)?;
    let mut keeper =
        RateKeeper::with_interval("bus-monitor", Duration::from_millis(args.interval_ms.max(1)));

    info!(channels = hub.names().count(), "Watching");
    let mut printed = 0u64;
    loop {
        keeper.tick();
        for name in hub.names() {
            println!("{}", render(name, hub.read(name)?.as_ref())?);
        }
        printed += 1;
        if args.count.is_some_and(|count| printed >= count) {
            return Ok(());
        }
    }
}

fn alive(args: AliveArgs) -> Result<()> {
    let registry = load_registry(&args.registry.registry)?;
    let hub = open_hub(&args.registry, &registry)?;

    thread::sleep(Duration::from_millis(args.settle_ms));
    println!("{}", serde_json::to_string_pretty(&hub.alive())?);
    Ok(())
}

fn publish(args: PublishArgs) -> Result<()> {
    let registry = load_registry(&args.registry)?;
    let descriptor = registry.get(&args.channel)?;
    let message = parse_message(descriptor.message_type, &args.json)?;

    let mut publisher = Publisher::open(&args.channel, &registry)?;
    let mut keeper = publisher.rate_keeper();
    info!(
        channel = %args.channel,
        rate_hz = publisher.rate_hz(),
        "Publishing"
    );

    let mut sent = 0u64;
    while args.count.map_or(true, |count| sent < count) {
        publisher.publish(message.clone())?;
        sent += 1;
        keeper.tick();
    }

    publisher.close();
    Ok(())
}

/// Parse `json` as the body of a `message_type` payload.
fn parse_message(message_type: MessageType, json: &str) -> Result<Message> {
    let message = match message_type {
        MessageType::Settings => serde_json::from_str::<Settings>(json).map(Message::from),
        MessageType::LiveLocation => {
            serde_json::from_str::<LiveLocation>(json).map(Message::from)
        }
    };
    message.with_context(|| format!("parsing {message_type} message"))
}

/// One output line for `name`.
fn render(name: &str, view: Option<&MessageView>) -> Result<String> {
    let Some(view) = view else {
        return Ok(format!("{name}: no recent message"));
    };
    let body = match view.message() {
        Message::Settings(settings) => serde_json::to_string(settings)?,
        Message::LiveLocation(location) => serde_json::to_string(location)?,
    };
    Ok(format!("{name} [{}]: {body}", view.message_type()))
}
