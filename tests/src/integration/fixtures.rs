//! Shared fixtures for the integration scenarios.

use state_bus::{
    BincodeCodec, BusConfig, BusContext, ChannelDescriptor, ChannelRegistry, Message,
    MessageType, Publisher, SubscriberHub, TcpTransport,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for anything that should happen "promptly" on loopback.
pub const SETTLE_LIMIT: Duration = Duration::from_secs(3);

pub fn loopback(port: u16) -> String {
    format!("127.0.0.1:{port}")
}

pub fn settings_channel(name: &str, port: u16, rate_hz: f64) -> ChannelDescriptor {
    ChannelDescriptor::new(name, loopback(port), MessageType::Settings, rate_hz)
}

pub fn location_channel(name: &str, port: u16, rate_hz: f64) -> ChannelDescriptor {
    ChannelDescriptor::new(name, loopback(port), MessageType::LiveLocation, rate_hz)
}

pub fn registry(channels: impl IntoIterator<Item = ChannelDescriptor>) -> ChannelRegistry {
    ChannelRegistry::from_descriptors(channels).expect("valid test registry")
}

/// Bincode over loopback TCP with a short worker poll interval.
pub fn tcp_context() -> BusContext {
    BusContext::new(
        Arc::new(BincodeCodec::new()),
        Arc::new(TcpTransport::new()),
        BusConfig::default().with_poll_interval(Duration::from_millis(20)),
    )
}

/// Poll `condition` every 2 ms until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Publish `warmup` until the hub's latest value on `channel` equals it.
///
/// TCP subscribers attach asynchronously and miss anything sent before, so
/// scenarios call this before asserting on delivery.
pub fn attach(
    publisher: &mut Publisher,
    hub: &SubscriberHub,
    channel: &str,
    warmup: impl Into<Message>,
) -> bool {
    let warmup = warmup.into();
    let deadline = Instant::now() + SETTLE_LIMIT;
    while Instant::now() < deadline {
        publisher
            .publish(warmup.clone())
            .expect("warmup matches channel type");
        if wait_until(Duration::from_millis(20), || {
            matches!(hub.read(channel), Ok(Some(view)) if *view.message() == warmup)
        }) {
            return true;
        }
    }
    false
}
