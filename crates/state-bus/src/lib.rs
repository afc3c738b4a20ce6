//! # State Bus - Latest-Value Publish/Subscribe
//!
//! Periodic services exchange typed, timestamped state over named channels
//! without knowing about each other.
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────┐   publish()   ┌───────────┐   recv   ┌──────────────────┐
//! │  Publisher   │ ────────────→ │ Transport │ ───────→ │ SubscriberHub    │
//! │ (one channel)│               └───────────┘          │  worker/channel  │
//! └──────────────┘                                      │        │         │
//!                                                       │        ▼         │
//!                                  read() / is_alive()  │  single-slot     │
//!                              ←─────────────────────── │  cache (Mutex)   │
//!                                                       └──────────────────┘
//! ```
//!
//! ## Semantics
//!
//! - **Latest wins:** each channel caches only its newest message; there is no queue.
//! - **Staleness:** a cached message older than `K / rate_hz` (K = 10 by default)
//!   is dropped and reads report no data until the channel recovers.
//! - **Fire-and-forget:** publishers never block on slow or absent subscribers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use state_bus::{ChannelRegistry, Publisher, Settings, SubscriberHub};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ChannelRegistry::parse(r#"
//!     [[channels]]
//!     name = "nav"
//!     address = "127.0.0.1:9001"
//!     type = "Settings"
//!     rate_hz = 5
//! "#)?;
//!
//! let mut publisher = Publisher::open("nav", &registry)?;
//! let hub = SubscriberHub::open(["nav"], &registry)?;
//!
//! let mut keeper = publisher.rate_keeper();
//! loop {
//!     publisher.publish(Settings { search_input: 42, ..Default::default() })?;
//!     if let Some(view) = hub.read("nav")? {
//!         println!("{:?}", view.message());
//!     }
//!     keeper.tick();
//! }
//! # }
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod cache;
pub mod codec;
pub mod config;
pub mod errors;
pub mod publisher;
pub mod rate_keeper;
pub mod registry;
pub mod schema;
pub mod subscriber;
pub mod transport;

// Re-export main types
pub use codec::{BincodeCodec, Codec, DecodeHandle, MessageView};
pub use config::{BusConfig, BusContext, RateKeeperConfig};
pub use errors::{BusError, CodecError, ConfigError, TransportError};
pub use publisher::Publisher;
pub use rate_keeper::RateKeeper;
pub use registry::{ChannelDescriptor, ChannelRegistry};
pub use schema::{LiveLocation, Maneuver, Measurement, Message, MessageType, Settings};
pub use subscriber::SubscriberHub;
pub use transport::{InProcTransport, PubSocket, SubSocket, TcpTransport, Transport};

/// Allowed silence, in nominal periods, before a channel is considered stale.
pub const DEFAULT_STALENESS_FACTOR: f64 = 10.0;

/// Bounded receive timeout used by subscriber workers.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Nominal rate assumed for registry entries that omit `rate_hz`.
pub const DEFAULT_RATE_HZ: f64 = 1.0;
