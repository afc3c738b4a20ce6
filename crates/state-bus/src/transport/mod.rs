//! # Transport Ports
//!
//! Point-to-point publish/subscribe sockets. A publisher binds one address;
//! any number of subscribers connect to it. Delivery preserves message
//! boundaries and per-channel send order, and is at-most-once.
//!
//! ## Implementations
//!
//! - [`TcpTransport`] - loopback TCP with length-prefixed frames (default)
//! - [`InProcTransport`] - in-memory switchboard for single-process use and tests

mod inproc;
mod tcp;

pub use inproc::InProcTransport;
pub use tcp::{TcpPubSocket, TcpSubSocket, TcpTransport};

use crate::errors::TransportError;
use std::time::Duration;

/// Largest payload either transport will carry.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Factory for publish and subscribe endpoints.
///
/// # Thread Safety
///
/// Shared between publishers and hubs through [`crate::BusContext`], so
/// implementations must be `Send + Sync`.
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Bind the publishing end of a channel.
    fn bind(&self, address: &str) -> Result<Box<dyn PubSocket>, TransportError>;

    /// Create the subscribing end of a channel.
    ///
    /// Succeeds even if nothing is bound yet; the socket starts receiving
    /// once a publisher appears.
    fn connect(&self, address: &str) -> Result<Box<dyn SubSocket>, TransportError>;
}

/// Publishing end of a channel.
pub trait PubSocket: Send {
    /// Hand a frame to every connected subscriber without blocking.
    ///
    /// Subscribers that cannot keep up lose the frame.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Number of subscribers currently attached.
    fn subscriber_count(&self) -> usize;

    /// Release the address. Idempotent.
    fn close(&mut self);
}

/// Subscribing end of a channel.
pub trait SubSocket: Send {
    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Disconnect. Idempotent.
    fn close(&mut self);
}
