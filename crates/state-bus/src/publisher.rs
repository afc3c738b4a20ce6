//! # Channel Publisher
//!
//! The publishing side of one channel: owns the bound endpoint and encodes
//! values with the context's codec. Fire-and-forget: a send never waits for
//! subscribers and a failed send is logged, not returned.

use crate::codec::Codec;
use crate::config::{BusContext, RateKeeperConfig};
use crate::errors::BusError;
use crate::rate_keeper::RateKeeper;
use crate::registry::{ChannelDescriptor, ChannelRegistry};
use crate::schema::Message;
use crate::transport::PubSocket;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Publisher for a single channel.
pub struct Publisher {
    descriptor: ChannelDescriptor,
    codec: Arc<dyn Codec>,
    socket: Option<Box<dyn PubSocket>>,
    messages_published: u64,
}

impl Publisher {
    /// Bind `name` with bincode over loopback TCP.
    ///
    /// # Errors
    ///
    /// - `BusError::UnknownChannel` - `name` is not registered
    /// - `BusError::Transport` - the address could not be bound
    pub fn open(name: &str, registry: &ChannelRegistry) -> Result<Self, BusError> {
        Self::open_with(name, registry, &BusContext::default())
    }

    /// Bind `name` using the given codec and transport.
    pub fn open_with(
        name: &str,
        registry: &ChannelRegistry,
        context: &BusContext,
    ) -> Result<Self, BusError> {
        let descriptor = registry.get(name)?.clone();
        let socket = context.transport.bind(&descriptor.address)?;

        info!(
            channel = %descriptor.name,
            address = %descriptor.address,
            message_type = %descriptor.message_type,
            rate_hz = descriptor.rate_hz,
            transport = context.transport.name(),
            "Publisher bound"
        );

        Ok(Self {
            descriptor,
            codec: context.codec.clone(),
            socket: Some(socket),
            messages_published: 0,
        })
    }

    /// Encode and send `value` to whoever is subscribed.
    ///
    /// # Errors
    ///
    /// - `BusError::TypeMismatch` - `value` is not the channel's declared type
    /// - `BusError::Codec` - encoding failed
    /// - `BusError::Closed` - the publisher was closed
    ///
    /// Transport failures are logged and dropped.
    pub fn publish(&mut self, value: impl Into<Message>) -> Result<(), BusError> {
        let message = value.into();
        let actual = message.message_type();
        if actual != self.descriptor.message_type {
            return Err(BusError::TypeMismatch {
                channel: self.descriptor.name.clone(),
                expected: self.descriptor.message_type,
                actual,
            });
        }

        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| BusError::Closed(self.descriptor.name.clone()))?;
        let bytes = self.codec.encode(&message)?;

        // Always count the attempt; delivery is not guaranteed.
        self.messages_published += 1;

        if let Err(e) = socket.send(&bytes) {
            warn!(
                channel = %self.descriptor.name,
                error = %e,
                "Message dropped (send failed)"
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Nominal publish rate from the registry.
    #[must_use]
    pub fn rate_hz(&self) -> f64 {
        self.descriptor.rate_hz
    }

    #[must_use]
    pub fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    /// Publish attempts so far.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.messages_published
    }

    /// Subscribers currently attached to the endpoint.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.socket.as_ref().map_or(0, |s| s.subscriber_count())
    }

    /// A rate keeper paced at this channel's nominal rate.
    #[must_use]
    pub fn rate_keeper(&self) -> RateKeeper {
        RateKeeper::with_config(
            self.descriptor.name.clone(),
            self.descriptor.period(),
            RateKeeperConfig::default(),
        )
    }

    /// Release the address. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close();
            debug!(channel = %self.descriptor.name, "Publisher closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}
