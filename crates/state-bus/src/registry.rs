//! # Channel Registry
//!
//! Static mapping of channel name → address, payload type and nominal rate.
//! Loaded once at startup and shared read-only by publishers and hubs.

use crate::errors::{BusError, ConfigError};
use crate::schema::MessageType;
use crate::DEFAULT_RATE_HZ;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Resolved, validated description of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    pub name: String,
    pub address: String,
    pub message_type: MessageType,
    pub rate_hz: f64,
}

impl ChannelDescriptor {
    /// Build a descriptor. Validation happens when it is added to a registry.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        message_type: MessageType,
        rate_hz: f64,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            message_type,
            rate_hz,
        }
    }

    /// Nominal gap between two messages.
    ///
    /// Saturates to [`Duration::MAX`] when the rate is too low to represent.
    #[must_use]
    pub fn period(&self) -> Duration {
        saturating_secs(1.0 / self.rate_hz)
    }

    /// Silence tolerated before the channel counts as stale: `factor / rate_hz`.
    ///
    /// Saturates to [`Duration::MAX`] like [`Self::period`].
    #[must_use]
    pub fn timeout(&self, staleness_factor: f64) -> Duration {
        saturating_secs(staleness_factor / self.rate_hz)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 {
            return Err(ConfigError::InvalidRate {
                channel: self.name.clone(),
                rate_hz: self.rate_hz.to_string(),
            });
        }
        if self.address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidAddress {
                channel: self.name.clone(),
                address: self.address.clone(),
            });
        }
        Ok(())
    }
}

fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Registry file structure.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelEntry {
    name: String,
    address: String,
    #[serde(rename = "type")]
    type_tag: String,
    rate_hz: Option<f64>,
}

/// Name-indexed set of channel descriptors.
///
/// # Registry File Format
///
/// ```toml
/// [[channels]]
/// name = "nav"
/// address = "127.0.0.1:9001"
/// type = "Settings"
/// rate_hz = 5        # optional, defaults to 1
///
/// [[channels]]
/// name = "location"
/// address = "127.0.0.1:9002"
/// type = "LiveLocation"
/// rate_hz = 20
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, ChannelDescriptor>,
}

impl ChannelRegistry {
    /// Load a registry from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise any
    /// error from [`ChannelRegistry::parse`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse a registry from a TOML string.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Parse` - malformed TOML or missing fields
    /// - `ConfigError::UnknownType` - type tag not in the schema
    /// - `ConfigError::DuplicateChannel` - name listed twice
    /// - `ConfigError::InvalidRate` / `ConfigError::InvalidAddress`
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let descriptors = file
            .channels
            .into_iter()
            .map(|entry| {
                let message_type =
                    entry
                        .type_tag
                        .parse::<MessageType>()
                        .map_err(|type_tag| ConfigError::UnknownType {
                            channel: entry.name.clone(),
                            type_tag,
                        })?;
                Ok(ChannelDescriptor {
                    name: entry.name,
                    address: entry.address,
                    message_type,
                    rate_hz: entry.rate_hz.unwrap_or(DEFAULT_RATE_HZ),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::from_descriptors(descriptors)
    }

    /// Build a registry from descriptors, applying the same validation as
    /// file loading.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ChannelDescriptor>,
    ) -> Result<Self, ConfigError> {
        let mut channels = BTreeMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if channels.contains_key(&descriptor.name) {
                return Err(ConfigError::DuplicateChannel(descriptor.name));
            }
            channels.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self { channels })
    }

    /// Look up a channel.
    ///
    /// # Errors
    ///
    /// `BusError::UnknownChannel` if the name is not registered.
    pub fn get(&self, name: &str) -> Result<&ChannelDescriptor, BusError> {
        self.channels
            .get(name)
            .ok_or_else(|| BusError::UnknownChannel(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelDescriptor> {
        self.channels.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
