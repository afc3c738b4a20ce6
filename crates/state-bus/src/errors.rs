//! # Bus Errors
//!
//! One enum per concern, folded into [`BusError`] at the public API.
//!
//! | Error | Raised by | Handling |
//! |---|---|---|
//! | [`ConfigError`] | registry load | fatal at startup |
//! | [`BusError::UnknownChannel`] | open / read / is_alive | returned to caller |
//! | [`CodecError`] | publish (encode), workers (decode) | encode: returned; decode: logged, buffer dropped |
//! | [`TransportError`] | bind/connect/send/recv | bind: returned; send/recv: logged |

use crate::schema::MessageType;
use thiserror::Error;

/// Errors surfaced by public bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The name is not registered, or not subscribed on this hub.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// A value of one type was published on a channel declared for another.
    #[error("channel {channel} carries {expected}, got {actual}")]
    TypeMismatch {
        channel: String,
        expected: MessageType,
        actual: MessageType,
    },

    /// Operation attempted after `close()`.
    #[error("channel {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Registry loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The registry source could not be read.
    #[error("failed to read registry {path}: {error}")]
    Io { path: String, error: String },

    /// The registry source is not valid TOML or does not match the schema.
    #[error("malformed registry: {0}")]
    Parse(String),

    /// An entry names a message type the schema does not define.
    #[error("channel {channel} references unknown type {type_tag}")]
    UnknownType { channel: String, type_tag: String },

    /// Two entries share a name.
    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),

    /// `rate_hz` is zero, negative or not finite.
    #[error("channel {channel} has invalid rate {rate_hz}")]
    InvalidRate { channel: String, rate_hz: String },

    /// The address is not a `host:port` socket address.
    #[error("channel {channel} has invalid address {address}")]
    InvalidAddress { channel: String, address: String },
}

/// Encode/decode errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),

    /// The payload decoded cleanly but carries a different message type.
    #[error("expected {expected} payload, decoded {actual}")]
    TypeMismatch {
        expected: MessageType,
        actual: MessageType,
    },
}

/// Socket-level errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to bind {address}: {error}")]
    Bind { address: String, error: String },

    #[error("failed to connect {address}: {error}")]
    Connect { address: String, error: String },

    /// The remote end went away; the subscriber reconnects on its own.
    #[error("connection to {0} lost")]
    Disconnected(String),

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Another publisher already holds the address (in-process transport only).
    #[error("address {0} already bound")]
    AddressInUse(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("socket closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
