//! # Message Codec
//!
//! Encodes [`Message`] values for the wire and turns received buffers into
//! [`DecodeHandle`]s.
//!
//! ## Handle Discipline
//!
//! A `DecodeHandle` is the owner's claim on one decoded buffer. It is
//! released exactly once, either explicitly through [`DecodeHandle::release`]
//! or when dropped. Readers get [`MessageView`]s, cheap shared views of the
//! same decoded value that stay valid after the handle is released.
//!
//! Every codec counts its outstanding handles so leaks are observable
//! through [`Codec::live_handles`].

use crate::errors::CodecError;
use crate::schema::{Message, MessageType};
use crate::transport::MAX_FRAME_LEN;
use bincode::Options;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Encoder/decoder for channel payloads.
pub trait Codec: Send + Sync {
    /// Serialize a message.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Decode a buffer expected to carry `expected`.
    ///
    /// The returned handle keeps `raw` alive and must be released by its owner.
    fn decode(&self, expected: MessageType, raw: Arc<[u8]>) -> Result<DecodeHandle, CodecError>;

    /// Number of handles issued and not yet released.
    fn live_handles(&self) -> usize;
}

/// Counts outstanding handles for a codec.
#[derive(Debug, Clone, Default)]
pub struct HandleTracker {
    live: Arc<AtomicUsize>,
}

impl HandleTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a decoded view in a tracked handle.
    #[must_use]
    pub fn issue(&self, view: MessageView) -> DecodeHandle {
        self.live.fetch_add(1, Ordering::AcqRel);
        DecodeHandle {
            view,
            live: Some(self.live.clone()),
        }
    }

    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

struct Decoded {
    raw: Arc<[u8]>,
    message: Message,
}

/// Shared, read-only view of a decoded message and the buffer it came from.
#[derive(Clone)]
pub struct MessageView {
    inner: Arc<Decoded>,
}

impl MessageView {
    #[must_use]
    pub fn new(raw: Arc<[u8]>, message: Message) -> Self {
        Self {
            inner: Arc::new(Decoded { raw, message }),
        }
    }

    #[must_use]
    pub fn message(&self) -> &Message {
        &self.inner.message
    }

    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.inner.message.message_type()
    }

    /// The received bytes this view was decoded from.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.inner.raw
    }

    /// True if both views share the same decoded value.
    #[must_use]
    pub fn ptr_eq(&self, other: &MessageView) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for MessageView {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.inner.message
    }
}

impl std::fmt::Debug for MessageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageView")
            .field("message", &self.inner.message)
            .field("raw_len", &self.inner.raw.len())
            .finish()
    }
}

/// Owned claim on a decoded buffer. Released exactly once.
pub struct DecodeHandle {
    view: MessageView,
    live: Option<Arc<AtomicUsize>>,
}

impl DecodeHandle {
    /// A new shared view of the decoded message.
    #[must_use]
    pub fn view(&self) -> MessageView {
        self.view.clone()
    }

    #[must_use]
    pub fn raw(&self) -> &[u8] {
        self.view.raw()
    }

    /// Give up the claim on the buffer.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for DecodeHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for DecodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeHandle")
            .field("view", &self.view)
            .field("released", &self.live.is_none())
            .finish()
    }
}

/// Bincode codec (varint encoding, bounded size, no trailing bytes).
#[derive(Debug, Clone, Default)]
pub struct BincodeCodec {
    tracker: HandleTracker,
}

impl BincodeCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_limit(MAX_FRAME_LEN as u64)
            .reject_trailing_bytes()
    }
}

impl Codec for BincodeCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        Self::options()
            .serialize(message)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, expected: MessageType, raw: Arc<[u8]>) -> Result<DecodeHandle, CodecError> {
        let message: Message = Self::options()
            .deserialize(&raw)
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        let actual = message.message_type();
        if actual != expected {
            return Err(CodecError::TypeMismatch { expected, actual });
        }

        Ok(self.tracker.issue(MessageView::new(raw, message)))
    }

    fn live_handles(&self) -> usize {
        self.tracker.live()
    }
}
