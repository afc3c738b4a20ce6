//! # Single-Slot Channel Cache
//!
//! One [`CachedEntry`] per subscribed channel, holding only the newest
//! message. The entry owns the channel's single live [`DecodeHandle`]:
//! installing a new message releases the previous handle first, and a
//! staleness clear releases it without a replacement.
//!
//! Entries are not synchronized themselves; the hub keeps them behind one
//! mutex.

use crate::codec::{DecodeHandle, MessageView};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latest message of one channel plus receipt bookkeeping.
#[derive(Debug, Default)]
pub struct CachedEntry {
    raw: Option<Arc<[u8]>>,
    handle: Option<DecodeHandle>,
    received_at: Option<Instant>,
    last_stale_warning_at: Option<Instant>,
    received_count: u64,
}

impl CachedEntry {
    /// An entry that has never received anything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached message, releasing the previous handle.
    pub fn install(&mut self, raw: Arc<[u8]>, handle: DecodeHandle, now: Instant) {
        if let Some(previous) = self.handle.take() {
            previous.release();
        }
        self.raw = Some(raw);
        self.handle = Some(handle);
        self.received_at = Some(now);
        self.received_count += 1;
    }

    /// Release the handle and drop the payload. `received_at` is kept.
    pub fn clear(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
        self.raw = None;
    }

    /// Shared view of the cached message, if any.
    #[must_use]
    pub fn view(&self) -> Option<MessageView> {
        self.handle.as_ref().map(DecodeHandle::view)
    }

    #[must_use]
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        self.handle.is_some()
    }

    #[must_use]
    pub fn received_at(&self) -> Option<Instant> {
        self.received_at
    }

    /// Messages installed since the entry was created.
    #[must_use]
    pub fn received_count(&self) -> u64 {
        self.received_count
    }

    /// Time since the last arrival; `None` if nothing ever arrived.
    #[must_use]
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.received_at.map(|at| now.saturating_duration_since(at))
    }

    /// True iff something arrived and it is no older than `timeout`.
    #[must_use]
    pub fn is_fresh(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now).is_some_and(|age| age <= timeout)
    }

    /// True iff something arrived and it is older than `timeout`.
    #[must_use]
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now).is_some_and(|age| age > timeout)
    }

    /// Throttle for staleness warnings: true at most once per `interval`.
    pub fn take_warning_slot(&mut self, now: Instant, interval: Duration) -> bool {
        let due = self
            .last_stale_warning_at
            .map_or(true, |last| now.saturating_duration_since(last) >= interval);
        if due {
            self.last_stale_warning_at = Some(now);
        }
        due
    }
}
