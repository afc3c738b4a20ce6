//! # Subscriber Hub
//!
//! Subscribes to a set of channels and keeps the newest message of each in a
//! single-slot cache.
//!
//! ## Threading
//!
//! One background worker per channel receives with a bounded timeout,
//! decodes outside the lock and installs the result under the hub's single
//! mutex. Reads take the same mutex, so a reader never observes a
//! half-installed entry.
//!
//! ## Staleness
//!
//! A channel is stale once its last arrival is older than
//! `staleness_factor / rate_hz`. `read()` on a stale channel drops the cached
//! message, emits a throttled warning and returns `None`; `is_alive()` only
//! inspects.

use crate::cache::CachedEntry;
use crate::codec::{Codec, MessageView};
use crate::config::{BusConfig, BusContext};
use crate::errors::{BusError, TransportError};
use crate::registry::{ChannelDescriptor, ChannelRegistry};
use crate::schema::MessageType;
use crate::transport::SubSocket;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Entries = Arc<Mutex<HashMap<String, CachedEntry>>>;

/// Join polling step used while waiting for workers to exit.
const JOIN_POLL: Duration = Duration::from_millis(5);

struct Worker {
    channel: String,
    handle: Option<JoinHandle<()>>,
}

/// Latest-value subscriber for one or more channels.
pub struct SubscriberHub {
    descriptors: BTreeMap<String, ChannelDescriptor>,
    entries: Entries,
    running: Arc<AtomicBool>,
    workers: Vec<Worker>,
    config: BusConfig,
}

impl SubscriberHub {
    /// Subscribe to `names` with bincode over loopback TCP.
    ///
    /// # Errors
    ///
    /// - `BusError::UnknownChannel` - a name is not registered
    /// - `BusError::Transport` - a connection could not be created
    ///
    /// No worker is left running when this fails.
    pub fn open<I, S>(names: I, registry: &ChannelRegistry) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::open_with(names, registry, &BusContext::default())
    }

    /// Subscribe to every registered channel.
    pub fn open_all(registry: &ChannelRegistry) -> Result<Self, BusError> {
        Self::open(registry.names(), registry)
    }

    /// Subscribe to `names` using the given codec, transport and config.
    pub fn open_with<I, S>(
        names: I,
        registry: &ChannelRegistry,
        context: &BusContext,
    ) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Resolve everything before starting any worker.
        let mut descriptors = BTreeMap::new();
        for name in names {
            let descriptor = registry.get(name.as_ref())?;
            descriptors
                .entry(descriptor.name.clone())
                .or_insert_with(|| descriptor.clone());
        }

        let mut hub = Self {
            entries: Arc::new(Mutex::new(
                descriptors
                    .keys()
                    .map(|name| (name.clone(), CachedEntry::new()))
                    .collect(),
            )),
            descriptors,
            running: Arc::new(AtomicBool::new(true)),
            workers: Vec::new(),
            config: context.config.clone(),
        };

        // On error `hub` is dropped here, which stops the workers started so far.
        let channels: Vec<ChannelDescriptor> = hub.descriptors.values().cloned().collect();
        for descriptor in channels {
            hub.spawn_worker(descriptor, context)?;
        }

        info!(
            channels = hub.descriptors.len(),
            transport = context.transport.name(),
            "Subscriber hub started"
        );
        Ok(hub)
    }

    fn spawn_worker(
        &mut self,
        descriptor: ChannelDescriptor,
        context: &BusContext,
    ) -> Result<(), BusError> {
        let socket = context.transport.connect(&descriptor.address)?;
        let worker = ChannelWorker {
            channel: descriptor.name.clone(),
            message_type: descriptor.message_type,
            socket,
            codec: context.codec.clone(),
            entries: self.entries.clone(),
            running: self.running.clone(),
            poll_interval: self.config.poll_interval,
        };

        let handle = thread::Builder::new()
            .name(format!("state-bus-sub-{}", descriptor.name))
            .spawn(move || worker.run())
            .map_err(TransportError::from)?;

        debug!(
            channel = %descriptor.name,
            address = %descriptor.address,
            "Subscriber worker spawned"
        );
        self.workers.push(Worker {
            channel: descriptor.name,
            handle: Some(handle),
        });
        Ok(())
    }

    fn descriptor(&self, name: &str) -> Result<&ChannelDescriptor, BusError> {
        self.descriptors
            .get(name)
            .ok_or_else(|| BusError::UnknownChannel(name.to_string()))
    }

    /// Latest fresh message of `name`.
    ///
    /// Returns `None` if nothing has arrived yet, if the channel went stale,
    /// or after `close()`. A stale entry is cleared.
    ///
    /// # Errors
    ///
    /// `BusError::UnknownChannel` if `name` is not subscribed on this hub.
    pub fn read(&self, name: &str) -> Result<Option<MessageView>, BusError> {
        let descriptor = self.descriptor(name)?;
        if self.is_closed() {
            return Ok(None);
        }

        let timeout = descriptor.timeout(self.config.staleness_factor);
        let now = Instant::now();

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(name) else {
            return Ok(None);
        };
        let Some(age) = entry.age(now) else {
            return Ok(None);
        };

        if age <= timeout {
            return Ok(entry.view());
        }

        entry.clear();
        let warn_now = entry.take_warning_slot(now, self.config.stale_warning_interval);
        // Never log while holding the cache lock.
        drop(entries);

        if warn_now {
            warn!(
                channel = %name,
                age_ms = age.as_millis() as u64,
                timeout_ms = timeout.as_millis() as u64,
                "Channel stale, dropping cached message"
            );
        }
        Ok(None)
    }

    /// True iff `name` has received a message within its timeout.
    ///
    /// # Errors
    ///
    /// `BusError::UnknownChannel` if `name` is not subscribed on this hub.
    pub fn is_alive(&self, name: &str) -> Result<bool, BusError> {
        let descriptor = self.descriptor(name)?;
        if self.is_closed() {
            return Ok(false);
        }

        let timeout = descriptor.timeout(self.config.staleness_factor);
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .get(name)
            .is_some_and(|entry| entry.is_fresh(now, timeout)))
    }

    /// Liveness of every subscribed channel.
    #[must_use]
    pub fn alive(&self) -> BTreeMap<String, bool> {
        self.descriptors
            .keys()
            .map(|name| (name.clone(), self.is_alive(name).unwrap_or(false)))
            .collect()
    }

    /// Subscribed channel names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_subscribed(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Time since the last arrival on `name`, stale or not.
    pub fn last_received(&self, name: &str) -> Result<Option<Duration>, BusError> {
        self.descriptor(name)?;
        let now = Instant::now();
        Ok(self.entries.lock().get(name).and_then(|e| e.age(now)))
    }

    /// Messages installed for `name` since the hub opened.
    pub fn messages_received(&self, name: &str) -> Result<u64, BusError> {
        self.descriptor(name)?;
        Ok(self
            .entries
            .lock()
            .get(name)
            .map_or(0, CachedEntry::received_count))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.running.load(Ordering::Acquire)
    }

    /// Stop all workers and release every cached message. Idempotent.
    ///
    /// Each worker gets `join_timeout` to exit; one that does not is
    /// detached and logged, and a later `close()` waits for it again.
    pub fn close(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!(channels = self.descriptors.len(), "Closing subscriber hub");
        }

        for entry in self.entries.lock().values_mut() {
            entry.clear();
        }

        for worker in &mut self.workers {
            let Some(handle) = worker.handle.take() else {
                continue;
            };

            let deadline = Instant::now() + self.config.join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }

            if handle.is_finished() {
                if handle.join().is_err() {
                    error!(channel = %worker.channel, "Subscriber worker panicked");
                }
            } else {
                warn!(
                    channel = %worker.channel,
                    timeout_ms = self.config.join_timeout.as_millis() as u64,
                    "Subscriber worker did not stop in time, detaching"
                );
                // Kept so running_workers() still reports it.
                worker.handle = Some(handle);
            }
        }
    }

    /// Background workers that have not exited yet.
    #[must_use]
    pub fn running_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.handle.as_ref().is_some_and(|h| !h.is_finished()))
            .count()
    }
}

impl Drop for SubscriberHub {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SubscriberHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHub")
            .field("channels", &self.descriptors.keys().collect::<Vec<_>>())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Everything one background worker owns.
struct ChannelWorker {
    channel: String,
    message_type: MessageType,
    socket: Box<dyn SubSocket>,
    codec: Arc<dyn Codec>,
    entries: Entries,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ChannelWorker {
    fn run(mut self) {
        debug!(channel = %self.channel, "Subscriber worker running");

        while self.running.load(Ordering::Acquire) {
            match self.socket.recv_timeout(self.poll_interval) {
                Ok(Some(frame)) => self.on_frame(frame),
                Ok(None) => {}
                Err(TransportError::Closed) => break,
                Err(TransportError::Disconnected(address)) => {
                    debug!(channel = %self.channel, address = %address, "Publisher went away");
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "Receive failed");
                }
            }
        }

        self.socket.close();
        debug!(channel = %self.channel, "Subscriber worker stopped");
    }

    fn on_frame(&self, frame: Vec<u8>) {
        let raw: Arc<[u8]> = frame.into();
        let handle = match self.codec.decode(self.message_type, raw.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    channel = %self.channel,
                    error = %e,
                    bytes = raw.len(),
                    "Dropping undecodable message"
                );
                return;
            }
        };

        let now = Instant::now();
        let mut entries = self.entries.lock();
        // close() clears under this lock; never install behind it.
        if !self.running.load(Ordering::Acquire) {
            handle.release();
            return;
        }
        if let Some(entry) = entries.get_mut(&self.channel) {
            entry.install(raw, handle, now);
        }
    }
}
