use super::{PubSocket, SubSocket, Transport, MAX_FRAME_LEN};
use crate::errors::TransportError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Default)]
struct Endpoint {
    bound: bool,
    subscribers: Vec<SyncSender<Vec<u8>>>,
}

type Switchboard = Arc<Mutex<HashMap<String, Endpoint>>>;

/// In-memory transport.
///
/// Clones share one switchboard, so a publisher and a hub opened with
/// clones of the same `InProcTransport` see each other. Each subscriber gets
/// a bounded queue; frames arriving at a full queue are dropped.
#[derive(Clone)]
pub struct InProcTransport {
    switchboard: Switchboard,
    queue_depth: usize,
}

impl InProcTransport {
    pub const DEFAULT_QUEUE_DEPTH: usize = 64;

    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_depth(Self::DEFAULT_QUEUE_DEPTH)
    }

    #[must_use]
    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            switchboard: Arc::new(Mutex::new(HashMap::new())),
            queue_depth: queue_depth.max(1),
        }
    }
}

impl Default for InProcTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InProcTransport {
    fn name(&self) -> &'static str {
        "inproc"
    }

    fn bind(&self, address: &str) -> Result<Box<dyn PubSocket>, TransportError> {
        let mut board = self.switchboard.lock();
        let endpoint = board.entry(address.to_string()).or_default();
        if endpoint.bound {
            return Err(TransportError::AddressInUse(address.to_string()));
        }
        endpoint.bound = true;

        Ok(Box::new(InProcPubSocket {
            address: address.to_string(),
            switchboard: Some(self.switchboard.clone()),
        }))
    }

    fn connect(&self, address: &str) -> Result<Box<dyn SubSocket>, TransportError> {
        let (tx, rx) = mpsc::sync_channel(self.queue_depth);
        self.switchboard
            .lock()
            .entry(address.to_string())
            .or_default()
            .subscribers
            .push(tx);

        Ok(Box::new(InProcSubSocket { receiver: Some(rx) }))
    }
}

struct InProcPubSocket {
    address: String,
    switchboard: Option<Switchboard>,
}

impl PubSocket for InProcPubSocket {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let switchboard = self.switchboard.as_ref().ok_or(TransportError::Closed)?;
        if frame.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let mut board = switchboard.lock();
        let Some(endpoint) = board.get_mut(&self.address) else {
            return Ok(());
        };

        let address = &self.address;
        endpoint
            .subscribers
            .retain(|tx| match tx.try_send(frame.to_vec()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!(address = %address, "Subscriber queue full, frame dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        self.switchboard
            .as_ref()
            .and_then(|board| board.lock().get(&self.address).map(|e| e.subscribers.len()))
            .unwrap_or(0)
    }

    fn close(&mut self) {
        if let Some(switchboard) = self.switchboard.take() {
            if let Some(endpoint) = switchboard.lock().get_mut(&self.address) {
                endpoint.bound = false;
            }
        }
    }
}

impl Drop for InProcPubSocket {
    fn drop(&mut self) {
        self.close();
    }
}

struct InProcSubSocket {
    receiver: Option<Receiver<Vec<u8>>>,
}

impl SubSocket for InProcSubSocket {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let receiver = self.receiver.as_ref().ok_or(TransportError::Closed)?;
        match receiver.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) {
        // Dropping the receiver lets the publisher prune our sender.
        self.receiver = None;
    }
}
