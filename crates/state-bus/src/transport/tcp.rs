use super::{PubSocket, SubSocket, Transport, MAX_FRAME_LEN};
use crate::errors::TransportError;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Length prefix size: `u32` little-endian.
const HEADER_LEN: usize = 4;

/// Read chunk size for subscriber sockets.
const READ_CHUNK: usize = 64 * 1024;

// ============================================================================
// TcpTransport
// ============================================================================

/// Loopback TCP transport.
///
/// # Wire Format
///
/// Each message is one frame:
/// - Bytes 0-3: payload length (`u32`, little-endian)
/// - Bytes 4..: payload
///
/// # Delivery
///
/// The publisher never blocks. Each subscriber has a bounded outbound
/// backlog (the high-water mark); frames that do not fit are dropped whole
/// for that subscriber so framing stays intact. A subscriber with an empty
/// backlog accepts any frame up to [`MAX_FRAME_LEN`].
#[derive(Debug, Clone)]
pub struct TcpTransport {
    high_water_mark: usize,
}

impl TcpTransport {
    /// Default per-subscriber backlog: 1 MiB.
    pub const DEFAULT_HIGH_WATER_MARK: usize = 1024 * 1024;

    #[must_use]
    pub fn new() -> Self {
        Self {
            high_water_mark: Self::DEFAULT_HIGH_WATER_MARK,
        }
    }

    #[must_use]
    pub fn with_high_water_mark(mut self, bytes: usize) -> Self {
        self.high_water_mark = bytes;
        self
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn bind(&self, address: &str) -> Result<Box<dyn PubSocket>, TransportError> {
        Ok(Box::new(TcpPubSocket::bind(address, self.high_water_mark)?))
    }

    fn connect(&self, address: &str) -> Result<Box<dyn SubSocket>, TransportError> {
        Ok(Box::new(TcpSubSocket::new(address)?))
    }
}

// ============================================================================
// TcpPubSocket
// ============================================================================

struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
    backlog: Vec<u8>,
}

impl Peer {
    /// Write as much backlog as the socket accepts. Returns false if the
    /// peer is gone.
    fn flush(&mut self) -> bool {
        while !self.backlog.is_empty() {
            match self.stream.write(&self.backlog) {
                Ok(0) => return false,
                Ok(n) => {
                    self.backlog.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %self.addr, error = %e, "Subscriber write failed");
                    return false;
                }
            }
        }
        true
    }
}

/// Publishing end: a non-blocking listener plus the accepted subscribers.
pub struct TcpPubSocket {
    address: String,
    listener: Option<TcpListener>,
    peers: Vec<Peer>,
    high_water_mark: usize,
}

impl TcpPubSocket {
    /// Bind a listener at `address`.
    ///
    /// # Errors
    ///
    /// `TransportError::Bind` if the address is malformed or taken.
    pub fn bind(address: &str, high_water_mark: usize) -> Result<Self, TransportError> {
        let bind_err = |e: io::Error| TransportError::Bind {
            address: address.to_string(),
            error: e.to_string(),
        };

        let listener = TcpListener::bind(address).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;

        Ok(Self {
            address: address.to_string(),
            listener: Some(listener),
            peers: Vec::new(),
            high_water_mark,
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .as_ref()
            .ok_or(TransportError::Closed)?
            .local_addr()
            .map_err(TransportError::from)
    }

    fn accept_pending(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream
                        .set_nonblocking(true)
                        .and_then(|()| stream.set_nodelay(true))
                    {
                        warn!(peer = %addr, error = %e, "Failed to configure subscriber socket");
                        continue;
                    }
                    debug!(address = %self.address, peer = %addr, "Subscriber attached");
                    self.peers.push(Peer {
                        stream,
                        addr,
                        backlog: Vec::new(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(address = %self.address, error = %e, "Accept failed");
                    break;
                }
            }
        }
    }
}

impl PubSocket for TcpPubSocket {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.listener.is_none() {
            return Err(TransportError::Closed);
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }

        self.accept_pending();

        let header = (frame.len() as u32).to_le_bytes();
        let framed_len = HEADER_LEN + frame.len();
        let high_water_mark = self.high_water_mark;
        let address = &self.address;

        self.peers.retain_mut(|peer| {
            // An idle peer always takes the frame, even one above the mark.
            if !peer.backlog.is_empty() && peer.backlog.len() + framed_len > high_water_mark {
                debug!(address = %address, peer = %peer.addr, "Subscriber backlog full, frame dropped");
            } else {
                peer.backlog.extend_from_slice(&header);
                peer.backlog.extend_from_slice(frame);
            }

            let alive = peer.flush();
            if !alive {
                debug!(address = %address, peer = %peer.addr, "Subscriber detached");
            }
            alive
        });

        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        self.peers.len()
    }

    fn close(&mut self) {
        for peer in self.peers.drain(..) {
            let _ = peer.stream.shutdown(Shutdown::Both);
        }
        if self.listener.take().is_some() {
            debug!(address = %self.address, "Publisher socket closed");
        }
    }
}

impl Drop for TcpPubSocket {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// TcpSubSocket
// ============================================================================

/// Subscribing end: connects lazily and reconnects after the publisher goes
/// away.
pub struct TcpSubSocket {
    address: String,
    target: SocketAddr,
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
    closed: bool,
}

impl TcpSubSocket {
    /// Create an unconnected socket for `address`.
    ///
    /// # Errors
    ///
    /// `TransportError::Connect` if the address is not a socket address.
    pub fn new(address: &str) -> Result<Self, TransportError> {
        let target = address
            .parse::<SocketAddr>()
            .map_err(|e| TransportError::Connect {
                address: address.to_string(),
                error: e.to_string(),
            })?;

        Ok(Self {
            address: address.to_string(),
            target,
            stream: None,
            buffer: Vec::new(),
            closed: false,
        })
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&mut self, timeout: Duration) -> Option<&mut TcpStream> {
        match TcpStream::connect_timeout(&self.target, timeout) {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(address = %self.address, error = %e, "Failed to set TCP_NODELAY");
                }
                debug!(address = %self.address, "Connected to publisher");
                self.buffer.clear();
                self.stream = Some(stream);
                self.stream.as_mut()
            }
            Err(e) => {
                // Nobody bound yet; wait out the poll interval instead of spinning.
                debug!(address = %self.address, error = %e, "Publisher not reachable");
                thread::sleep(timeout);
                None
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.buffer.clear();
    }

    /// Pop one complete frame off the read buffer.
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.buffer[..HEADER_LEN]);
        let len = u32::from_le_bytes(header) as usize;

        if len > MAX_FRAME_LEN {
            self.disconnect();
            return Err(TransportError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let frame = self.buffer[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buffer.drain(..HEADER_LEN + len);
        Ok(Some(frame))
    }
}

impl SubSocket for TcpSubSocket {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        if let Some(frame) = self.take_frame()? {
            return Ok(Some(frame));
        }

        let timeout = timeout.max(Duration::from_millis(1));
        if self.stream.is_none() && self.connect(timeout).is_none() {
            return Ok(None);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        stream.set_read_timeout(Some(timeout))?;

        let mut chunk = [0u8; READ_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => {
                self.disconnect();
                Err(TransportError::Disconnected(self.address.clone()))
            }
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                self.take_frame()
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => {
                self.disconnect();
                Err(TransportError::Io(e.to_string()))
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.disconnect();
            debug!(address = %self.address, "Subscriber socket closed");
        }
    }
}

impl Drop for TcpSubSocket {
    fn drop(&mut self) {
        self.close();
    }
}
