//! Connection state machine and byte-stream transport.
//!
//! # Responsibilities
//! - Own one TCP stream (outbound or accepted) and its receive thread
//! - Buffer inbound bytes in a bounded FIFO until the caller drains them
//! - Write outbound bytes all-or-nothing
//! - Count traffic for drain-and-reset accounting
//!
//! # State Transitions
//! ```text
//! Initial → Connecting: handshake thread starts
//! Connecting → Connected: handshake succeeded
//! any → Closed: read error, peer shutdown, overflow, fatal send, close()
//! ```

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::Span;

use crate::config::TcpConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::net::inbound::InboundBuffer;

/// Identifier of a registered connection. Never reused within a `Network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, handshake not started.
    Initial = 0,
    /// Handshake in progress on the background thread.
    Connecting = 1,
    /// Stream established; the receive loop is running.
    Connected = 2,
    /// Terminal.
    Closed = 3,
}

impl From<u8> for ConnectionState {
    fn from(val: u8) -> Self {
        match val {
            0 => ConnectionState::Initial,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Closed,
        }
    }
}

/// Callback fired on the connection thread once an outbound handshake succeeds.
pub type ConnectedCallback = Box<dyn FnOnce(ConnectionId) + Send + 'static>;

/// A byte-stream connection addressed by id through the `Network`.
///
/// Implementations are shared between the registry, the listener that
/// accepted them and any caller holding a handle, so every method takes
/// `&self`.
pub trait Connection: Send + Sync {
    /// Copy up to `buf.len()` buffered bytes into `buf`.
    ///
    /// Returns `None` once the connection is not connected and nothing is
    /// left to read. `Some(0)` means connected but nothing buffered yet.
    fn recv(&self, buf: &mut [u8]) -> Option<usize>;

    /// Write all of `data`, or fail and close the connection.
    fn send(&self, data: &[u8]) -> NetworkResult<usize>;

    /// Number of buffered inbound bytes.
    fn available(&self) -> usize;

    /// Close the connection and wait for its background thread.
    ///
    /// With `discard_all` the buffered inbound bytes are dropped as well.
    /// Calling this again is a no-op.
    fn close(&self, discard_all: bool);

    /// Bytes sent since the previous call.
    fn pull_upload(&self) -> usize;

    /// Bytes received since the previous call.
    fn pull_download(&self) -> usize;

    fn state(&self) -> ConnectionState;

    /// Peer port.
    fn port(&self) -> u16;

    /// Peer IP address as text.
    fn address(&self) -> String;
}

/// Resolve a host name to the peer address used for an outbound connection.
///
/// IPv4 results are preferred; an IPv6 address is used only when no IPv4
/// address exists.
pub(crate) fn resolve_peer(address: &str, port: u16) -> NetworkResult<SocketAddr> {
    let resolved: Vec<SocketAddr> = (address, port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::Resolve {
            address: address.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    resolved
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| resolved.first())
        .copied()
        .ok_or_else(|| NetworkError::Resolve {
            address: address.to_string(),
            reason: "no addresses found".to_string(),
        })
}

/// State shared between a connection handle and its background thread.
struct Shared {
    peer: SocketAddr,
    state: AtomicU8,
    inbound: Mutex<InboundBuffer>,
    stream: OnceLock<TcpStream>,
    uploaded: AtomicUsize,
    downloaded: AtomicUsize,
    read_chunk_size: usize,
    nodelay: bool,
    span: Span,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Move `from` → `to`; fails if another thread changed the state first.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Mark closed; returns the state seen before.
    fn mark_closed(&self) -> ConnectionState {
        ConnectionState::from(
            self.state
                .swap(ConnectionState::Closed as u8, Ordering::SeqCst),
        )
    }

    /// Shut the stream down in both directions, unblocking a pending read.
    fn release_transport(&self) {
        if let Some(stream) = self.stream.get() {
            // NotConnected here only means the peer already tore it down.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn connect(&self, timeout: Option<Duration>) -> io::Result<TcpStream> {
        match timeout {
            Some(timeout) => TcpStream::connect_timeout(&self.peer, timeout),
            None => TcpStream::connect(self.peer),
        }
    }

    /// Outbound handshake followed by the receive loop.
    fn run_client(
        &self,
        id: ConnectionId,
        timeout: Option<Duration>,
        on_connected: ConnectedCallback,
    ) {
        if !self.transition(ConnectionState::Initial, ConnectionState::Connecting) {
            return;
        }
        tracing::info!(peer = %self.peer, "Connecting");

        let stream = match self.connect(timeout) {
            Ok(stream) => stream,
            Err(e) => {
                self.mark_closed();
                tracing::error!(peer = %self.peer, error = %e, "Connect failed");
                return;
            }
        };

        let reader = match self.prepare(&stream) {
            Ok(reader) => reader,
            Err(e) => {
                self.mark_closed();
                tracing::error!(peer = %self.peer, error = %e, "Could not set up connected socket");
                return;
            }
        };

        // A concurrent close() during the handshake wins; it could not reach
        // the stream, so shut it down here.
        let _ = self.stream.set(stream);
        if !self.transition(ConnectionState::Connecting, ConnectionState::Connected) {
            self.release_transport();
            return;
        }

        tracing::info!(peer = %self.peer, "Connected");
        on_connected(id);
        self.receive_loop(reader);
    }

    /// Apply socket options and clone a read half for the receive loop.
    fn prepare(&self, stream: &TcpStream) -> io::Result<TcpStream> {
        stream.set_nonblocking(false)?;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        stream.try_clone()
    }

    /// Sole writer of the inbound buffer. Runs until the connection closes.
    fn receive_loop(&self, mut reader: TcpStream) {
        let mut chunk = vec![0u8; self.read_chunk_size];

        while self.state() == ConnectionState::Connected {
            match reader.read(&mut chunk) {
                Ok(0) => {
                    tracing::info!(peer = %self.peer, "Closed connection");
                    break;
                }
                Ok(n) => {
                    {
                        let mut inbound = self.inbound.lock();
                        if let Err(overflow) = inbound.append(&chunk[..n]) {
                            tracing::warn!(
                                peer = %self.peer,
                                buffered = overflow.buffered,
                                incoming = overflow.incoming,
                                capacity = overflow.capacity,
                                "Client exceeded input buffer limit, dropping"
                            );
                            break;
                        }
                        self.downloaded.fetch_add(n, Ordering::Relaxed);
                    }
                    tracing::debug!(peer = %self.peer, bytes = n, "Read from peer");
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    if self.state() == ConnectionState::Closed {
                        tracing::debug!(peer = %self.peer, "Receive interrupted by close");
                    } else {
                        tracing::warn!(peer = %self.peer, error = %e, "Receive failed");
                    }
                    break;
                }
            }
        }

        self.mark_closed();
        self.release_transport();
    }
}

/// A `Connection` backed by a blocking `std::net::TcpStream` and one thread.
pub struct SocketConnection {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    connect_timeout: Option<Duration>,
}

impl SocketConnection {
    fn with_state(peer: SocketAddr, config: &TcpConfig, span: Span, state: ConnectionState) -> Self {
        let connect_timeout = (config.connect_timeout_secs > 0)
            .then(|| Duration::from_secs(config.connect_timeout_secs));

        Self {
            shared: Arc::new(Shared {
                peer,
                state: AtomicU8::new(state as u8),
                inbound: Mutex::new(InboundBuffer::new(config.inbound_capacity)),
                stream: OnceLock::new(),
                uploaded: AtomicUsize::new(0),
                downloaded: AtomicUsize::new(0),
                read_chunk_size: config.read_chunk_size,
                nodelay: config.nodelay,
                span,
            }),
            thread: Mutex::new(None),
            connect_timeout,
        }
    }

    /// Create an outbound connection in the `Initial` state.
    ///
    /// Nothing touches the network until [`SocketConnection::start_connect`].
    pub fn outbound(peer: SocketAddr, config: &TcpConfig, span: Span) -> Self {
        Self::with_state(peer, config, span, ConnectionState::Initial)
    }

    /// Wrap an accepted stream and start its receive loop.
    pub fn accepted(
        stream: TcpStream,
        peer: SocketAddr,
        config: &TcpConfig,
        span: Span,
    ) -> NetworkResult<Self> {
        let connection = Self::with_state(peer, config, span, ConnectionState::Connected);
        let reader = connection.shared.prepare(&stream)?;
        let _ = connection.shared.stream.set(stream);

        let shared = Arc::clone(&connection.shared);
        connection.spawn(move || shared.receive_loop(reader))?;
        Ok(connection)
    }

    /// Start the handshake on the background thread.
    ///
    /// `on_connected` runs on that thread after the handshake succeeds and
    /// before the first read. It never runs if the handshake fails.
    pub fn start_connect(&self, id: ConnectionId, on_connected: ConnectedCallback) -> NetworkResult<()> {
        let shared = Arc::clone(&self.shared);
        let timeout = self.connect_timeout;
        self.spawn(move || shared.run_client(id, timeout, on_connected))
            .inspect_err(|_| {
                self.shared.mark_closed();
            })
    }

    fn spawn<F>(&self, body: F) -> NetworkResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let span = self.shared.span.clone();
        let handle = thread::Builder::new()
            .name(format!("netcore-conn-{}", self.shared.peer))
            .spawn(move || span.in_scope(body))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Wait for the background thread, unless we are running on it.
    fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                let _enter = self.shared.span.enter();
                tracing::error!("Connection thread panicked");
            }
        }
    }
}

impl Connection for SocketConnection {
    fn recv(&self, buf: &mut [u8]) -> Option<usize> {
        let mut inbound = self.shared.inbound.lock();
        if self.shared.state() != ConnectionState::Connected && inbound.is_empty() {
            return None;
        }
        Some(inbound.drain_into(buf))
    }

    fn send(&self, data: &[u8]) -> NetworkResult<usize> {
        if self.shared.state() != ConnectionState::Connected {
            return Err(NetworkError::NotConnected);
        }
        let mut stream = self.shared.stream.get().ok_or(NetworkError::NotConnected)?;

        let mut total = 0;
        while total < data.len() {
            match stream.write(&data[total..]) {
                Ok(0) => {
                    let _enter = self.shared.span.enter();
                    tracing::debug!("Peer closed connection during send");
                    self.close(false);
                    return Err(NetworkError::PeerClosed);
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::yield_now();
                    continue;
                }
                Err(e) => {
                    let peer_gone = matches!(
                        e.kind(),
                        io::ErrorKind::BrokenPipe
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionAborted
                    );
                    {
                        let _enter = self.shared.span.enter();
                        if peer_gone {
                            tracing::debug!("Peer closed while sending");
                        }
                        tracing::warn!(error = %e, "Send failed, closing socket");
                    }
                    self.close(false);
                    return Err(if peer_gone {
                        NetworkError::PeerClosed
                    } else {
                        NetworkError::Io(e)
                    });
                }
            }
        }

        self.shared.uploaded.fetch_add(total, Ordering::Relaxed);
        Ok(total)
    }

    fn available(&self) -> usize {
        self.shared.inbound.lock().len()
    }

    fn close(&self, discard_all: bool) {
        let previous = {
            let mut inbound = self.shared.inbound.lock();
            if discard_all {
                inbound.clear();
            }
            self.shared.mark_closed()
        };

        if previous != ConnectionState::Closed {
            let _enter = self.shared.span.enter();
            tracing::info!(peer = %self.shared.peer, "Closing connection");
            self.shared.release_transport();
        }
        self.join();
    }

    fn pull_upload(&self) -> usize {
        self.shared.uploaded.swap(0, Ordering::Relaxed)
    }

    fn pull_download(&self) -> usize {
        self.shared.downloaded.swap(0, Ordering::Relaxed)
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn port(&self) -> u16 {
        self.shared.peer.port()
    }

    fn address(&self) -> String {
        self.shared.peer.ip().to_string()
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        self.close(false);
    }
}

impl std::fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConnection")
            .field("peer", &self.shared.peer)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}
