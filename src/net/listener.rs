//! TCP listener with a dedicated accept thread.
//!
//! # Responsibilities
//! - Bind to a port on all interfaces
//! - Accept incoming TCP connections on a background thread
//! - Wrap each accepted stream in a `SocketConnection` and register it
//! - Close the connections it accepted when it is closed itself

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::Span;

use crate::config::TcpConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::net::connection::{ConnectionId, SocketConnection};
use crate::network::registry::Registry;

/// Identifier of a registered listener. Never reused within a `Network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Callback fired on the accept thread for every registered connection.
pub type AcceptCallback = Box<dyn FnMut(ConnectionId) + Send + 'static>;

/// State shared with the accept thread.
struct Shared {
    port: u16,
    open: AtomicBool,
    clients: Mutex<Vec<ConnectionId>>,
    registry: Weak<Registry>,
    tcp: TcpConfig,
    span: Span,
}

impl Shared {
    fn accept_loop(&self, listener: TcpListener, mut on_accept: AcceptCallback) {
        tracing::info!(port = self.port, "Listening for connections");
        let idle = Duration::from_millis(self.tcp.accept_poll_interval_ms);

        while self.open.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if !self.admit(stream, peer, &mut on_accept) {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(idle),
                Err(e) if is_transient(&e) => {
                    tracing::debug!(error = %e, "Accept interrupted, retrying");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed, closing server");
                    if self.open.swap(false, Ordering::SeqCst) {
                        self.close_clients();
                    }
                    break;
                }
            }
        }
        tracing::debug!(port = self.port, "Accept loop finished");
    }

    /// Register one accepted stream. Returns false once the owning network is gone.
    fn admit(&self, stream: TcpStream, peer: SocketAddr, on_accept: &mut AcceptCallback) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            tracing::debug!(peer = %peer, "Network dropped, refusing client");
            self.open.store(false, Ordering::SeqCst);
            return false;
        };

        let span = tracing::info_span!(parent: &self.span, "connection", peer = %peer);
        let connection = match SocketConnection::accepted(stream, peer, &self.tcp, span) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Could not set up accepted socket");
                return true;
            }
        };

        let id = registry.add_connection(Arc::new(connection));
        self.clients.lock().push(id);
        tracing::info!(connection_id = %id, peer = %peer, "Client connected");
        on_accept(id);
        true
    }

    /// Close every connection this listener accepted.
    fn close_clients(&self) {
        let clients = std::mem::take(&mut *self.clients.lock());
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        for id in clients {
            if let Some(client) = registry.get_connection(id) {
                client.close(false);
            }
        }
    }
}

/// Peer vanished between SYN and accept, or a signal interrupted the call.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

/// A bound TCP server socket plus its accept thread.
pub struct Listener {
    shared: Arc<Shared>,
    socket: Mutex<Option<TcpListener>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Bind `port` on all IPv4 interfaces. Port 0 picks a free port.
    pub(crate) fn bind(
        port: u16,
        registry: Weak<Registry>,
        tcp: &TcpConfig,
        span: Span,
    ) -> NetworkResult<Self> {
        let bind_error = |source: io::Error| NetworkError::Bind { port, source };

        let socket = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(bind_error)?;
        socket.set_nonblocking(true).map_err(bind_error)?;
        let bound = socket.local_addr().map_err(bind_error)?.port();

        {
            let _enter = span.enter();
            tracing::info!(port = bound, "Opened server");
        }

        Ok(Self {
            shared: Arc::new(Shared {
                port: bound,
                open: AtomicBool::new(true),
                clients: Mutex::new(Vec::new()),
                registry,
                tcp: tcp.clone(),
                span,
            }),
            socket: Mutex::new(Some(socket)),
            thread: Mutex::new(None),
        })
    }

    /// Spawn the accept thread. `on_accept` runs on that thread.
    pub fn start_listen<F>(&self, on_accept: F) -> NetworkResult<()>
    where
        F: FnMut(ConnectionId) + Send + 'static,
    {
        let Some(socket) = self.socket.lock().take() else {
            let _enter = self.shared.span.enter();
            tracing::warn!("Listener already started");
            return Ok(());
        };

        let shared = Arc::clone(&self.shared);
        let on_accept: AcceptCallback = Box::new(on_accept);
        let handle = thread::Builder::new()
            .name(format!("netcore-listen-{}", self.shared.port))
            .spawn(move || {
                let span = shared.span.clone();
                span.in_scope(|| shared.accept_loop(socket, on_accept));
            });

        match handle {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.open.store(false, Ordering::SeqCst);
                Err(NetworkError::Io(e))
            }
        }
    }

    /// Stop accepting, close accepted connections and wait for the accept thread.
    ///
    /// Calling this again is a no-op.
    pub fn close(&self) {
        let was_open = self.shared.open.swap(false, Ordering::SeqCst);
        if was_open {
            let _enter = self.shared.span.enter();
            tracing::info!(port = self.shared.port, "Closing server");
        }

        // Joined first so no client can be admitted after the sweep below.
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                let _enter = self.shared.span.enter();
                tracing::error!("Accept thread panicked");
            }
        }
        self.socket.lock().take();

        if was_open {
            self.shared.close_clients();
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// The bound port (the actual one when 0 was requested).
    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Ids of the connections accepted and not yet swept by `close`.
    pub fn clients(&self) -> Vec<ConnectionId> {
        self.shared.clients.lock().clone()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("port", &self.shared.port)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
