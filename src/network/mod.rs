//! Network facade: one registry, one request queue, one tick.
//!
//! # Data Flow
//! ```text
//! host cycle
//!     → Network::update()
//!         → RequestQueue::update() (one non-blocking HTTP step)
//!         → registry.rs reconcile (drain counters, reclaim finished ids)
//!         → metrics (traffic deltas, registry gauges)
//!
//! background threads (per connection / listener)
//!     → inbound buffers, connection state, registry inserts
//! ```
//!
//! # Design Decisions
//! - `update()` is the only place results are reconciled into shared state
//! - The facade itself never blocks on I/O; its lock covers bookkeeping only
//! - Closed connections linger until drained so residual bytes stay readable

pub(crate) mod registry;

use std::sync::Arc;

use tracing::Span;

use crate::config::{NetworkConfig, TcpConfig};
use crate::error::NetworkResult;
use crate::http::{HttpRequests, Request, RequestQueue};
use crate::net::connection::{resolve_peer, Connection, ConnectionId, SocketConnection};
use crate::net::listener::{Listener, ListenerId};
use crate::observability::metrics;

use registry::Registry;

/// Entry point for HTTP requests and TCP connections.
pub struct Network {
    requests: Box<dyn HttpRequests>,
    registry: Arc<Registry>,
    tcp: TcpConfig,
    span: Span,
}

impl Network {
    /// Build a network with the default request queue.
    pub fn new(config: NetworkConfig) -> NetworkResult<Self> {
        let span = tracing::info_span!("network");
        let http_span = tracing::info_span!(parent: &span, "http");
        let requests = RequestQueue::new(&config.http, http_span)?;
        Ok(Self::with_requests(config, Box::new(requests), span))
    }

    /// Build a network around a custom HTTP submitter.
    pub fn with_requests(config: NetworkConfig, requests: Box<dyn HttpRequests>, span: Span) -> Self {
        Self {
            requests,
            registry: Arc::new(Registry::new()),
            tcp: config.tcp,
            span,
        }
    }

    /// Queue a GET. `max_size` of 0 means unbounded.
    pub fn get(
        &mut self,
        url: impl Into<String>,
        on_response: impl FnOnce(Vec<u8>) + 'static,
        on_reject: impl FnOnce(u16) + 'static,
        max_size: usize,
    ) {
        self.requests
            .enqueue(Request::get(url, on_response, on_reject, max_size));
    }

    /// Queue a POST. `max_size` of 0 means unbounded.
    pub fn post(
        &mut self,
        url: impl Into<String>,
        body: impl Into<Vec<u8>>,
        on_response: impl FnOnce(Vec<u8>) + 'static,
        on_reject: impl FnOnce(u16) + 'static,
        max_size: usize,
    ) {
        self.requests
            .enqueue(Request::post(url, body, on_response, on_reject, max_size));
    }

    /// Queue a prepared request, e.g. one that follows redirects.
    pub fn submit(&mut self, request: Request) {
        self.requests.enqueue(request);
    }

    /// Start an outbound connection and return its id immediately.
    ///
    /// The id is registered before the handshake begins. `on_connected`
    /// runs on the connection's thread, and only if the handshake succeeds.
    pub fn connect<F>(&self, address: &str, port: u16, on_connected: F) -> NetworkResult<ConnectionId>
    where
        F: FnOnce(ConnectionId) + Send + 'static,
    {
        let peer = resolve_peer(address, port)?;

        let (id, connection) = self.registry.register_with(|id| {
            let span = tracing::info_span!(parent: &self.span, "connection", id = %id, peer = %peer);
            Arc::new(SocketConnection::outbound(peer, &self.tcp, span))
        });
        connection.start_connect(id, Box::new(on_connected))?;
        Ok(id)
    }

    /// Bind `port` and start accepting; returns the listener id immediately.
    ///
    /// `on_accept` runs on the accept thread once per registered connection.
    pub fn open_server<F>(&self, port: u16, on_accept: F) -> NetworkResult<ListenerId>
    where
        F: FnMut(ConnectionId) + Send + 'static,
    {
        let id = self.registry.allocate_listener_id();
        let span = tracing::info_span!(parent: &self.span, "listener", id = %id, port);

        let listener = Arc::new(Listener::bind(port, Arc::downgrade(&self.registry), &self.tcp, span)?);
        listener.start_listen(on_accept)?;
        self.registry.insert_listener(id, listener);
        Ok(id)
    }

    /// Register an established connection under a fresh id.
    pub fn add_connection(&self, connection: Arc<dyn Connection>) -> ConnectionId {
        self.registry.add_connection(connection)
    }

    /// Look up a connection. `None` means unknown or already reclaimed.
    pub fn get_connection(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.registry.get_connection(id)
    }

    /// Look up a listener. `None` means unknown or already reclaimed.
    pub fn get_server(&self, id: ListenerId) -> Option<Arc<Listener>> {
        self.registry.get_listener(id)
    }

    /// Advance everything by one host cycle.
    pub fn update(&mut self) {
        self.requests.update();

        let reclaimed = self.registry.reconcile();
        metrics::record_traffic(reclaimed.uploaded, reclaimed.downloaded);
        metrics::record_registry(reclaimed.open_connections, reclaimed.open_listeners);

        if !reclaimed.connections.is_empty() || !reclaimed.listeners.is_empty() {
            let _enter = self.span.enter();
            tracing::debug!(
                connections = reclaimed.connections.len(),
                listeners = reclaimed.listeners.len(),
                "Reclaimed closed handles"
            );
        }
        // Dropping the last handle joins its thread; the registry lock is free here.
        drop(reclaimed);
    }

    /// Bytes sent over HTTP and TCP since creation.
    pub fn total_upload(&self) -> usize {
        self.requests.total_upload() + self.registry.totals().0
    }

    /// Bytes received over HTTP and TCP since creation.
    pub fn total_download(&self) -> usize {
        self.requests.total_download() + self.registry.totals().1
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        let (listeners, connections) = self.registry.take_all();
        for listener in &listeners {
            listener.close();
        }
        for connection in &connections {
            connection.close(false);
        }
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("tcp", &self.tcp)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionState;
    use registry::tests::FakeConnection;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::Ordering;

    /// Records submissions and completes them in order on each tick.
    #[derive(Default)]
    struct ScriptedRequests {
        queue: Vec<Request>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl HttpRequests for ScriptedRequests {
        fn enqueue(&mut self, request: Request) {
            self.queue.push(request);
        }

        fn update(&mut self) {
            if self.queue.is_empty() {
                return;
            }
            let request = self.queue.remove(0);
            self.log.borrow_mut().push(request.url().to_string());
            (request.on_response)(b"ok".to_vec());
        }

        fn total_upload(&self) -> usize {
            100
        }

        fn total_download(&self) -> usize {
            200
        }
    }

    fn scripted() -> (Network, Rc<RefCell<Vec<String>>>) {
        let requests = ScriptedRequests::default();
        let log = requests.log.clone();
        let network = Network::with_requests(NetworkConfig::default(), Box::new(requests), Span::none());
        (network, log)
    }

    #[test]
    fn update_advances_requests_in_order() {
        let (mut network, log) = scripted();
        network.get("http://a/", |_| {}, |_| {}, 0);
        network.post("http://b/", "{}", |_| {}, |_| {}, 0);

        network.update();
        assert_eq!(*log.borrow(), vec!["http://a/"]);
        network.update();
        assert_eq!(*log.borrow(), vec!["http://a/", "http://b/"]);
    }

    #[test]
    fn totals_sum_http_and_tcp() {
        let (mut network, _) = scripted();
        let fake = FakeConnection::connected();
        network.add_connection(fake.clone());

        fake.uploaded.store(5, Ordering::SeqCst);
        fake.downloaded.store(6, Ordering::SeqCst);
        network.update();
        network.update();

        assert_eq!(network.total_upload(), 105);
        assert_eq!(network.total_download(), 206);
    }

    #[test]
    fn closed_connection_reclaimed_after_drain() {
        let (mut network, _) = scripted();
        let fake = FakeConnection::connected();
        fake.buffered.store(3, Ordering::SeqCst);
        let id = network.add_connection(fake.clone());

        fake.close(false);
        network.update();
        let conn = network.get_connection(id).expect("still readable");
        assert_eq!(conn.state(), ConnectionState::Closed);

        let mut buf = [0u8; 3];
        assert_eq!(conn.recv(&mut buf), Some(3));
        assert_eq!(conn.recv(&mut buf), None);

        network.update();
        assert!(network.get_connection(id).is_none());
    }

    #[test]
    fn connect_to_unresolvable_host_fails_at_call_site() {
        let (network, _) = scripted();
        assert!(network.connect("host.invalid", 80, |_| {}).is_err());
    }
}
