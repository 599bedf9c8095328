//! Id-keyed registries shared between the facade and its listeners.
//!
//! # Responsibilities
//! - Hand out connection and listener ids from two independent counters
//! - Map ids to shared connection and listener handles
//! - Accumulate drained TCP traffic totals
//! - Reclaim closed, fully drained connections and closed listeners
//!
//! # Design Decisions
//! - One lock guards everything; it is held only for bookkeeping
//! - Reclaimed handles are returned to the caller and dropped after the
//!   lock is released, since dropping them may join a thread

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::net::connection::{Connection, ConnectionId, ConnectionState};
use crate::net::listener::{Listener, ListenerId};

#[derive(Default)]
struct State {
    connections: HashMap<ConnectionId, Arc<dyn Connection>>,
    listeners: HashMap<ListenerId, Arc<Listener>>,
    next_connection: u64,
    next_listener: u64,
    total_upload: usize,
    total_download: usize,
}

impl State {
    fn allocate_connection_id(&mut self) -> ConnectionId {
        self.next_connection += 1;
        ConnectionId::new(self.next_connection)
    }
}

/// Outcome of one reconciliation pass.
#[derive(Default)]
pub(crate) struct Reclaimed {
    pub connections: Vec<Arc<dyn Connection>>,
    pub listeners: Vec<Arc<Listener>>,
    pub uploaded: usize,
    pub downloaded: usize,
    pub open_connections: usize,
    pub open_listeners: usize,
}

/// Shared registry of connections and listeners.
#[derive(Default)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register an already established connection under a fresh id.
    pub(crate) fn add_connection(&self, connection: Arc<dyn Connection>) -> ConnectionId {
        let mut state = self.state.lock();
        let id = state.allocate_connection_id();
        state.connections.insert(id, connection);
        id
    }

    /// Allocate an id, build the connection for it and register it in one step.
    pub(crate) fn register_with<C, F>(&self, make: F) -> (ConnectionId, Arc<C>)
    where
        C: Connection + 'static,
        F: FnOnce(ConnectionId) -> Arc<C>,
    {
        let mut state = self.state.lock();
        let id = state.allocate_connection_id();
        let connection = make(id);
        state.connections.insert(id, connection.clone());
        (id, connection)
    }

    pub(crate) fn get_connection(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.state.lock().connections.get(&id).cloned()
    }

    pub(crate) fn allocate_listener_id(&self) -> ListenerId {
        let mut state = self.state.lock();
        state.next_listener += 1;
        ListenerId::new(state.next_listener)
    }

    pub(crate) fn insert_listener(&self, id: ListenerId, listener: Arc<Listener>) {
        self.state.lock().listeners.insert(id, listener);
    }

    pub(crate) fn get_listener(&self, id: ListenerId) -> Option<Arc<Listener>> {
        self.state.lock().listeners.get(&id).cloned()
    }

    /// Drain every connection's counters into the totals and unregister
    /// whatever is finished.
    ///
    /// A closed connection stays registered while it still has buffered
    /// inbound bytes, so callers can read what arrived before the peer left.
    pub(crate) fn reconcile(&self) -> Reclaimed {
        let mut reclaimed = Reclaimed::default();
        let mut state = self.state.lock();

        state.connections.retain(|_, connection| {
            reclaimed.uploaded += connection.pull_upload();
            reclaimed.downloaded += connection.pull_download();

            let finished = connection.state() == ConnectionState::Closed && connection.available() == 0;
            if finished {
                reclaimed.connections.push(Arc::clone(connection));
            }
            !finished
        });

        state.listeners.retain(|_, listener| {
            let open = listener.is_open();
            if !open {
                reclaimed.listeners.push(Arc::clone(listener));
            }
            open
        });

        state.total_upload += reclaimed.uploaded;
        state.total_download += reclaimed.downloaded;
        reclaimed.open_connections = state.connections.len();
        reclaimed.open_listeners = state.listeners.len();
        reclaimed
    }

    /// Accumulated (upload, download) TCP totals.
    pub(crate) fn totals(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.total_upload, state.total_download)
    }

    /// Unregister everything, for teardown.
    pub(crate) fn take_all(&self) -> (Vec<Arc<Listener>>, Vec<Arc<dyn Connection>>) {
        let mut state = self.state.lock();
        let listeners = state.listeners.drain().map(|(_, l)| l).collect();
        let connections = state.connections.drain().map(|(_, c)| c).collect();
        (listeners, connections)
    }
}
