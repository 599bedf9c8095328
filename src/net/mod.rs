//! TCP transport subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound:  Network::connect
//!     → connection.rs (handshake thread → receive loop)
//! Inbound:   Network::open_server
//!     → listener.rs (accept thread)
//!     → connection.rs (receive loop per accepted stream)
//!     → registered with the Network under a fresh id
//!
//! Receive loop → inbound.rs (bounded FIFO) → Connection::recv
//!
//! Connection States:
//!     Initial → Connecting → Connected → Closed
//! ```
//!
//! # Design Decisions
//! - One blocking thread per connection and per listener
//! - The inbound buffer is bounded; overflow drops the connection
//! - close() is synchronous: it returns after the thread has joined

pub mod connection;
pub mod inbound;
pub mod listener;

pub use connection::{Connection, ConnectionId, ConnectionState, SocketConnection};
pub use listener::{Listener, ListenerId};
