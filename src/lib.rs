//! Network I/O core: a polled HTTP request queue and threaded TCP
//! connections and listeners behind one id-keyed facade.

pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod network;
pub mod observability;

pub use config::schema::NetworkConfig;
pub use error::{NetworkError, NetworkResult};
pub use http::{HttpRequests, Request, RequestQueue};
pub use net::{Connection, ConnectionId, ConnectionState, Listener, ListenerId};
pub use network::Network;
