//! Error definitions for the network core.

use thiserror::Error;

/// Errors surfaced by setup calls and by connection writes.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Address resolution failed or yielded no usable address.
    #[error("could not resolve {address}: {reason}")]
    Resolve { address: String, reason: String },

    /// The listening port could not be bound.
    #[error("could not bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Generic socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection is not in the CONNECTED state.
    #[error("connection is not connected")]
    NotConnected,

    /// The peer went away during a write; the connection has been closed.
    #[error("peer closed the connection during send")]
    PeerClosed,

    /// The HTTP multiplexer runtime could not be created.
    #[error("could not initialize HTTP runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The HTTP transfer context could not be built.
    #[error("could not initialize HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Result type for network core operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Transport-level failures of a single HTTP exchange.
///
/// These never carry an HTTP status; the queue reports them to the caller
/// as a bad gateway rejection.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("response exceeds maximum size of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("more than {0} redirects")]
    TooManyRedirects(usize),

    #[error("redirect response without a usable Location header")]
    MissingLocation,

    #[error("transfer aborted: {0}")]
    Aborted(String),
}
