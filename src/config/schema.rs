//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the network core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request pipeline settings.
    pub http: HttpConfig,

    /// TCP connection and listener settings.
    pub tcp: TcpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP request pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User agent sent with every request.
    pub user_agent: String,

    /// Content type announced for POST bodies.
    pub post_content_type: String,

    /// Maximum redirect hops for requests that follow redirects.
    pub max_redirects: usize,

    /// Connection establishment timeout in seconds (0 = none).
    pub connect_timeout_secs: u64,

    /// Total request timeout in seconds (0 = none).
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "curl/7.81.0".to_string(),
            post_content_type: "application/json".to_string(),
            max_redirects: 10,
            connect_timeout_secs: 0,
            request_timeout_secs: 0,
        }
    }
}

/// TCP connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Maximum buffered inbound bytes per connection before it is dropped.
    pub inbound_capacity: usize,

    /// Size of a single read issued by the receive loop.
    pub read_chunk_size: usize,

    /// Outbound connect timeout in seconds (0 = OS default).
    ///
    /// `close()` on a connection still in its handshake waits up to this long.
    pub connect_timeout_secs: u64,

    /// Disable Nagle's algorithm on every connection.
    pub nodelay: bool,

    /// How often an idle accept loop re-checks its open flag, in milliseconds.
    pub accept_poll_interval_ms: u64,
}

/// Default inbound buffer bound: 1 MiB.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1 << 20;

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            read_chunk_size: 16_384,
            connect_timeout_secs: 10,
            nodelay: false,
            accept_poll_interval_ms: 20,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
