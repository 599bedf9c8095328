//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Network, RequestQueue, Listener, Connection produce:
//!     → tracing events inside their component span
//!     → metrics.rs (traffic counters, HTTP outcomes, registry gauges)
//!
//! Consumers:
//!     → logging.rs subscriber installed by the host (stdout)
//!     → Metrics endpoint (Prometheus scrape), optional
//! ```

pub mod logging;
pub mod metrics;
