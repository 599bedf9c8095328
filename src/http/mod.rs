//! HTTP request pipeline.
//!
//! # Data Flow
//! ```text
//! Network::get / Network::post
//!     → request.rs (Request + callbacks)
//!     → queue.rs (FIFO, one active transfer)
//!     → transfer.rs (async exchange on the queue's runtime)
//!     → on update(): on_response(body) | on_reject(status)
//! ```
//!
//! # Design Decisions
//! - Strict FIFO, at most one request in flight
//! - Bodies are buffered in memory, bounded by the request's max size
//! - Transport failures surface as a 502 rejection

pub mod queue;
pub mod request;
pub(crate) mod transfer;

pub use queue::{HttpRequests, RequestQueue};
pub use request::{Method, OnReject, OnResponse, Request, HTTP_BAD_GATEWAY, HTTP_OK};
