//! Serialized HTTP request pipeline.
//!
//! # Responsibilities
//! - Accept GET/POST submissions in FIFO order
//! - Keep at most one transfer in flight
//! - Advance the active transfer by one non-blocking step per `update()`
//! - Deliver results through the request callbacks and count traffic
//!
//! # Design Decisions
//! - The transfer context is a single reusable `reqwest::Client`
//! - The multiplexer context is a current-thread Tokio runtime that only
//!   runs while `update()` pumps it; no background thread drives requests
//! - No retries; a failed request is reported once and the queue moves on

use std::collections::VecDeque;
use std::time::Duration;

use reqwest::header::HeaderValue;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::Span;

use crate::config::HttpConfig;
use crate::error::{NetworkError, NetworkResult, TransferError};
use crate::http::request::{Method, OnReject, OnResponse, Request, HTTP_BAD_GATEWAY, HTTP_OK};
use crate::http::transfer::{self, Completed, TransferJob, TransferSettings};
use crate::observability::metrics;

/// An HTTP submitter advanced by periodic polls.
pub trait HttpRequests {
    /// Queue a request; it starts at once when nothing else is in flight.
    fn enqueue(&mut self, request: Request);

    /// Advance the in-flight request without blocking.
    fn update(&mut self);

    /// Lifetime bytes sent by successful requests.
    fn total_upload(&self) -> usize;

    /// Lifetime bytes received by successful requests.
    fn total_download(&self) -> usize;
}

struct ActiveTransfer {
    method: Method,
    url: String,
    task: JoinHandle<Result<Completed, TransferError>>,
    on_response: OnResponse,
    on_reject: OnReject,
}

/// FIFO request queue over one reusable transfer context.
pub struct RequestQueue {
    runtime: Runtime,
    client: reqwest::Client,
    settings: TransferSettings,
    active: Option<ActiveTransfer>,
    pending: VecDeque<Request>,
    total_upload: usize,
    total_download: usize,
    span: Span,
}

impl RequestQueue {
    pub fn new(config: &HttpConfig, span: Span) -> NetworkResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(NetworkError::Runtime)?;

        let client = {
            let _guard = runtime.enter();
            let mut builder = reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .pool_max_idle_per_host(0)
                .no_proxy();
            if config.connect_timeout_secs > 0 {
                builder = builder.connect_timeout(Duration::from_secs(config.connect_timeout_secs));
            }
            if config.request_timeout_secs > 0 {
                builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
            }
            builder.build().map_err(NetworkError::HttpClient)?
        };

        let settings = TransferSettings {
            user_agent: header_value(&config.user_agent, "curl/7.81.0"),
            content_type: header_value(&config.post_content_type, "application/json"),
            max_redirects: config.max_redirects,
        };

        Ok(Self {
            runtime,
            client,
            settings,
            active: None,
            pending: VecDeque::new(),
            total_upload: 0,
            total_download: 0,
            span,
        })
    }

    /// Queue a GET. `max_size` of 0 means unbounded.
    pub fn get(
        &mut self,
        url: impl Into<String>,
        on_response: impl FnOnce(Vec<u8>) + 'static,
        on_reject: impl FnOnce(u16) + 'static,
        max_size: usize,
    ) {
        self.enqueue(Request::get(url, on_response, on_reject, max_size));
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
        self.enqueue(Request::post(url, body, on_response, on_reject, max_size));
    }

    /// Number of requests waiting behind the active one.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    fn start(&mut self, request: Request) {
        let Request {
            method,
            url,
            body,
            on_response,
            on_reject,
            max_size,
            follow_redirects,
        } = request;

        tracing::debug!(method = method.as_str(), url = %url, "Starting request");
        let job = TransferJob {
            method,
            url: url.clone(),
            body,
            max_size,
            follow_redirects,
        };
        let task = self.runtime.spawn(transfer::perform(
            self.client.clone(),
            job,
            self.settings.clone(),
        ));

        self.active = Some(ActiveTransfer {
            method,
            url,
            task,
            on_response,
            on_reject,
        });
    }

    /// Give the runtime one bounded turn: ready tasks run, the I/O driver
    /// is polled without waiting.
    fn pump(&self) {
        self.runtime.block_on(tokio::task::yield_now());
    }

    fn finish(&mut self, active: ActiveTransfer) {
        let ActiveTransfer {
            method,
            url,
            task,
            on_response,
            on_reject,
        } = active;

        let outcome = match self.runtime.block_on(task) {
            Ok(outcome) => outcome,
            Err(e) => Err(TransferError::Aborted(e.to_string())),
        };

        match outcome {
            Ok(done) if done.status == HTTP_OK => {
                self.total_upload += done.request_bytes;
                self.total_download += done.header_bytes + done.body.len();
                metrics::record_http_result(method.as_str(), done.status);
                tracing::debug!(url = %url, bytes = done.body.len(), "Request completed");
                on_response(done.body);
            }
            Ok(done) => {
                metrics::record_http_result(method.as_str(), done.status);
                tracing::error!(url = %url, status = done.status, "Response code {}", done.status);
                on_reject(done.status);
            }
            Err(e) => {
                metrics::record_http_result(method.as_str(), HTTP_BAD_GATEWAY);
                tracing::error!(url = %url, error = %e, "Request failed");
                on_reject(HTTP_BAD_GATEWAY);
            }
        }
    }
}

impl HttpRequests for RequestQueue {
    fn enqueue(&mut self, request: Request) {
        if self.active.is_some() {
            self.pending.push_back(request);
            return;
        }
        let span = self.span.clone();
        let _enter = span.enter();
        self.start(request);
    }

    fn update(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        let Some(active) = &self.active else {
            return;
        };
        if !active.task.is_finished() {
            self.pump();
            if !active.task.is_finished() {
                return;
            }
        }

        if let Some(active) = self.active.take() {
            self.finish(active);
        }
        if let Some(next) = self.pending.pop_front() {
            self.start(next);
        }
    }

    fn total_upload(&self) -> usize {
        self.total_upload
    }

    fn total_download(&self) -> usize {
        self.total_download
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("active", &self.active.as_ref().map(|a| &a.url))
            .field("pending", &self.pending.len())
            .field("total_upload", &self.total_upload)
            .field("total_download", &self.total_download)
            .finish_non_exhaustive()
    }
}

fn header_value(value: &str, fallback: &'static str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| {
        tracing::warn!(value, fallback, "Invalid header value in config, using fallback");
        HeaderValue::from_static(fallback)
    })
}
