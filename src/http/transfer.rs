//! One HTTP request/response exchange.
//!
//! Runs as a task on the queue's runtime and only makes progress while the
//! queue is being ticked.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::StatusCode;
use url::{Position, Url};

use crate::error::TransferError;
use crate::http::request::{Method, HTTP_OK};

/// Length of `"HTTP/1.1 "` and `" HTTP/1.1\r\n"` framing.
const VERSION_PREFIX: usize = "HTTP/1.1 ".len();
const VERSION_SUFFIX: usize = " HTTP/1.1\r\n".len();
const CRLF: usize = 2;

/// Per-request settings taken from the HTTP config.
#[derive(Debug, Clone)]
pub(crate) struct TransferSettings {
    pub user_agent: HeaderValue,
    pub content_type: HeaderValue,
    pub max_redirects: usize,
}

/// What to send; the part of a `Request` that crosses into the task.
#[derive(Debug)]
pub(crate) struct TransferJob {
    pub method: Method,
    pub url: String,
    pub body: Option<Vec<u8>>,
    pub max_size: usize,
    pub follow_redirects: bool,
}

/// Result of a finished exchange.
#[derive(Debug)]
pub(crate) struct Completed {
    pub status: u16,
    /// Empty unless the status is 200.
    pub body: Vec<u8>,
    /// Estimated bytes of the final request on the wire.
    pub request_bytes: usize,
    /// Estimated bytes of the final response head.
    pub header_bytes: usize,
}

/// Perform one exchange, following redirects when asked to.
pub(crate) async fn perform(
    client: reqwest::Client,
    job: TransferJob,
    settings: TransferSettings,
) -> Result<Completed, TransferError> {
    let mut url = Url::parse(&job.url)?;
    let mut method = job.method;
    let mut body = job.body;
    let mut redirects = 0;

    loop {
        let mut builder = client
            .request(method.into(), url.clone())
            .header(USER_AGENT, settings.user_agent.clone());
        if let Some(payload) = &body {
            builder = builder
                .header(CONTENT_TYPE, settings.content_type.clone())
                .body(payload.clone());
        }
        let request = builder.build()?;
        let request_bytes = request_size(&request);

        let mut response = client.execute(request).await?;
        let status = response.status();

        if job.follow_redirects && status.is_redirection() {
            if redirects == settings.max_redirects {
                return Err(TransferError::TooManyRedirects(settings.max_redirects));
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or(TransferError::MissingLocation)?;
            url = url.join(location)?;
            if matches!(
                status,
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
            ) {
                method = Method::Get;
                body = None;
            }
            redirects += 1;
            tracing::debug!(status = status.as_u16(), location = %url, "Following redirect");
            continue;
        }

        let header_bytes = response_head_size(status, response.headers());
        if status.as_u16() != HTTP_OK {
            return Ok(Completed {
                status: status.as_u16(),
                body: Vec::new(),
                request_bytes,
                header_bytes,
            });
        }

        let limit = job.max_size;
        if limit > 0 {
            if let Some(length) = response.content_length() {
                if length > limit as u64 {
                    return Err(TransferError::TooLarge { limit });
                }
            }
        }

        let mut collected = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if limit > 0 && collected.len() + chunk.len() > limit {
                return Err(TransferError::TooLarge { limit });
            }
            collected.extend_from_slice(&chunk);
        }

        return Ok(Completed {
            status: status.as_u16(),
            body: collected,
            request_bytes,
            header_bytes,
        });
    }
}

/// Estimate the HTTP/1.1 wire size of a request: request line, `Host`,
/// explicit headers, `Content-Length` when there is a body, blank line, body.
pub(crate) fn request_size(request: &reqwest::Request) -> usize {
    let url = request.url();
    let target = &url[Position::BeforePath..Position::AfterQuery];
    let line = request.method().as_str().len() + 1 + target.len() + VERSION_SUFFIX;

    let host = &url[Position::BeforeHost..Position::AfterPort];
    let host_header = "Host: ".len() + host.len() + CRLF;

    let headers = header_block_size(request.headers());

    let body = request
        .body()
        .and_then(|body| body.as_bytes())
        .map_or(0, <[u8]>::len);
    let length_header = if request.body().is_some() {
        "Content-Length: ".len() + body.to_string().len() + CRLF
    } else {
        0
    };

    line + host_header + headers + length_header + CRLF + body
}

/// Estimate the size of a response status line and header block.
pub(crate) fn response_head_size(status: StatusCode, headers: &HeaderMap) -> usize {
    let reason = status.canonical_reason().unwrap_or("");
    let line = VERSION_PREFIX + 3 + 1 + reason.len() + CRLF;
    line + header_block_size(headers) + CRLF
}

fn header_block_size(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + ": ".len() + value.len() + CRLF)
        .sum()
}
