//! HTTP request description and completion callbacks.

/// Status delivered to `on_response` callers.
pub const HTTP_OK: u16 = 200;

/// Status reported to `on_reject` for transport failures.
pub const HTTP_BAD_GATEWAY: u16 = 502;

/// Called with the full response body on status 200.
pub type OnResponse = Box<dyn FnOnce(Vec<u8>)>;

/// Called with the HTTP status, or [`HTTP_BAD_GATEWAY`] on transport failure.
pub type OnReject = Box<dyn FnOnce(u16)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// A queued HTTP request. Immutable once enqueued; consumed exactly once.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) on_response: OnResponse,
    pub(crate) on_reject: OnReject,
    pub(crate) max_size: usize,
    pub(crate) follow_redirects: bool,
}

impl Request {
    /// A GET request. `max_size` of 0 means unbounded.
    pub fn get(
        url: impl Into<String>,
        on_response: impl FnOnce(Vec<u8>) + 'static,
        on_reject: impl FnOnce(u16) + 'static,
        max_size: usize,
    ) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            on_response: Box::new(on_response),
            on_reject: Box::new(on_reject),
            max_size,
            follow_redirects: false,
        }
    }

    /// A POST request carrying `body`. `max_size` of 0 means unbounded.
    pub fn post(
        url: impl Into<String>,
        body: impl Into<Vec<u8>>,
        on_response: impl FnOnce(Vec<u8>) + 'static,
        on_reject: impl FnOnce(u16) + 'static,
        max_size: usize,
    ) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body.into()),
            on_response: Box::new(on_response),
            on_reject: Box::new(on_reject),
            max_size,
            follow_redirects: false,
        }
    }

    /// Follow 3xx responses instead of rejecting with their status.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("max_size", &self.max_size)
            .field("follow_redirects", &self.follow_redirects)
            .finish_non_exhaustive()
    }
}
