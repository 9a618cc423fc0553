//! HTTP requester abstraction for the OAuth 1.0a client
//!
//! Defines the `HttpRequester` trait that decouples the signing and lifecycle
//! logic from any concrete HTTP stack. `ReqwestRequester` is the production
//! implementation; `ScriptedRequester` replays canned responses for tests.
//!
//! The core never retries: a `TransportError` is terminal for the call that
//! produced it, and timeouts are owned by the requester implementation.

pub mod reqwest_requester;
pub mod scripted;

pub use reqwest_requester::ReqwestRequester;
pub use scripted::ScriptedRequester;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

/// HTTP methods used by OAuth 1.0a flows and signed API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Upper-case method name, as it appears in the signature base string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Whether signed parameters travel in the request body.
    ///
    /// GET/HEAD/DELETE carry OAuth credentials in the `Authorization` header;
    /// POST/PUT send the full signed parameter set as a form body.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a supported method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct ParseMethodError(pub String);

impl FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ParseMethodError(s.to_owned())),
        }
    }
}

/// Content type for token endpoint and body-bearing signed requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// One outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Redirects are followed unless this is false. The user-details call
    /// disables it because the endpoint answers with a redirect.
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            follow_redirects: true,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach an `application/x-www-form-urlencoded` body.
    pub fn form_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.header("content-type", FORM_CONTENT_TYPE)
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// First value of a request header, matched case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response returned by an `HttpRequester`.
///
/// Header names are stored lower-cased so lookups never depend on the
/// casing the server used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// JSON response with the matching content type.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header.
    pub fn header<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.header_values(name).next()
    }

    /// All values of a header, in the order received.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-level failures. Non-2xx statuses are not errors at this layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Pluggable HTTP collaborator.
///
/// Uses a `Pin<Box<dyn Future>>` return type so it can be shared as
/// `Arc<dyn HttpRequester>` between the discovery cache and the controller.
pub trait HttpRequester: Send + Sync {
    /// Identifier for logging (e.g. "reqwest", "scripted").
    fn id(&self) -> &str;

    /// Perform exactly one request. Implementations must not retry.
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>>;
}
