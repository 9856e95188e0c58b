//! Request and response snapshots
//!
//! These are the values that flow through the interceptor: a `Request`
//! describing what the page asked for, and a `Response` holding an immutable
//! byte snapshot that can be cloned into a cache partition without touching
//! the copy handed back to the caller.

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// An intercepted HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
    /// Request headers as ordered name/value pairs
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Creates a request with the given method and no headers
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
        }
    }

    /// Creates a GET request for the given URL
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parses `url` and creates a GET request for it
    pub fn parse_get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::get(Url::parse(url)?))
    }

    /// Adds a header to the request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether this is a GET request, the only kind that is ever cached
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// The normalized cache key for this request
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

/// Normalized request identity used to key cache entries
///
/// Two requests share a key when they have the same method and the same URL
/// once the fragment is removed. The query string is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Upper-case HTTP method
    pub method: String,
    /// Absolute URL without fragment
    pub url: String,
}

impl CacheKey {
    /// Builds a key from a method and URL
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// Whether the key belongs to a GET request
    pub fn is_get(&self) -> bool {
        self.method == Method::GET.as_str()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A captured HTTP response
///
/// The body is a `Bytes` snapshot, so cloning a response is cheap and both
/// copies always hold the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase sent with the status, if any
    #[serde(default)]
    pub status_text: String,
    /// Response headers as ordered name/value pairs
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
    /// Final URL the response was served from
    pub url: String,
}

impl Response {
    /// Creates a response with the given status and body
    pub fn new(status: u16, body: impl Into<Bytes>, url: impl Into<String>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
            url: url.into(),
        }
    }

    /// Adds a header to the response
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the status is in the 2xx range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Looks up a header value, ignoring ASCII case in the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Size of the body in bytes
    pub fn body_len(&self) -> u64 {
        self.body.len() as u64
    }
}
