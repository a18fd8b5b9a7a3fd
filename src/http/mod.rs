//! Transport-level send capability.
//!
//! The retry machinery is written against the [`HttpClient`] trait: issue
//! one HTTP call given method, URL, headers, body, and deadline, and get
//! back either a raw response or a classified failure. The production
//! implementation is [`ReqwestHttpClient`]; tests use the in-memory client
//! from [`crate::testing`].

mod client;

use std::io::Write;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use url::Url;

pub use client::ReqwestHttpClient;

use crate::error::Error;

/// One fully-prepared HTTP call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, querystring included.
    pub url: Url,
    /// Headers to send, static and per-call merged.
    pub headers: HeaderMap,
    /// Wire-format body, already serialized (and compressed when gzip is
    /// enabled).
    pub body: Option<Bytes>,
    /// Per-attempt deadline.
    pub timeout: Duration,
}

/// Raw response from a node, before status handling and body decoding.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers as received.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Collects the values of every `Warning` header.
    pub fn warnings(&self) -> Vec<String> {
        self.headers
            .get_all(http::header::WARNING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect()
    }
}

/// Issues a single HTTP call.
///
/// Implementations classify their failures: connect/reset failures as
/// [`Error::Connection`], elapsed deadlines as [`Error::Timeout`]. Any
/// received response, whatever its status, is returned as `Ok`.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends the request and waits for the full response body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error>;
}

/// Gzip-compresses a request body.
///
/// Compression is all-or-nothing per configuration; there is no size
/// threshold below which bodies are sent uncompressed.
pub(crate) fn gzip_body(body: &[u8]) -> Result<Bytes, Error> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(body).map_err(Error::serialization)?;
    encoder
        .finish()
        .map(Bytes::from)
        .map_err(Error::serialization)
}
