//! Per-call request parameters and options.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Method};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::transport::Compression;

/// Signature of a custom correlation-id generator.
pub type RequestIdGeneratorFn = dyn Fn(&RequestParams, &RequestOptions) -> String + Send + Sync;

/// The logical request: what to ask the cluster, independent of which node
/// ends up serving it.
#[derive(Debug, Clone)]
pub struct RequestParams {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the node base URL, leading slash included.
    pub path: String,
    /// JSON request body.
    pub body: Option<Value>,
    /// Bulk body: one document per line on the wire (ndjson). Takes
    /// precedence over `body` when both are set.
    pub bulk_body: Option<Vec<Value>>,
    /// Query string parameters.
    pub querystring: BTreeMap<String, String>,
}

impl RequestParams {
    /// Creates params for a method and path, with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bulk_body: None,
            querystring: BTreeMap::new(),
        }
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the bulk (ndjson) body.
    #[must_use]
    pub fn with_bulk_body(mut self, lines: Vec<Value>) -> Self {
        self.bulk_body = Some(lines);
        self
    }

    /// Adds a query string parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.querystring.insert(key.into(), value.into());
        self
    }
}

/// Per-call overrides of the transport defaults, plus call-scoped state the
/// transport returns verbatim in events.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Status codes not treated as errors even when outside 2xx.
    pub ignore: Vec<u16>,
    /// Per-call deadline override.
    pub request_timeout: Option<Duration>,
    /// Per-call retry ceiling override.
    pub max_retries: Option<u32>,
    /// Per-call headers, merged over the transport's static headers.
    pub headers: HeaderMap,
    /// Extra query string parameters, merged over the params' own.
    pub querystring: BTreeMap<String, String>,
    /// Per-call compression override.
    pub compression: Option<Compression>,
    /// Correlation id; generated when absent.
    pub id: Option<String>,
    /// Opaque caller context, returned verbatim in events.
    pub context: Option<Value>,
    /// Informational warnings supplied by the caller, surfaced in events.
    pub warnings: Vec<String>,
    /// When set, the response body is returned raw instead of being
    /// deserialized.
    pub as_stream: bool,
    /// Cooperative cancellation handle for this call.
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    /// Creates options with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status codes to ignore.
    #[must_use]
    pub fn with_ignore(mut self, ignore: impl IntoIterator<Item = u16>) -> Self {
        self.ignore = ignore.into_iter().collect();
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the per-call retry ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the per-call compression mode.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the opaque caller context.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches a cancellation token to this call.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Requests the raw, undecoded response body.
    #[must_use]
    pub fn with_as_stream(mut self, as_stream: bool) -> Self {
        self.as_stream = as_stream;
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("ignore", &self.ignore)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("compression", &self.compression)
            .field("id", &self.id)
            .field("as_stream", &self.as_stream)
            .finish_non_exhaustive()
    }
}

/// Default correlation-id generator: a v4 UUID per call.
pub(crate) fn default_request_id(_params: &RequestParams, _options: &RequestOptions) -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Wraps a custom generator so the transport stores one callable shape.
pub(crate) fn request_id_generator(
    custom: Option<Arc<RequestIdGeneratorFn>>,
) -> Arc<RequestIdGeneratorFn> {
    custom.unwrap_or_else(|| Arc::new(default_request_id))
}
