//! Transport construction and validation.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use url::Url;

use crate::connection::ConnectionSpec;
use crate::error::Error;
use crate::event::{EventHandler, NoopEventHandler};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::pool::{ClusterPool, ConnectionPool, NodeFilter, NodeSelector};
use crate::request::RequestIdGeneratorFn;
use crate::serializer::{JsonSerializer, Serializer};
use crate::sniff::DEFAULT_SNIFF_ENDPOINT;

use super::Transport;

/// Request body compression mode. All-or-nothing per configuration; there
/// is no payload-size threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Send bodies uncompressed.
    #[default]
    Disabled,
    /// Gzip request bodies and advertise gzip responses.
    Gzip,
}

/// Immutable transport configuration, fixed at construction.
#[derive(Debug, Clone)]
pub(crate) struct TransportConfig {
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub compression: Compression,
    pub sniff_interval: Option<Duration>,
    pub sniff_on_start: bool,
    pub sniff_on_connection_fault: bool,
    pub sniff_endpoint: String,
    pub node_filter: NodeFilter,
    pub node_selector: NodeSelector,
    pub headers: HeaderMap,
    pub name: String,
}

/// Builder for [`Transport`].
///
/// ## Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use findex_transport::{Compression, Transport};
///
/// # fn main() -> Result<(), findex_transport::Error> {
/// let transport = Transport::builder()
///     .node("http://10.0.0.1:9200")?
///     .node("http://10.0.0.2:9200")?
///     .max_retries(5)
///     .request_timeout(Duration::from_secs(10))
///     .compression(Compression::Gzip)
///     .sniff_on_start(true)
///     .sniff_interval(Duration::from_secs(300))
///     .build()?;
/// # let _ = transport;
/// # Ok(())
/// # }
/// ```
pub struct TransportBuilder {
    nodes: Vec<ConnectionSpec>,
    pool: Option<Arc<dyn ConnectionPool>>,
    http_client: Option<Arc<dyn HttpClient>>,
    serializer: Arc<dyn Serializer>,
    event_handler: Arc<dyn EventHandler>,
    max_retries: u32,
    request_timeout: Duration,
    compression: Compression,
    sniff_interval: Option<Duration>,
    sniff_on_start: bool,
    sniff_on_connection_fault: bool,
    sniff_endpoint: String,
    node_filter: NodeFilter,
    node_selector: NodeSelector,
    generate_request_id: Option<Arc<RequestIdGeneratorFn>>,
    headers: HeaderMap,
    name: String,
}

impl std::fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("nodes", &self.nodes)
            .field("max_retries", &self.max_retries)
            .field("request_timeout", &self.request_timeout)
            .field("compression", &self.compression)
            .field("sniff_interval", &self.sniff_interval)
            .field("sniff_on_start", &self.sniff_on_start)
            .field("sniff_on_connection_fault", &self.sniff_on_connection_fault)
            .field("sniff_endpoint", &self.sniff_endpoint)
            .field("node_filter", &self.node_filter)
            .field("node_selector", &self.node_selector)
            .field("headers", &self.headers)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TransportBuilder {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            pool: None,
            http_client: None,
            serializer: Arc::new(JsonSerializer),
            event_handler: Arc::new(NoopEventHandler),
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            compression: Compression::default(),
            sniff_interval: None,
            sniff_on_start: false,
            sniff_on_connection_fault: false,
            sniff_endpoint: DEFAULT_SNIFF_ENDPOINT.to_string(),
            node_filter: NodeFilter::default(),
            node_selector: NodeSelector::default(),
            generate_request_id: None,
            headers: HeaderMap::new(),
            name: "findex-transport".to_string(),
        }
    }

    /// Adds a cluster node by URL.
    pub fn node(mut self, url: impl AsRef<str>) -> Result<Self, Error> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| Error::configuration(format!("invalid node URL: {e}")))?;
        self.nodes.push(ConnectionSpec::new(url));
        Ok(self)
    }

    /// Adds a cluster node from a full spec (custom id or roles).
    #[must_use]
    pub fn node_spec(mut self, spec: ConnectionSpec) -> Self {
        self.nodes.push(spec);
        self
    }

    /// Supplies a pre-built pool instead of node URLs, e.g. a
    /// [`SingleNodePool`](crate::pool::SingleNodePool) for managed
    /// deployments.
    #[must_use]
    pub fn pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Replaces the HTTP send capability (defaults to reqwest).
    #[must_use]
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Replaces the body serializer (defaults to JSON).
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Registers the lifecycle event handler.
    #[must_use]
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    /// Sets the retry ceiling per request. `0` disables retries.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the default per-attempt deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the request body compression mode.
    #[must_use]
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Enables periodic sniffing with the given period.
    #[must_use]
    pub fn sniff_interval(mut self, interval: Duration) -> Self {
        self.sniff_interval = Some(interval);
        self
    }

    /// Performs one sniff round when the transport starts serving requests.
    #[must_use]
    pub fn sniff_on_start(mut self, enabled: bool) -> Self {
        self.sniff_on_start = enabled;
        self
    }

    /// Sniffs immediately after a connection is marked dead.
    #[must_use]
    pub fn sniff_on_connection_fault(mut self, enabled: bool) -> Self {
        self.sniff_on_connection_fault = enabled;
        self
    }

    /// Sets the topology introspection path.
    #[must_use]
    pub fn sniff_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.sniff_endpoint = endpoint.into();
        self
    }

    /// Sets the node filter predicate.
    #[must_use]
    pub fn node_filter(mut self, filter: NodeFilter) -> Self {
        self.node_filter = filter;
        self
    }

    /// Sets the node selection strategy.
    #[must_use]
    pub fn node_selector(mut self, selector: NodeSelector) -> Self {
        self.node_selector = selector;
        self
    }

    /// Sets a custom correlation-id generator.
    #[must_use]
    pub fn generate_request_id(mut self, generator: Arc<RequestIdGeneratorFn>) -> Self {
        self.generate_request_id = Some(generator);
        self
    }

    /// Sets static headers sent with every request. Per-call headers
    /// override these on conflict.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the logical name carried in event metadata.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Validates the configuration and builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] synchronously when the
    /// configuration is unusable; a misconfigured transport never reaches
    /// the request path.
    pub fn build(self) -> Result<Transport, Error> {
        if self.request_timeout.is_zero() {
            return Err(Error::configuration("request_timeout must be non-zero"));
        }
        if let Some(interval) = self.sniff_interval {
            if interval.is_zero() {
                return Err(Error::configuration(
                    "sniff_interval must be non-zero; omit it to disable sniffing",
                ));
            }
        }
        if self.sniff_endpoint.is_empty() || !self.sniff_endpoint.starts_with('/') {
            return Err(Error::configuration(
                "sniff_endpoint must be an absolute path",
            ));
        }
        if self.pool.is_some() && !self.nodes.is_empty() {
            return Err(Error::configuration(
                "provide either node URLs or a pre-built pool, not both",
            ));
        }
        if self.pool.is_none() && self.nodes.is_empty() {
            return Err(Error::configuration("at least one node is required"));
        }

        let pool = match self.pool {
            Some(pool) => pool,
            None => Arc::new(ClusterPool::from_specs(self.nodes)) as Arc<dyn ConnectionPool>,
        };
        let http_client = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::new()?) as Arc<dyn HttpClient>,
        };

        let config = TransportConfig {
            max_retries: self.max_retries,
            request_timeout: self.request_timeout,
            compression: self.compression,
            sniff_interval: self.sniff_interval,
            sniff_on_start: self.sniff_on_start,
            sniff_on_connection_fault: self.sniff_on_connection_fault,
            sniff_endpoint: self.sniff_endpoint,
            node_filter: self.node_filter,
            node_selector: self.node_selector,
            headers: self.headers,
            name: self.name,
        };

        Ok(Transport::from_parts(
            config,
            pool,
            http_client,
            self.serializer,
            self.event_handler,
            self.generate_request_id,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_rejected() {
        let err = TransportBuilder::new()
            .node("http://localhost:9200")
            .unwrap()
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_zero_sniff_interval_rejected() {
        let err = TransportBuilder::new()
            .node("http://localhost:9200")
            .unwrap()
            .sniff_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_relative_sniff_endpoint_rejected() {
        let err = TransportBuilder::new()
            .node("http://localhost:9200")
            .unwrap()
            .sniff_endpoint("_nodes/_all/http")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_no_nodes_rejected() {
        let err = TransportBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_invalid_node_url_rejected() {
        let err = TransportBuilder::new().node("not a url").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
