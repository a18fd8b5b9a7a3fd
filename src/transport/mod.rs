//! Request orchestration: retries, sniff scheduling, events, cancellation.
//!
//! [`Transport`] turns a logical request into a reliable call against one of
//! the pool's nodes. Each call walks `selecting → sending → (success |
//! retryable-failure | fatal-failure)`: transport-level failures mark the
//! node dead and loop back to selection with a fresh node until the retry
//! ceiling is reached; anything the node actually answered is terminal.

mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{
    HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE,
};
use http::{HeaderMap, Method};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub use config::{Compression, TransportBuilder};
pub(crate) use config::TransportConfig;

use crate::connection::{Connection, ConnectionSpec};
use crate::error::Error;
use crate::event::{EventHandler, EventMeta, RequestEvent};
use crate::http::{gzip_body, HttpClient, HttpRequest};
use crate::pool::ConnectionPool;
use crate::request::{
    request_id_generator, RequestIdGeneratorFn, RequestOptions, RequestParams,
};
use crate::serializer::{BodyContentType, Serializer};
use crate::sniff::{parse_node_descriptors, SniffInfo, SniffReason};

/// A settled, successful call: decoded body plus everything observability
/// needs. The same shape feeds the `response` lifecycle event.
#[derive(Debug, Clone)]
pub struct Response {
    /// Decoded response body (`Null` when `as_stream` was requested).
    pub body: Value,
    /// Raw response bytes, always available.
    pub raw_body: Bytes,
    /// HTTP status code. Ignored non-2xx statuses land here too.
    pub status_code: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// `Warning` headers from the node plus caller-supplied warnings.
    pub warnings: Vec<String>,
    /// Call metadata: connection used, attempts, request id, sniff outcome.
    pub meta: EventMeta,
}

/// The transport: top-level orchestrator over pool, serializer, and HTTP
/// send capability.
///
/// Cheap to clone; clones share the pool, the sniff schedule, and the
/// in-flight-sniff guard.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.inner.config.name)
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Starts building a transport.
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    pub(crate) fn from_parts(
        config: TransportConfig,
        pool: Arc<dyn ConnectionPool>,
        http: Arc<dyn HttpClient>,
        serializer: Arc<dyn Serializer>,
        events: Arc<dyn EventHandler>,
        generate_request_id: Option<Arc<RequestIdGeneratorFn>>,
    ) -> Self {
        let sniff_enabled = config.sniff_interval.is_some()
            || config.sniff_on_start
            || config.sniff_on_connection_fault;
        let next_sniff_at = config
            .sniff_interval
            .map(|interval| Instant::now() + interval);
        let sniff_on_start_pending = config.sniff_on_start;
        Self {
            inner: Arc::new(TransportInner {
                config,
                pool,
                http,
                serializer,
                events,
                generate_request_id: request_id_generator(generate_request_id),
                sniff_enabled,
                next_sniff_at: Mutex::new(next_sniff_at),
                is_sniffing: AtomicBool::new(false),
                sniff_on_start_pending: AtomicBool::new(sniff_on_start_pending),
            }),
        }
    }

    /// Executes a logical request against the cluster.
    ///
    /// Settles exactly once, with either the decoded response or one error
    /// from the transport taxonomy. Transport-level failures are retried on
    /// other nodes up to the configured ceiling; everything else propagates
    /// immediately.
    pub async fn request(
        &self,
        params: RequestParams,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        Arc::clone(&self.inner).request(params, options).await
    }

    /// Runs one sniff round now, tagged with the given reason.
    ///
    /// Returns `Ok(None)` when a round was already in flight (the trigger
    /// is dropped, not queued).
    pub async fn sniff(
        &self,
        reason: SniffReason,
    ) -> Result<Option<Vec<ConnectionSpec>>, Error> {
        match self.inner.sniff_guarded(reason).await {
            None => Ok(None),
            Some(result) => result.map(Some),
        }
    }

    /// Selects a connection using the configured filter and selector,
    /// without sending anything.
    pub fn get_connection(&self) -> Option<Connection> {
        self.inner
            .pool
            .get_connection(&self.inner.config.node_filter, &self.inner.config.node_selector)
    }

    /// Snapshot of the pool membership.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.pool.connections()
    }
}

struct TransportInner {
    config: TransportConfig,
    pool: Arc<dyn ConnectionPool>,
    http: Arc<dyn HttpClient>,
    serializer: Arc<dyn Serializer>,
    events: Arc<dyn EventHandler>,
    generate_request_id: Arc<RequestIdGeneratorFn>,
    sniff_enabled: bool,
    /// When the next interval-triggered sniff is due. `None` when periodic
    /// sniffing is disabled.
    next_sniff_at: Mutex<Option<Instant>>,
    /// At most one sniff round in flight; extra triggers are dropped.
    is_sniffing: AtomicBool,
    /// The one-time sniff-on-start trigger, consumed by the first request.
    sniff_on_start_pending: AtomicBool,
}

/// Clears the in-flight-sniff flag when the round finishes, including when
/// the round's future is dropped mid-await (caller timeout, task abort).
/// Without this, a dropped round would leave the flag set and every later
/// trigger would be silently discarded.
struct SniffInFlight<'a>(&'a AtomicBool);

impl Drop for SniffInFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Final response fields produced by the attempt loop.
struct AttemptOutcome {
    status_code: u16,
    headers: HeaderMap,
    raw_body: Bytes,
    body: Value,
    warnings: Vec<String>,
}

impl TransportInner {
    async fn request(
        self: Arc<Self>,
        params: RequestParams,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let request_id = options
            .id
            .clone()
            .unwrap_or_else(|| (self.generate_request_id)(&params, &options));
        let timeout = options.request_timeout.unwrap_or(self.config.request_timeout);
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let compression = options.compression.unwrap_or(self.config.compression);
        let cancellation = options.cancellation.clone().unwrap_or_default();

        // Sniff rounds triggered by this call run detached; the slot lets a
        // completed round attach its outcome to this call's metadata.
        let sniff_slot: Arc<Mutex<Option<SniffInfo>>> = Arc::new(Mutex::new(None));
        self.maybe_trigger_scheduled_sniff(&sniff_slot);

        let mut meta = EventMeta {
            context: options.context.clone(),
            name: self.config.name.clone(),
            request_id,
            params: params.clone(),
            options: options.clone(),
            connection: None,
            attempts: 0,
            aborted: false,
            sniff: None,
        };

        self.events.on_request(&RequestEvent {
            body: Value::Null,
            status_code: None,
            headers: None,
            warnings: options.warnings.clone(),
            meta: meta.clone(),
        });

        let result = self
            .run_attempts(
                &params,
                &options,
                timeout,
                max_retries,
                compression,
                &cancellation,
                &mut meta,
            )
            .await;

        meta.sniff = sniff_slot.lock().take();

        match result {
            Ok(outcome) => {
                let response = Response {
                    body: outcome.body,
                    raw_body: outcome.raw_body,
                    status_code: outcome.status_code,
                    headers: outcome.headers,
                    warnings: outcome.warnings,
                    meta,
                };
                self.events.on_response(
                    &RequestEvent {
                        body: response.body.clone(),
                        status_code: Some(response.status_code),
                        headers: Some(response.headers.clone()),
                        warnings: response.warnings.clone(),
                        meta: response.meta.clone(),
                    },
                    None,
                );
                Ok(response)
            }
            Err(error) => {
                // A node-responded error still carries what the node sent.
                let (body, status_code, headers) = match &error {
                    Error::Response {
                        status_code,
                        headers,
                        body,
                    } => (body.clone(), Some(*status_code), Some(headers.clone())),
                    _ => (Value::Null, None, None),
                };
                self.events.on_response(
                    &RequestEvent {
                        body,
                        status_code,
                        headers,
                        warnings: options.warnings.clone(),
                        meta,
                    },
                    Some(&error),
                );
                Err(error)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_attempts(
        self: &Arc<Self>,
        params: &RequestParams,
        options: &RequestOptions,
        timeout: Duration,
        max_retries: u32,
        compression: Compression,
        cancellation: &CancellationToken,
        meta: &mut EventMeta,
    ) -> Result<AttemptOutcome, Error> {
        // Serialize and compress once; every attempt reuses the same bytes.
        let payload = self.prepare_payload(params, compression)?;

        loop {
            if cancellation.is_cancelled() {
                meta.aborted = true;
                return Err(Error::RequestAborted);
            }

            let Some(connection) = self
                .pool
                .get_connection(&self.config.node_filter, &self.config.node_selector)
            else {
                warn!(request_id = %meta.request_id, "no living connections in the pool");
                return Err(Error::NoLivingConnections);
            };
            meta.attempts += 1;
            meta.connection = Some(connection.clone());

            let request = HttpRequest {
                method: params.method.clone(),
                url: build_url(&connection.url, &params.path, params, options),
                headers: self.build_headers(options, payload.as_ref(), compression),
                body: payload.as_ref().map(|(bytes, _)| bytes.clone()),
                timeout,
            };
            debug!(
                request_id = %meta.request_id,
                node = %connection.id,
                attempt = meta.attempts,
                method = %request.method,
                path = %params.path,
                "sending request"
            );

            let send_result = tokio::select! {
                _ = cancellation.cancelled() => {
                    // Abort stops the in-flight wait; the node is not
                    // penalized for it.
                    meta.aborted = true;
                    return Err(Error::RequestAborted);
                }
                result = tokio::time::timeout(timeout, self.http.send(request)) => {
                    match result {
                        Ok(inner) => inner,
                        Err(_) => Err(Error::timeout(format!(
                            "attempt exceeded the {timeout:?} deadline"
                        ))),
                    }
                }
            };

            match send_result {
                Err(error) if error.marks_dead() => {
                    self.pool.mark_dead(&connection.id);
                    if self.config.sniff_on_connection_fault {
                        self.spawn_sniff(SniffReason::SniffOnConnectionFault, None);
                    }
                    if meta.attempts <= max_retries {
                        debug!(
                            request_id = %meta.request_id,
                            node = %connection.id,
                            attempt = meta.attempts,
                            error = %error,
                            "retrying on another connection"
                        );
                        continue;
                    }
                    return Err(error);
                }
                Err(error) => return Err(error),
                Ok(response) => {
                    // The node answered, whatever the status: it is alive.
                    self.pool.mark_alive(&connection.id);

                    let mut warnings = response.warnings();
                    warnings.extend(options.warnings.iter().cloned());

                    let status_code = response.status_code;
                    if !response.is_success() && !options.ignore.contains(&status_code) {
                        return Err(Error::response(
                            status_code,
                            response.headers,
                            &response.body,
                        ));
                    }

                    let body = if options.as_stream {
                        Value::Null
                    } else {
                        self.serializer.deserialize(&response.body)?
                    };
                    return Ok(AttemptOutcome {
                        status_code,
                        headers: response.headers,
                        raw_body: response.body,
                        body,
                        warnings,
                    });
                }
            }
        }
    }

    /// Serializes the body (bulk bodies take precedence) and applies the
    /// configured compression.
    fn prepare_payload(
        &self,
        params: &RequestParams,
        compression: Compression,
    ) -> Result<Option<(Bytes, BodyContentType)>, Error> {
        let payload = if let Some(lines) = &params.bulk_body {
            Some((self.serializer.serialize_bulk(lines)?, BodyContentType::NdJson))
        } else if let Some(body) = &params.body {
            Some((self.serializer.serialize(body)?, BodyContentType::Json))
        } else {
            None
        };
        match (payload, compression) {
            (Some((bytes, content_type)), Compression::Gzip) => {
                Ok(Some((gzip_body(&bytes)?, content_type)))
            }
            (payload, _) => Ok(payload),
        }
    }

    /// Static headers first, per-call headers over them, then the wire
    /// headers the transport owns.
    fn build_headers(
        &self,
        options: &RequestOptions,
        payload: Option<&(Bytes, BodyContentType)>,
        compression: Compression,
    ) -> HeaderMap {
        let mut headers = self.config.headers.clone();
        // Per-call headers replace static ones by name; a name repeated in
        // the per-call set keeps every value.
        for name in options.headers.keys() {
            let mut values = options.headers.get_all(name).iter();
            if let Some(first) = values.next() {
                headers.insert(name, first.clone());
            }
            for value in values {
                headers.append(name, value.clone());
            }
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some((_, content_type)) = payload {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        }
        if compression == Compression::Gzip {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
            if payload.is_some() {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            }
        }
        headers
    }

    /// Fires the sniff-on-start or interval trigger when due. Never blocks
    /// the request path: rounds run as detached tasks.
    fn maybe_trigger_scheduled_sniff(
        self: &Arc<Self>,
        slot: &Arc<Mutex<Option<SniffInfo>>>,
    ) {
        if !self.sniff_enabled {
            return;
        }
        if self.sniff_on_start_pending.swap(false, Ordering::SeqCst) {
            self.spawn_sniff(SniffReason::SniffOnStart, Some(Arc::clone(slot)));
            return;
        }
        if self.config.sniff_interval.is_some() {
            let due = self
                .next_sniff_at
                .lock()
                .is_some_and(|at| Instant::now() >= at);
            if due {
                self.spawn_sniff(SniffReason::SniffInterval, Some(Arc::clone(slot)));
            }
        }
    }

    /// Launches a sniff round as a detached task, respecting the
    /// single-round-in-flight guard.
    fn spawn_sniff(self: &Arc<Self>, reason: SniffReason, slot: Option<Arc<Mutex<Option<SniffInfo>>>>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner.sniff_guarded(reason).await;
            if let (Some(slot), Some(Ok(specs))) = (slot, outcome) {
                let hosts = specs.iter().map(|s| s.url.to_string()).collect();
                *slot.lock() = Some(SniffInfo { hosts, reason });
            }
        });
    }

    /// Runs one sniff round unless one is already in flight, in which case
    /// the trigger is dropped (`None`).
    async fn sniff_guarded(
        self: &Arc<Self>,
        reason: SniffReason,
    ) -> Option<Result<Vec<ConnectionSpec>, Error>> {
        if self.is_sniffing.swap(true, Ordering::SeqCst) {
            debug!(reason = %reason, "sniff already in flight; dropping trigger");
            return None;
        }
        let _in_flight = SniffInFlight(&self.is_sniffing);
        let result = self.sniff_round(reason).await;

        match &result {
            Ok(specs) => {
                let hosts: Vec<String> = specs.iter().map(|s| s.url.to_string()).collect();
                info!(reason = %reason, nodes = hosts.len(), "sniff round completed");
                self.events.on_sniff(reason, &hosts, None);
            }
            Err(error) => {
                // A failed round waits for the next natural trigger; it
                // does not reschedule itself.
                warn!(reason = %reason, error = %error, "sniff round failed");
                self.events.on_sniff(reason, &[], Some(error));
            }
        }
        Some(result)
    }

    async fn sniff_round(
        self: &Arc<Self>,
        reason: SniffReason,
    ) -> Result<Vec<ConnectionSpec>, Error> {
        debug!(reason = %reason, endpoint = %self.config.sniff_endpoint, "starting sniff round");
        let params = RequestParams::new(Method::GET, self.config.sniff_endpoint.clone());
        let response = Arc::clone(self).request(params, RequestOptions::new()).await?;

        let scheme = response
            .meta
            .connection
            .as_ref()
            .map(|c| c.url.scheme().to_string())
            .unwrap_or_else(|| "http".to_string());
        let specs = parse_node_descriptors(&response.body, &scheme)?;
        self.pool.update(specs.clone());

        // Interval scheduling is relative to completion, not wall-clock
        // aligned.
        if let Some(interval) = self.config.sniff_interval {
            *self.next_sniff_at.lock() = Some(Instant::now() + interval);
        }
        Ok(specs)
    }
}

/// Joins the node base URL with the request path and merged query string.
fn build_url(
    base: &Url,
    path: &str,
    params: &RequestParams,
    options: &RequestOptions,
) -> Url {
    let mut url = base.clone();
    let merged_path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&merged_path);
    if !params.querystring.is_empty() || !options.querystring.is_empty() {
        let mut pairs = url.query_pairs_mut();
        // Per-call query params shadow the logical request's own.
        for (key, value) in &params.querystring {
            if !options.querystring.contains_key(key) {
                pairs.append_pair(key, value);
            }
        }
        for (key, value) in &options.querystring {
            pairs.append_pair(key, value);
        }
    }
    url
}
