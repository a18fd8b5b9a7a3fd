//! Testing utilities: an in-memory HTTP client.
//!
//! [`MockHttpClient`] operates entirely in memory, letting transport
//! behavior (retries, quarantine, sniffing, cancellation) be exercised
//! without network dependencies. Outcomes are scripted as a FIFO queue:
//! each send pops the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Error;
use crate::event::{EventHandler, RequestEvent};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::sniff::SniffReason;

/// One scripted outcome for a [`MockHttpClient`] send.
#[derive(Debug)]
pub enum MockOutcome {
    /// Deliver a response with this status and JSON body.
    Respond {
        /// HTTP status code.
        status_code: u16,
        /// Response headers.
        headers: HeaderMap,
        /// JSON body, sent serialized.
        body: Value,
    },
    /// Fail with a connection error.
    ConnectionError,
    /// Fail with a timeout error.
    TimeoutError,
    /// Never complete, until the surrounding call times out or is aborted.
    Hang,
}

impl MockOutcome {
    /// A 200 response with the given body.
    pub fn ok(body: Value) -> Self {
        MockOutcome::Respond {
            status_code: 200,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// A response with the given status and body.
    pub fn status(status_code: u16, body: Value) -> Self {
        MockOutcome::Respond {
            status_code,
            headers: HeaderMap::new(),
            body,
        }
    }
}

/// In-memory [`HttpClient`] with scripted outcomes.
///
/// Outcomes can be routed by path substring (checked first) or taken from
/// the default FIFO script. When nothing is scripted, sends answer 200 with
/// an empty JSON object, so tests only script what they assert on.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    script: Mutex<Vec<MockOutcome>>,
    routes: Mutex<Vec<(String, Vec<MockOutcome>)>>,
    requests: Mutex<Vec<HttpRequest>>,
    request_count: AtomicU64,
}

impl MockHttpClient {
    /// Creates a client with an empty script (every send answers 200).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client scripted with the given outcomes, in order.
    pub fn with_script(outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        let client = Self::new();
        client.enqueue_all(outcomes);
        client
    }

    /// Appends one outcome to the script.
    pub fn enqueue(&self, outcome: MockOutcome) {
        self.script.lock().push(outcome);
    }

    /// Appends several outcomes to the script.
    pub fn enqueue_all(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.script.lock().extend(outcomes);
    }

    /// Number of sends observed.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Snapshot of every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Routes requests whose URL path contains `path` to a dedicated
    /// outcome queue, checked before the default script.
    pub fn route(&self, path: impl Into<String>, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.routes
            .lock()
            .push((path.into(), outcomes.into_iter().collect()));
    }

    fn next_outcome(&self, request: &HttpRequest) -> MockOutcome {
        let mut routes = self.routes.lock();
        if let Some((_, queue)) = routes
            .iter_mut()
            .find(|(path, _)| request.url.path().contains(path.as_str()))
        {
            if !queue.is_empty() {
                return queue.remove(0);
            }
            return MockOutcome::ok(Value::Object(serde_json::Map::new()));
        }
        drop(routes);

        let mut script = self.script.lock();
        if script.is_empty() {
            MockOutcome::ok(Value::Object(serde_json::Map::new()))
        } else {
            script.remove(0)
        }
    }
}

/// [`EventHandler`] that records every event it sees, for assertions.
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    requests: Mutex<Vec<RequestEvent>>,
    responses: Mutex<Vec<(RequestEvent, Option<String>)>>,
    sniffs: Mutex<Vec<(SniffReason, Vec<String>, Option<String>)>>,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `request` event observed so far.
    pub fn request_events(&self) -> Vec<RequestEvent> {
        self.requests.lock().clone()
    }

    /// Every `response` event observed so far, with the error rendered to a
    /// string when the call failed.
    pub fn response_events(&self) -> Vec<(RequestEvent, Option<String>)> {
        self.responses.lock().clone()
    }

    /// Every sniff event observed so far: reason, discovered hosts, error.
    pub fn sniff_events(&self) -> Vec<(SniffReason, Vec<String>, Option<String>)> {
        self.sniffs.lock().clone()
    }
}

impl EventHandler for RecordingEventHandler {
    fn on_request(&self, event: &RequestEvent) {
        self.requests.lock().push(event.clone());
    }

    fn on_response(&self, event: &RequestEvent, error: Option<&Error>) {
        self.responses
            .lock()
            .push((event.clone(), error.map(ToString::to_string)));
    }

    fn on_sniff(&self, reason: SniffReason, hosts: &[String], error: Option<&Error>) {
        self.sniffs
            .lock()
            .push((reason, hosts.to_vec(), error.map(ToString::to_string)));
    }
}

#[async_trait::async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        match self.next_outcome(&request) {
            MockOutcome::Respond {
                status_code,
                headers,
                body,
            } => {
                let bytes = serde_json::to_vec(&body).map_err(Error::serialization)?;
                Ok(HttpResponse {
                    status_code,
                    headers,
                    body: Bytes::from(bytes),
                })
            }
            MockOutcome::ConnectionError => Err(Error::connection(format!(
                "connection refused: {}",
                request.url
            ))),
            MockOutcome::TimeoutError => Err(Error::timeout(format!(
                "deadline elapsed contacting {}",
                request.url
            ))),
            MockOutcome::Hang => {
                // Out-waits every realistic test deadline; the caller's
                // timeout or cancellation interrupts it first.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::timeout("mock hang expired".to_string()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http::Method;
    use serde_json::json;
    use url::Url;

    use super::*;

    fn request() -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            url: Url::parse("http://localhost:9200/").unwrap(),
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_script_is_fifo() {
        let client = MockHttpClient::with_script([
            MockOutcome::ConnectionError,
            MockOutcome::ok(json!({"acknowledged": true})),
        ]);

        assert!(client.send(request()).await.is_err());
        let response = client.send(request()).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_answers_ok() {
        let client = MockHttpClient::new();
        let response = client.send(request()).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.as_ref(), b"{}");
    }
}
