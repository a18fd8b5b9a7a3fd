//! End-to-end transport behavior against the in-memory HTTP client:
//! retries, quarantine, events, sniffing, and cancellation.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use findex_transport::testing::{MockHttpClient, MockOutcome, RecordingEventHandler};
use findex_transport::{
    ClusterPool, Compression, Error, RequestOptions, RequestParams, SniffReason, Transport,
    TransportBuilder,
};

/// Honors `RUST_LOG` when set, so failing runs can be replayed with the
/// transport's tracing output visible.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn two_node_builder(mock: &Arc<MockHttpClient>) -> TransportBuilder {
    init_tracing();
    Transport::builder()
        .node("http://node-a:9200")
        .unwrap()
        .node("http://node-b:9200")
        .unwrap()
        .http_client(Arc::clone(mock) as Arc<dyn findex_transport::HttpClient>)
}

fn search_params() -> RequestParams {
    RequestParams::new(Method::POST, "/articles/_search")
        .with_body(json!({"query": {"match_all": {}}}))
}

fn nodes_body() -> serde_json::Value {
    json!({
        "nodes": {
            "sniffed-a": {
                "http": {"publish_address": "10.0.0.8:9200"},
                "roles": ["data", "ingest"]
            },
            "sniffed-b": {
                "http": {"publish_address": "10.0.0.9:9200"},
                "roles": ["data"]
            }
        }
    })
}

/// Polls until `check` passes, yielding to spawned tasks in between.
async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_failover_marks_dead_and_retries_on_next_node() {
    let mock = Arc::new(MockHttpClient::with_script([
        MockOutcome::ConnectionError,
        MockOutcome::ok(json!({"took": 3})),
    ]));
    let transport = two_node_builder(&mock).build().unwrap();

    let response = transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body["took"], 3);
    assert_eq!(response.meta.attempts, 2);
    assert_eq!(mock.request_count(), 2);

    // The failed node is quarantined; the one that answered is alive.
    let connections = transport.connections();
    let dead: Vec<_> = connections.iter().filter(|c| !c.is_alive()).collect();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].resurrect_at.is_some());
}

#[tokio::test]
async fn test_max_retries_zero_gives_single_attempt() {
    let mock = Arc::new(MockHttpClient::with_script([MockOutcome::ConnectionError]));
    let transport = two_node_builder(&mock).max_retries(0).build().unwrap();

    let err = transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_attempts_bounded_by_max_retries_plus_one() {
    let mock = Arc::new(MockHttpClient::with_script([
        MockOutcome::ConnectionError,
        MockOutcome::ConnectionError,
        MockOutcome::ConnectionError,
        MockOutcome::ConnectionError,
        MockOutcome::ConnectionError,
    ]));
    let handler = Arc::new(RecordingEventHandler::new());
    let transport = two_node_builder(&mock)
        .max_retries(3)
        .event_handler(Arc::clone(&handler) as Arc<dyn findex_transport::EventHandler>)
        .build()
        .unwrap();

    let err = transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(mock.request_count(), 4);
    let responses = handler.response_events();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0.meta.attempts, 4);
}

#[tokio::test]
async fn test_empty_pool_settles_without_sending() {
    let mock = Arc::new(MockHttpClient::new());
    let handler = Arc::new(RecordingEventHandler::new());
    let transport = Transport::builder()
        .pool(Arc::new(ClusterPool::new()))
        .http_client(Arc::clone(&mock) as Arc<dyn findex_transport::HttpClient>)
        .event_handler(Arc::clone(&handler) as Arc<dyn findex_transport::EventHandler>)
        .build()
        .unwrap();

    let err = transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoLivingConnections));
    assert_eq!(mock.request_count(), 0);
    let responses = handler.response_events();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0.meta.attempts, 0);
}

#[tokio::test]
async fn test_response_error_is_terminal_and_keeps_node_alive() {
    let mock = Arc::new(MockHttpClient::with_script([MockOutcome::status(
        500,
        json!({"error": {"reason": "shard failure"}}),
    )]));
    let transport = two_node_builder(&mock).build().unwrap();

    let err = transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap_err();

    let Error::Response {
        status_code, body, ..
    } = err
    else {
        unreachable!()
    };
    assert_eq!(status_code, 500);
    assert_eq!(body["error"]["reason"], "shard failure");
    // Not retried: the node answered, so it is healthy at the transport
    // level.
    assert_eq!(mock.request_count(), 1);
    assert!(transport.connections().iter().all(|c| c.is_alive()));
}

#[tokio::test]
async fn test_ignored_status_resolves_successfully() {
    let mock = Arc::new(MockHttpClient::with_script([MockOutcome::status(
        404,
        json!({"found": false}),
    )]));
    let transport = two_node_builder(&mock).build().unwrap();

    let response = transport
        .request(
            RequestParams::new(Method::GET, "/articles/_doc/1"),
            RequestOptions::new().with_ignore([404]),
        )
        .await
        .unwrap();

    assert_eq!(response.status_code, 404);
    assert_eq!(response.body["found"], false);
}

#[tokio::test]
async fn test_timeout_marks_node_dead() {
    let mock = Arc::new(MockHttpClient::with_script([MockOutcome::Hang]));
    let transport = two_node_builder(&mock)
        .max_retries(0)
        .request_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    assert!(err.is_retriable());
    assert_eq!(
        transport.connections().iter().filter(|c| !c.is_alive()).count(),
        1
    );
}

#[tokio::test]
async fn test_abort_settles_once_without_penalizing_node() {
    let mock = Arc::new(MockHttpClient::with_script([MockOutcome::Hang]));
    let handler = Arc::new(RecordingEventHandler::new());
    let transport = two_node_builder(&mock)
        .event_handler(Arc::clone(&handler) as Arc<dyn findex_transport::EventHandler>)
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = transport
        .request(
            search_params(),
            RequestOptions::new().with_cancellation(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RequestAborted));
    assert!(!err.is_retriable());
    assert_eq!(mock.request_count(), 1);
    // Cancellation is a caller decision, not a node failure.
    assert!(transport.connections().iter().all(|c| c.is_alive()));

    let responses = handler.response_events();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].0.meta.aborted);
}

#[tokio::test]
async fn test_request_and_response_events_fire_exactly_once_with_retries() {
    let mock = Arc::new(MockHttpClient::with_script([
        MockOutcome::ConnectionError,
        MockOutcome::ok(json!({"took": 1})),
    ]));
    let handler = Arc::new(RecordingEventHandler::new());
    let transport = two_node_builder(&mock)
        .event_handler(Arc::clone(&handler) as Arc<dyn findex_transport::EventHandler>)
        .build()
        .unwrap();

    transport
        .request(
            search_params(),
            RequestOptions::new().with_context(json!({"tenant": "t1"})),
        )
        .await
        .unwrap();

    let requests = handler.request_events();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].meta.attempts, 0);
    assert_eq!(requests[0].status_code, None);

    let responses = handler.response_events();
    assert_eq!(responses.len(), 1);
    let (event, error) = &responses[0];
    assert!(error.is_none());
    assert_eq!(event.status_code, Some(200));
    assert_eq!(event.meta.attempts, 2);
    // Caller context comes back verbatim.
    assert_eq!(event.meta.context, Some(json!({"tenant": "t1"})));
    // Both events share the correlation id.
    assert_eq!(requests[0].meta.request_id, event.meta.request_id);
}

#[tokio::test]
async fn test_gzip_compresses_body_and_sets_headers() {
    use std::io::Read;

    let mock = Arc::new(MockHttpClient::new());
    let transport = two_node_builder(&mock)
        .compression(Compression::Gzip)
        .build()
        .unwrap();

    let body = json!({"query": {"term": {"user": "kim"}}});
    transport
        .request(
            RequestParams::new(Method::POST, "/articles/_search").with_body(body.clone()),
            RequestOptions::new(),
        )
        .await
        .unwrap();

    let sent = mock.requests().pop().unwrap();
    assert_eq!(
        sent.headers.get(http::header::CONTENT_ENCODING).unwrap(),
        "gzip"
    );
    assert_eq!(
        sent.headers.get(http::header::ACCEPT_ENCODING).unwrap(),
        "gzip"
    );

    let compressed = sent.body.unwrap();
    let mut decoder = flate2::read::GzDecoder::new(compressed.as_ref());
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    let round_tripped: serde_json::Value = serde_json::from_slice(&decompressed).unwrap();
    assert_eq!(round_tripped, body);
}

#[tokio::test]
async fn test_bulk_body_is_ndjson() {
    let mock = Arc::new(MockHttpClient::new());
    let transport = two_node_builder(&mock).build().unwrap();

    transport
        .request(
            RequestParams::new(Method::POST, "/_bulk").with_bulk_body(vec![
                json!({"index": {"_id": "1"}}),
                json!({"title": "hello"}),
            ]),
            RequestOptions::new(),
        )
        .await
        .unwrap();

    let sent = mock.requests().pop().unwrap();
    assert_eq!(
        sent.headers.get(http::header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );
    let body = sent.body.unwrap();
    let text = std::str::from_utf8(&body).unwrap();
    assert_eq!(text, "{\"index\":{\"_id\":\"1\"}}\n{\"title\":\"hello\"}\n");
}

#[tokio::test]
async fn test_explicit_sniff_replaces_pool_membership() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route("/_nodes", [MockOutcome::ok(nodes_body())]);
    let transport = two_node_builder(&mock).build().unwrap();

    let specs = transport.sniff(SniffReason::Default).await.unwrap().unwrap();
    assert_eq!(specs.len(), 2);

    let mut ids: Vec<_> = transport.connections().into_iter().map(|c| c.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["sniffed-a", "sniffed-b"]);
}

#[tokio::test]
async fn test_sniff_on_start_runs_once_with_its_reason() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route("/_nodes", [MockOutcome::ok(nodes_body())]);
    let handler = Arc::new(RecordingEventHandler::new());
    let transport = two_node_builder(&mock)
        .sniff_on_start(true)
        .event_handler(Arc::clone(&handler) as Arc<dyn findex_transport::EventHandler>)
        .build()
        .unwrap();

    transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap();

    wait_for(|| !handler.sniff_events().is_empty()).await;
    let sniffs = handler.sniff_events();
    assert_eq!(sniffs[0].0, SniffReason::SniffOnStart);
    assert_eq!(sniffs[0].1.len(), 2);
    assert!(sniffs[0].2.is_none());

    // The trigger is one-shot: further requests do not sniff again.
    transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        handler
            .sniff_events()
            .iter()
            .filter(|(reason, _, _)| *reason == SniffReason::SniffOnStart)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_connection_fault_triggers_sniff() {
    let mock = Arc::new(MockHttpClient::with_script([
        MockOutcome::ConnectionError,
        MockOutcome::ok(json!({"took": 2})),
    ]));
    mock.route("/_nodes", [MockOutcome::ok(nodes_body())]);
    let handler = Arc::new(RecordingEventHandler::new());
    let transport = two_node_builder(&mock)
        .sniff_on_connection_fault(true)
        .event_handler(Arc::clone(&handler) as Arc<dyn findex_transport::EventHandler>)
        .build()
        .unwrap();

    transport
        .request(search_params(), RequestOptions::new())
        .await
        .unwrap();

    wait_for(|| !handler.sniff_events().is_empty()).await;
    let sniffs = handler.sniff_events();
    assert_eq!(sniffs[0].0, SniffReason::SniffOnConnectionFault);
    assert!(sniffs[0].2.is_none());
}

#[tokio::test]
async fn test_concurrent_sniff_trigger_is_dropped() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route("/_nodes", [MockOutcome::Hang, MockOutcome::ok(nodes_body())]);
    let transport = two_node_builder(&mock).build().unwrap();

    let in_flight = transport.clone();
    let first = tokio::spawn(async move { in_flight.sniff(SniffReason::Default).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The first round is still hanging; the second trigger is dropped.
    let second = transport.sniff(SniffReason::Default).await.unwrap();
    assert!(second.is_none());
    first.abort();
}

#[tokio::test]
async fn test_dropped_sniff_future_releases_the_guard() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route("/_nodes", [MockOutcome::Hang, MockOutcome::ok(nodes_body())]);
    let transport = two_node_builder(&mock).build().unwrap();

    let hanging = transport.clone();
    let task = tokio::spawn(async move { hanging.sniff(SniffReason::Default).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    task.abort();
    let _ = task.await;

    // The aborted round released the in-flight guard, so a fresh trigger
    // runs instead of being dropped.
    let specs = transport.sniff(SniffReason::Default).await.unwrap();
    assert!(specs.is_some());
}

#[tokio::test]
async fn test_failed_sniff_leaves_pool_untouched() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route("/_nodes", [MockOutcome::ok(json!({"unexpected": true}))]);
    let handler = Arc::new(RecordingEventHandler::new());
    let transport = two_node_builder(&mock)
        .event_handler(Arc::clone(&handler) as Arc<dyn findex_transport::EventHandler>)
        .build()
        .unwrap();

    let err = transport.sniff(SniffReason::Default).await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }));

    let sniffs = handler.sniff_events();
    assert_eq!(sniffs.len(), 1);
    assert!(sniffs[0].2.is_some());

    let mut ids: Vec<_> = transport.connections().into_iter().map(|c| c.id).collect();
    ids.sort();
    assert_eq!(ids.len(), 2);
    assert!(ids[0].contains("node-a"));
}

#[tokio::test]
async fn test_as_stream_skips_decoding() {
    let mock = Arc::new(MockHttpClient::with_script([MockOutcome::ok(
        json!({"hits": []}),
    )]));
    let transport = two_node_builder(&mock).build().unwrap();

    let response = transport
        .request(search_params(), RequestOptions::new().with_as_stream(true))
        .await
        .unwrap();

    assert_eq!(response.body, serde_json::Value::Null);
    assert_eq!(response.raw_body.as_ref(), br#"{"hits":[]}"#);
}

#[tokio::test]
async fn test_per_call_headers_override_static_headers() {
    let mut static_headers = http::HeaderMap::new();
    static_headers.insert(
        http::header::AUTHORIZATION,
        http::HeaderValue::from_static("ApiKey default"),
    );
    let mock = Arc::new(MockHttpClient::new());
    let transport = two_node_builder(&mock).headers(static_headers).build().unwrap();

    let mut options = RequestOptions::new();
    options.headers.insert(
        http::header::AUTHORIZATION,
        http::HeaderValue::from_static("ApiKey per-call"),
    );
    transport.request(search_params(), options).await.unwrap();

    let sent = mock.requests().pop().unwrap();
    assert_eq!(
        sent.headers.get(http::header::AUTHORIZATION).unwrap(),
        "ApiKey per-call"
    );
}

#[tokio::test]
async fn test_repeated_per_call_headers_all_sent() {
    let mock = Arc::new(MockHttpClient::new());
    let transport = two_node_builder(&mock).build().unwrap();

    let mut options = RequestOptions::new();
    options
        .headers
        .append("x-findex-tag", http::HeaderValue::from_static("alpha"));
    options
        .headers
        .append("x-findex-tag", http::HeaderValue::from_static("beta"));
    transport.request(search_params(), options).await.unwrap();

    let sent = mock.requests().pop().unwrap();
    let values: Vec<_> = sent
        .headers
        .get_all("x-findex-tag")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(values, ["alpha", "beta"]);
}
