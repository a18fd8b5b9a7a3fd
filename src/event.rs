//! Lifecycle events and the observability hook.
//!
//! Every call emits a `request` event once, when the attempt sequence
//! starts, and a `response` event once, at final settlement, whatever the
//! outcome and however many attempts it took. Sniff rounds emit their own
//! event tagged with the trigger reason.

use http::HeaderMap;
use serde_json::Value;

use crate::connection::Connection;
use crate::error::Error;
use crate::request::{RequestOptions, RequestParams};
use crate::sniff::{SniffInfo, SniffReason};

/// Metadata carried by every lifecycle event.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Opaque caller context, verbatim from the request options.
    pub context: Option<Value>,
    /// Logical name of the transport instance.
    pub name: String,
    /// Correlation id of this call.
    pub request_id: String,
    /// The original request params.
    pub params: RequestParams,
    /// The original request options.
    pub options: RequestOptions,
    /// Connection used on the current/last attempt, when one was selected.
    pub connection: Option<Connection>,
    /// Attempts performed so far (0 in the `request` event).
    pub attempts: u32,
    /// Whether the caller aborted the request.
    pub aborted: bool,
    /// Outcome of a sniff round performed as part of this call, if any.
    pub sniff: Option<SniffInfo>,
}

/// Payload of the `request` and `response` lifecycle events.
///
/// The `request` event carries no response fields yet (`status_code` is
/// `None`, body is `Null`); the `response` event carries whatever the final
/// settlement produced.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Decoded response body, `Null` before a response exists.
    pub body: Value,
    /// Status code of the final response, `None` when the call never got
    /// one.
    pub status_code: Option<u16>,
    /// Headers of the final response.
    pub headers: Option<HeaderMap>,
    /// `Warning` headers from the node plus caller-supplied warnings.
    pub warnings: Vec<String>,
    /// Call metadata.
    pub meta: EventMeta,
}

/// Observability hook consumed by the transport.
///
/// All methods default to no-ops, so handlers implement only what they
/// observe. Handlers run inline on the request path and must not block.
pub trait EventHandler: Send + Sync {
    /// Called once per call, before the first attempt.
    fn on_request(&self, _event: &RequestEvent) {}

    /// Called once per call, at final settlement. `error` is `None` on
    /// success.
    fn on_response(&self, _event: &RequestEvent, _error: Option<&Error>) {}

    /// Called when a sniff round completes. `error` is `None` on success.
    fn on_sniff(&self, _reason: SniffReason, _hosts: &[String], _error: Option<&Error>) {}
}

/// Handler that ignores every event; the default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventHandler;

impl EventHandler for NoopEventHandler {}
