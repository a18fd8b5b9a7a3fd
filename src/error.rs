//! Error taxonomy for the transport layer.
//!
//! Every failure a caller can observe is one of the variants of [`Error`].
//! The retry loop in [`Transport`](crate::Transport) consults
//! [`Error::is_retriable`] to decide whether another node should be tried:
//! only transport-level failures ([`Error::Connection`] and
//! [`Error::Timeout`]) qualify. Everything else is terminal for the call.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

/// The error type for all transport operations.
///
/// ## Retriable vs Terminal
///
/// | Variant                | Retriable | Meaning                                  |
/// |------------------------|-----------|------------------------------------------|
/// | `Connection`           | Yes       | Socket-level failure reaching the node   |
/// | `Timeout`              | Yes       | Attempt exceeded its deadline            |
/// | `NoLivingConnections`  | No        | Pool had nothing eligible to try         |
/// | `Response`             | No        | Node answered with a non-2xx status      |
/// | `Serialization`        | No        | Request body could not be encoded        |
/// | `Deserialization`      | No        | Response body could not be decoded       |
/// | `Configuration`        | No        | Invalid construction-time configuration  |
/// | `RequestAborted`       | No        | Caller cancelled the in-flight request   |
///
/// Retriable errors additionally mark the connection they were observed on
/// as dead; payload errors never do (the fault is in the data, not the node).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Socket-level failure reaching a node (refused, reset, DNS, TLS).
    ///
    /// **Retriable.** The connection is marked dead and another node is tried.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the underlying transport failure.
        message: String,
    },

    /// The attempt exceeded its per-request deadline.
    ///
    /// **Retriable.** The node may be overloaded; it is marked dead and
    /// another node is tried.
    #[error("request timed out: {message}")]
    Timeout {
        /// Description of which deadline elapsed.
        message: String,
    },

    /// The pool had no eligible connection to hand out.
    ///
    /// **Terminal for this call.** Retrying against the same exhausted pool
    /// cannot help; a later sniff round may replenish the membership.
    #[error("no living connections available in the pool")]
    NoLivingConnections,

    /// The node returned a non-2xx status that was not in the caller's
    /// ignore list.
    ///
    /// **Terminal.** The node responded meaningfully, so the request is not
    /// replayed against another node.
    #[error("response error: status {status_code}")]
    Response {
        /// HTTP status code of the failing response.
        status_code: u16,
        /// Response headers as received.
        headers: HeaderMap,
        /// Parsed response body, when the node returned one.
        body: Value,
    },

    /// The request body could not be encoded into its wire format.
    ///
    /// **Terminal, never retried.** The request can never succeed until the
    /// caller fixes the payload.
    #[error("serialization error")]
    Serialization {
        /// The underlying encoder failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The response body could not be decoded.
    ///
    /// **Terminal, never retried.**
    #[error("deserialization error")]
    Deserialization {
        /// The underlying decoder failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Invalid construction-time configuration.
    ///
    /// Raised synchronously while building a [`Transport`](crate::Transport),
    /// never during a request.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong with the configuration.
        message: String,
    },

    /// The caller aborted the request while an attempt was in flight.
    ///
    /// **Terminal.** No further retries occur after an abort, and the
    /// connection in use is not marked dead (cancellation is not a
    /// node-health signal).
    #[error("request aborted by the caller")]
    RequestAborted,
}

impl Error {
    /// Returns `true` if the retry loop may try this request again on a
    /// different connection.
    ///
    /// Only transport-level failures qualify: the node never produced a
    /// meaningful answer, so another node may.
    #[inline]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Timeout { .. })
    }

    /// Returns `true` if this error should mark the connection it was
    /// observed on as dead.
    #[inline]
    pub(crate) fn marks_dead(&self) -> bool {
        self.is_retriable()
    }

    /// Returns the HTTP status code for [`Error::Response`], `None` otherwise.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Response { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Creates a connection error from a message.
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
        }
    }

    /// Creates a timeout error from a message.
    pub(crate) fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout {
            message: message.into(),
        }
    }

    /// Creates a configuration error from a message.
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Creates a serialization error from its cause.
    pub(crate) fn serialization(
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Serialization {
            source: Box::new(source),
        }
    }

    /// Creates a deserialization error from its cause.
    pub(crate) fn deserialization(
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Deserialization {
            source: Box::new(source),
        }
    }

    /// Builds a [`Error::Response`] from the raw parts of a response.
    ///
    /// The body is parsed as JSON when possible and carried verbatim as a
    /// string otherwise, so the caller always sees what the node sent.
    pub(crate) fn response(status_code: u16, headers: HeaderMap, raw_body: &Bytes) -> Self {
        let body = if raw_body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(raw_body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(raw_body).into_owned())
            })
        };
        Error::Response {
            status_code,
            headers,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(Error::connection("refused").is_retriable());
        assert!(Error::timeout("30s elapsed").is_retriable());
        assert!(!Error::NoLivingConnections.is_retriable());
        assert!(!Error::RequestAborted.is_retriable());
        assert!(!Error::configuration("bad").is_retriable());
        assert!(
            !Error::response(500, HeaderMap::new(), &Bytes::from_static(b"{}")).is_retriable()
        );
    }

    #[test]
    fn test_marks_dead_matches_retriable() {
        assert!(Error::connection("refused").marks_dead());
        assert!(Error::timeout("elapsed").marks_dead());
        assert!(!Error::RequestAborted.marks_dead());
    }

    #[test]
    fn test_response_error_parses_json_body() {
        let body = Bytes::from_static(br#"{"error":{"reason":"index missing"}}"#);
        let err = Error::response(404, HeaderMap::new(), &body);
        assert_eq!(err.status_code(), Some(404));
        let Error::Response { body, .. } = err else {
            unreachable!()
        };
        assert_eq!(body["error"]["reason"], "index missing");
    }

    #[test]
    fn test_response_error_keeps_non_json_body() {
        let body = Bytes::from_static(b"upstream unavailable");
        let err = Error::response(502, HeaderMap::new(), &body);
        let Error::Response { body, .. } = err else {
            unreachable!()
        };
        assert_eq!(body, Value::String("upstream unavailable".into()));
    }

    #[test]
    fn test_response_error_empty_body_is_null() {
        let err = Error::response(503, HeaderMap::new(), &Bytes::new());
        let Error::Response { body, .. } = err else {
            unreachable!()
        };
        assert_eq!(body, Value::Null);
    }

    #[test]
    fn test_display_format() {
        let err = Error::response(500, HeaderMap::new(), &Bytes::new());
        assert!(err.to_string().contains("500"));
        let err = Error::configuration("sniff endpoint must not be empty");
        assert!(err.to_string().contains("sniff endpoint"));
    }
}
