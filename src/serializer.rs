//! Body (de)serialization capability.
//!
//! The transport never touches serde directly: it goes through the
//! [`Serializer`] trait so callers can swap the codec. The default
//! [`JsonSerializer`] encodes plain bodies as JSON and bulk bodies as
//! newline-delimited JSON, matching the cluster's `_bulk` wire format.

use bytes::Bytes;
use serde_json::Value;

use crate::error::Error;

/// Content type of a serialized request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyContentType {
    /// `application/json`
    Json,
    /// `application/x-ndjson` (bulk bodies)
    NdJson,
}

impl BodyContentType {
    /// The header value for this content type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyContentType::Json => "application/json",
            BodyContentType::NdJson => "application/x-ndjson",
        }
    }
}

/// Encodes request bodies to their wire format and decodes response bodies.
///
/// Both directions may fail; encoding failures surface as
/// [`Error::Serialization`] and are never retried, decoding failures as
/// [`Error::Deserialization`].
pub trait Serializer: Send + Sync {
    /// Serializes a request body.
    fn serialize(&self, body: &Value) -> Result<Bytes, Error>;

    /// Serializes a bulk body: one JSON document per line, trailing newline
    /// included.
    fn serialize_bulk(&self, lines: &[Value]) -> Result<Bytes, Error>;

    /// Deserializes a response body.
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error>;
}

/// Default serde_json-backed serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, body: &Value) -> Result<Bytes, Error> {
        serde_json::to_vec(body)
            .map(Bytes::from)
            .map_err(Error::serialization)
    }

    fn serialize_bulk(&self, lines: &[Value]) -> Result<Bytes, Error> {
        let mut out = Vec::new();
        for line in lines {
            serde_json::to_writer(&mut out, line)
                .map_err(Error::serialization)?;
            out.push(b'\n');
        }
        Ok(Bytes::from(out))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, Error> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(Error::deserialization)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_json_body() {
        let body = json!({"query": {"match_all": {}}});
        let bytes = JsonSerializer.serialize(&body).unwrap();
        assert_eq!(
            bytes.as_ref(),
            br#"{"query":{"match_all":{}}}"#
        );
    }

    #[test]
    fn test_serialize_bulk_is_ndjson() {
        let lines = vec![json!({"index": {"_id": "1"}}), json!({"title": "doc"})];
        let bytes = JsonSerializer.serialize_bulk(&lines).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text, "{\"index\":{\"_id\":\"1\"}}\n{\"title\":\"doc\"}\n");
    }

    #[test]
    fn test_deserialize_empty_body_is_null() {
        assert_eq!(JsonSerializer.deserialize(b"").unwrap(), Value::Null);
    }

    #[test]
    fn test_deserialize_failure_is_classified() {
        let err = JsonSerializer.deserialize(b"not-json").unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
        assert!(!err.is_retriable());
    }

    proptest! {
        // Round-trip property of the serializer contract: serialize then
        // deserialize yields an equal value.
        #[test]
        fn prop_serialize_roundtrip(entries in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6)) {
            let body = Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            );
            let bytes = JsonSerializer.serialize(&body).unwrap();
            let back = JsonSerializer.deserialize(&bytes).unwrap();
            prop_assert_eq!(body, back);
        }
    }
}
