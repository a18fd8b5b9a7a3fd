//! # Findex Transport
//!
//! HTTP transport layer for Findex search cluster clients.
//!
//! This crate turns a logical request (method, path, body, query string)
//! into a reliable call against one of several cluster nodes, transparently
//! handling node failure, topology changes, retries, and compression, while
//! exposing observability hooks and cancellation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use findex_transport::{RequestOptions, RequestParams, Transport};
//! use http::Method;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), findex_transport::Error> {
//!     let transport = Transport::builder()
//!         .node("http://10.0.0.1:9200")?
//!         .node("http://10.0.0.2:9200")?
//!         .sniff_on_start(true)
//!         .build()?;
//!
//!     let params = RequestParams::new(Method::POST, "/articles/_search")
//!         .with_body(json!({"query": {"match_all": {}}}));
//!     let response = transport.request(params, RequestOptions::new()).await?;
//!     println!("hits: {}", response.body["hits"]["total"]["value"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Key Concepts
//!
//! - **Connection pool**: every known node plus its health state. Failed
//!   nodes are quarantined with exponential backoff and resurrected after
//!   their deadline.
//! - **Sniffing**: querying the cluster for its current node membership to
//!   keep the pool accurate, on start, on an interval, or on connection
//!   fault.
//! - **Retries**: transport-level failures are retried on other nodes up to
//!   `max_retries`; anything the node actually answered is terminal. Retries
//!   may apply a mutating request more than once; exactly-once delivery is
//!   out of scope.
//! - **Capabilities**: the HTTP stack, the body codec, and the event sink
//!   are traits ([`HttpClient`], [`Serializer`], [`EventHandler`]) so every
//!   piece can be swapped or mocked.
//!
//! ## Features
//!
//! - `rustls` (default): use rustls for TLS
//! - `native-tls`: use native TLS (OpenSSL on Linux, Secure Transport on
//!   macOS)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

// Core modules
pub mod connection;
pub mod error;
pub mod event;
pub mod http;
pub mod pool;
pub mod request;
pub mod serializer;
pub mod sniff;
pub mod transport;

// Testing utilities
pub mod testing;

mod user_agent;

// Re-export main types at crate root for convenience
pub use connection::{
    Connection, ConnectionSpec, ConnectionStatus, NodeRoles, ResurrectBackoff,
};
pub use error::Error;
pub use event::{EventHandler, EventMeta, NoopEventHandler, RequestEvent};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use pool::{ClusterPool, ConnectionPool, NodeFilter, NodeSelector, SingleNodePool};
pub use request::{RequestOptions, RequestParams};
pub use serializer::{BodyContentType, JsonSerializer, Serializer};
pub use sniff::{SniffInfo, SniffReason, DEFAULT_SNIFF_ENDPOINT};
pub use transport::{Compression, Response, Transport, TransportBuilder};
