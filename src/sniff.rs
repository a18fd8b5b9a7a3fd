//! Cluster topology discovery.
//!
//! A sniff round asks one node for the current cluster membership and
//! replaces the pool's member set with the answer. The request itself goes
//! through the ordinary transport machinery; this module owns the trigger
//! reasons and the parsing of node descriptors out of the introspection
//! response.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::connection::{ConnectionSpec, NodeRoles};
use crate::error::Error;

/// Default path of the topology introspection endpoint.
pub const DEFAULT_SNIFF_ENDPOINT: &str = "/_nodes/_all/http";

/// Why a sniff round was triggered. Carried in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffReason {
    /// The one-time sniff performed when the client starts.
    SniffOnStart,
    /// The periodic interval elapsed.
    SniffInterval,
    /// A connection was just marked dead.
    SniffOnConnectionFault,
    /// An explicit caller-requested sniff.
    Default,
}

impl SniffReason {
    /// Stable string form, used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SniffReason::SniffOnStart => "sniff-on-start",
            SniffReason::SniffInterval => "sniff-interval",
            SniffReason::SniffOnConnectionFault => "sniff-on-connection-fault",
            SniffReason::Default => "default",
        }
    }
}

impl fmt::Display for SniffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed sniff round, attached to the metadata of the call
/// that triggered it.
#[derive(Debug, Clone)]
pub struct SniffInfo {
    /// URLs of the discovered nodes.
    pub hosts: Vec<String>,
    /// What triggered the round.
    pub reason: SniffReason,
}

/// Shape of the introspection response: a map of node id to descriptor.
#[derive(Debug, Deserialize)]
struct NodesResponse {
    nodes: HashMap<String, NodeDescriptor>,
}

#[derive(Debug, Deserialize)]
struct NodeDescriptor {
    http: Option<NodeHttp>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NodeHttp {
    publish_address: Option<String>,
}

/// Parses the introspection response body into connection specs.
///
/// Nodes without a published HTTP address are skipped: they exist in the
/// cluster but cannot serve this client. The scheme of the sniffing
/// connection is reused for the discovered nodes, since the response only
/// carries host and port.
pub(crate) fn parse_node_descriptors(body: &Value, scheme: &str) -> Result<Vec<ConnectionSpec>, Error> {
    let response: NodesResponse =
        serde_json::from_value(body.clone()).map_err(Error::deserialization)?;

    let mut specs = Vec::with_capacity(response.nodes.len());
    for (id, descriptor) in response.nodes {
        let Some(address) = descriptor.http.and_then(|h| h.publish_address) else {
            continue;
        };
        let url = publish_address_to_url(&address, scheme)?;
        specs.push(
            ConnectionSpec::new(url)
                .with_id(id)
                .with_roles(parse_roles(&descriptor.roles)),
        );
    }
    // Deterministic order regardless of map iteration.
    specs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(specs)
}

/// Converts a `publish_address` into a URL.
///
/// Two forms exist on the wire: `ip:port` and `hostname/ip:port`. The
/// second advertises a hostname, which is preferred over the raw address.
fn publish_address_to_url(address: &str, scheme: &str) -> Result<Url, Error> {
    let authority = match address.split_once('/') {
        Some((hostname, ip_and_port)) => {
            let port = ip_and_port.rsplit_once(':').map(|(_, port)| port);
            match port {
                Some(port) => format!("{hostname}:{port}"),
                None => hostname.to_string(),
            }
        }
        None => address.to_string(),
    };
    Url::parse(&format!("{scheme}://{authority}"))
        .map_err(Error::deserialization)
}

/// Maps the cluster's role strings onto [`NodeRoles`]. Data tiers
/// (`data_hot`, `data_warm`, ...) all count as data-capable.
fn parse_roles(roles: &[String]) -> NodeRoles {
    if roles.is_empty() {
        return NodeRoles::default();
    }
    NodeRoles {
        data: roles.iter().any(|r| r == "data" || r.starts_with("data_")),
        master: roles.iter().any(|r| r == "master"),
        ingest: roles.iter().any(|r| r == "ingest"),
    }
}
