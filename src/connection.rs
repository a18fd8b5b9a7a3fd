//! Cluster node endpoints and their health state.
//!
//! A [`Connection`] represents one addressable node of the cluster plus the
//! mutable health bookkeeping the pool needs: alive/dead status, a
//! consecutive-failure count, and the deadline after which a dead node
//! becomes eligible for resurrection.

use std::time::{Duration, Instant};

use url::Url;

/// Health classification of a connection, based on recent transport
/// success/failure rather than cluster-reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// The node answered its most recent request.
    #[default]
    Alive,
    /// The node failed at the transport level and is quarantined until its
    /// resurrection deadline elapses.
    Dead,
}

/// Roles a node declares in the cluster, used for node filtering.
///
/// The default filter excludes nodes that are master-eligible but hold no
/// data and cannot ingest: such nodes coordinate the cluster and should not
/// serve client traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRoles {
    /// The node can hold and serve data.
    pub data: bool,
    /// The node is eligible to be elected master.
    pub master: bool,
    /// The node can run ingest pipelines.
    pub ingest: bool,
}

impl Default for NodeRoles {
    fn default() -> Self {
        Self {
            data: true,
            master: true,
            ingest: true,
        }
    }
}

impl NodeRoles {
    /// Returns `true` for dedicated master nodes, which the default node
    /// filter excludes from selection.
    pub fn is_master_only(&self) -> bool {
        self.master && !self.data && !self.ingest
    }
}

/// Immutable description of a node endpoint, used to create or update a
/// [`Connection`] in the pool.
///
/// Specs come from two places: static configuration at client construction,
/// and sniff rounds that discover the live cluster membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    /// Stable identifier, unique within a pool. Sniffed nodes use the
    /// cluster-assigned node id; statically configured nodes use their URL.
    pub id: String,
    /// Base URL of the node's HTTP endpoint.
    pub url: Url,
    /// Declared roles, used by node filters.
    pub roles: NodeRoles,
}

impl ConnectionSpec {
    /// Creates a spec with default roles, using the URL itself as the id.
    pub fn new(url: Url) -> Self {
        Self {
            id: url.to_string(),
            url,
            roles: NodeRoles::default(),
        }
    }

    /// Sets the node id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the declared roles.
    #[must_use]
    pub fn with_roles(mut self, roles: NodeRoles) -> Self {
        self.roles = roles;
        self
    }
}

/// One addressable cluster node plus its health state.
///
/// Connections are created and owned by a pool; the transport only ever
/// observes snapshots handed out by selection. Health transitions go through
/// the pool's `mark_dead`/`mark_alive`, never through the connection
/// directly.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Stable identifier, unique within the owning pool.
    pub id: String,
    /// Base URL of the node's HTTP endpoint.
    pub url: Url,
    /// Declared roles, used by node filters.
    pub roles: NodeRoles,
    /// Current health classification.
    pub status: ConnectionStatus,
    /// Consecutive transport failures since the last success.
    pub failures: u32,
    /// When a dead connection becomes eligible for resurrection. `None`
    /// while alive.
    pub resurrect_at: Option<Instant>,
    /// When this connection was last handed out by selection. Drives the
    /// least-recently-selected round-robin tie-break.
    pub(crate) last_selected: Option<Instant>,
}

impl Connection {
    /// Creates an alive connection from a spec.
    pub fn from_spec(spec: ConnectionSpec) -> Self {
        Self {
            id: spec.id,
            url: spec.url,
            roles: spec.roles,
            status: ConnectionStatus::Alive,
            failures: 0,
            resurrect_at: None,
            last_selected: None,
        }
    }

    /// Returns `true` if the connection is currently alive.
    pub fn is_alive(&self) -> bool {
        self.status == ConnectionStatus::Alive
    }

    /// Returns `true` if the connection is dead but its resurrection
    /// deadline has elapsed, making it eligible for selection again.
    pub fn is_resurrectable(&self, now: Instant) -> bool {
        self.status == ConnectionStatus::Dead
            && self.resurrect_at.is_some_and(|deadline| deadline <= now)
    }

    /// Transitions to dead, incrementing the failure count and computing the
    /// resurrection deadline from the backoff schedule.
    pub(crate) fn mark_dead(&mut self, now: Instant, backoff: &ResurrectBackoff) {
        self.status = ConnectionStatus::Dead;
        self.failures = self.failures.saturating_add(1);
        self.resurrect_at = Some(now + backoff.delay_for_failures(self.failures));
    }

    /// Transitions to alive after a successful round trip, resetting the
    /// failure count.
    pub(crate) fn mark_alive(&mut self) {
        self.status = ConnectionStatus::Alive;
        self.failures = 0;
        self.resurrect_at = None;
    }

    /// Returns the spec equivalent of this connection, ignoring health.
    pub fn spec(&self) -> ConnectionSpec {
        ConnectionSpec {
            id: self.id.clone(),
            url: self.url.clone(),
            roles: self.roles,
        }
    }
}

/// Exponential backoff schedule for dead-node resurrection.
///
/// The quarantine grows with the consecutive failure count,
/// `base * 2^(failures - 1)`, capped at a fixed ceiling.
#[derive(Debug, Clone)]
pub struct ResurrectBackoff {
    /// Quarantine after the first failure.
    pub base: Duration,
    /// Upper bound on the quarantine regardless of failure count.
    pub ceiling: Duration,
}

impl Default for ResurrectBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            ceiling: Duration::from_secs(30 * 60),
        }
    }
}

impl ResurrectBackoff {
    /// Computes the quarantine duration for a given consecutive-failure
    /// count. Monotonic in `failures`, capped at the ceiling.
    pub fn delay_for_failures(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self.base.saturating_mul(1u32 << exponent);
        delay.min(self.ceiling)
    }
}
