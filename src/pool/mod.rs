//! Connection pools: node selection, dead-node quarantine, and resurrection.
//!
//! Two implementations share one contract:
//! - [`ClusterPool`]: multi-node pool with round-robin selection, exponential
//!   resurrection backoff, and wholesale membership replacement from sniff
//!   rounds.
//! - [`SingleNodePool`]: for managed/cloud deployments fronted by a single
//!   endpoint, where selection and resurrection logic would only get in the
//!   way.

mod cluster;
mod selector;
mod single;

use std::fmt;

pub use cluster::ClusterPool;
pub use selector::{NodeFilter, NodeFilterFn, NodeSelector, NodeSelectorFn};
pub use single::SingleNodePool;

use crate::connection::{Connection, ConnectionSpec};

/// Contract shared by every connection pool.
///
/// All operations take `&self`: pools guard their state internally so that
/// overlapping logical requests can mutate health fields without external
/// locking. Membership and health change only through these operations.
pub trait ConnectionPool: Send + Sync + fmt::Debug {
    /// Inserts or updates a connection by id, returning the stored
    /// connection. Idempotent on an identical spec.
    fn add_connection(&self, spec: ConnectionSpec) -> Connection;

    /// Removes a connection by id. No-op if absent.
    fn remove_connection(&self, id: &str);

    /// Transitions a connection to dead, incrementing its failure count and
    /// scheduling its resurrection deadline.
    fn mark_dead(&self, id: &str);

    /// Resets a connection to alive with a zero failure count after a
    /// successful round trip.
    fn mark_alive(&self, id: &str);

    /// Returns one connection chosen from the alive set plus any dead
    /// connections whose resurrection deadline has elapsed. When nothing is
    /// eligible, the dead connection with the earliest deadline is promoted
    /// as a last resort. `None` only when the pool has no candidate at all.
    fn get_connection(&self, filter: &NodeFilter, selector: &NodeSelector) -> Option<Connection>;

    /// Wholesale membership replacement, used by sniff rounds. Connections
    /// present in both old and new sets keep their health state; absent ones
    /// are dropped; new ones join alive.
    fn update(&self, specs: Vec<ConnectionSpec>);

    /// Snapshot of every connection in the pool.
    fn connections(&self) -> Vec<Connection>;

    /// Returns `true` if the pool holds no connections.
    fn is_empty(&self) -> bool {
        self.connections().is_empty()
    }
}
