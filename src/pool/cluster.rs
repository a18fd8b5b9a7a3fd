//! Multi-node connection pool with quarantine and resurrection.

use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::selector::{NodeFilter, NodeSelector};
use super::ConnectionPool;
use crate::connection::{Connection, ConnectionSpec, ConnectionStatus, ResurrectBackoff};

/// Connection pool over the full cluster membership.
///
/// Holds every known node keyed by id. Dead nodes are quarantined until
/// their resurrection deadline elapses, with the quarantine growing
/// exponentially in the consecutive-failure count. Selection sees the alive
/// set plus resurrectable nodes; when that is empty, the dead node closest
/// to resurrection is promoted as a last resort so a struggling cluster
/// still gets one candidate per call.
pub struct ClusterPool {
    connections: Mutex<Vec<Connection>>,
    backoff: ResurrectBackoff,
}

impl fmt::Debug for ClusterPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connections = self.connections.lock();
        let alive = connections.iter().filter(|c| c.is_alive()).count();
        f.debug_struct("ClusterPool")
            .field("total", &connections.len())
            .field("alive", &alive)
            .finish()
    }
}

impl ClusterPool {
    /// Creates an empty pool with the default resurrection backoff.
    pub fn new() -> Self {
        Self::with_backoff(ResurrectBackoff::default())
    }

    /// Creates an empty pool with a custom resurrection backoff schedule.
    pub fn with_backoff(backoff: ResurrectBackoff) -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            backoff,
        }
    }

    /// Creates a pool seeded with the given node specs, all alive.
    pub fn from_specs(specs: impl IntoIterator<Item = ConnectionSpec>) -> Self {
        let pool = Self::new();
        for spec in specs {
            pool.add_connection(spec);
        }
        pool
    }
}

impl Default for ClusterPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool for ClusterPool {
    fn add_connection(&self, spec: ConnectionSpec) -> Connection {
        let mut connections = self.connections.lock();
        if let Some(existing) = connections.iter_mut().find(|c| c.id == spec.id) {
            // Same id, refreshed address/roles. Health state is preserved.
            existing.url = spec.url;
            existing.roles = spec.roles;
            return existing.clone();
        }
        let connection = Connection::from_spec(spec);
        connections.push(connection.clone());
        connection
    }

    fn remove_connection(&self, id: &str) {
        self.connections.lock().retain(|c| c.id != id);
    }

    fn mark_dead(&self, id: &str) {
        let mut connections = self.connections.lock();
        if let Some(conn) = connections.iter_mut().find(|c| c.id == id) {
            conn.mark_dead(Instant::now(), &self.backoff);
            warn!(
                node = %conn.id,
                failures = conn.failures,
                "marking connection dead"
            );
        }
    }

    fn mark_alive(&self, id: &str) {
        let mut connections = self.connections.lock();
        if let Some(conn) = connections.iter_mut().find(|c| c.id == id) {
            if !conn.is_alive() {
                debug!(node = %conn.id, "marking connection alive");
            }
            conn.mark_alive();
        }
    }

    fn get_connection(&self, filter: &NodeFilter, selector: &NodeSelector) -> Option<Connection> {
        let now = Instant::now();
        // Filter and selector are caller-supplied closures: they run on a
        // snapshot, outside the lock, so they may inspect this pool freely.
        let snapshot: Vec<Connection> = self.connections.lock().clone();

        let mut eligible: Vec<Connection> = snapshot
            .iter()
            .filter(|c| (c.is_alive() || c.is_resurrectable(now)) && filter.accepts(c))
            .cloned()
            .collect();

        if eligible.is_empty() {
            // Last resort: promote the dead connection closest to its
            // resurrection deadline, even if the deadline has not elapsed.
            let candidate = snapshot
                .iter()
                .filter(|c| c.status == ConnectionStatus::Dead && filter.accepts(c))
                .min_by_key(|c| c.resurrect_at)?
                .clone();
            debug!(node = %candidate.id, "promoting dead connection as a last resort");
            eligible.push(candidate);
        }

        let chosen_idx = selector.select(&eligible);
        let chosen_id = eligible[chosen_idx].id.clone();

        let mut connections = self.connections.lock();
        let Some(conn) = connections.iter_mut().find(|c| c.id == chosen_id) else {
            // Membership changed between snapshot and commit; the chosen
            // node was dropped. Hand out the snapshot copy this one time.
            return Some(eligible.swap_remove(chosen_idx));
        };
        // A selected dead connection becomes alive-for-selection. Its
        // failure count is kept: only a successful round trip resets it.
        if conn.status == ConnectionStatus::Dead {
            conn.status = ConnectionStatus::Alive;
            conn.resurrect_at = None;
            debug!(node = %conn.id, failures = conn.failures, "resurrecting connection");
        }
        conn.last_selected = Some(now);
        Some(conn.clone())
    }

    fn update(&self, specs: Vec<ConnectionSpec>) {
        let mut connections = self.connections.lock();
        let mut next = Vec::with_capacity(specs.len());
        for spec in specs {
            match connections.iter().position(|c| c.id == spec.id) {
                // Surviving node: carry its health state over.
                Some(idx) => {
                    let mut existing = connections.swap_remove(idx);
                    existing.url = spec.url;
                    existing.roles = spec.roles;
                    next.push(existing);
                }
                None => next.push(Connection::from_spec(spec)),
            }
        }
        debug!(
            added_or_kept = next.len(),
            dropped = connections.len(),
            "replacing pool membership"
        );
        *connections = next;
    }

    fn connections(&self) -> Vec<Connection> {
        self.connections.lock().clone()
    }
}
