//! Single-endpoint pool for managed/cloud deployments.

use std::fmt;

use parking_lot::Mutex;

use super::selector::{NodeFilter, NodeSelector};
use super::ConnectionPool;
use crate::connection::{Connection, ConnectionSpec};

/// Pool variant fronted by a single endpoint (a load balancer or managed
/// cluster URL).
///
/// Selection always returns the one connection; health tracking and
/// resurrection are disabled, since removing or quarantining the only
/// endpoint would leave nothing to talk to. Sniff-driven `update` and
/// `remove_connection` are no-ops for the same reason.
pub struct SingleNodePool {
    connection: Mutex<Connection>,
}

impl fmt::Debug for SingleNodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleNodePool")
            .field("url", &self.connection.lock().url.as_str())
            .finish()
    }
}

impl SingleNodePool {
    /// Creates the pool around its one endpoint.
    pub fn new(spec: ConnectionSpec) -> Self {
        Self {
            connection: Mutex::new(Connection::from_spec(spec)),
        }
    }
}

impl ConnectionPool for SingleNodePool {
    fn add_connection(&self, spec: ConnectionSpec) -> Connection {
        // Replacing the endpoint is the only mutation this pool supports.
        let mut connection = self.connection.lock();
        *connection = Connection::from_spec(spec);
        connection.clone()
    }

    fn remove_connection(&self, _id: &str) {}

    fn mark_dead(&self, _id: &str) {}

    fn mark_alive(&self, _id: &str) {}

    fn get_connection(&self, _filter: &NodeFilter, _selector: &NodeSelector) -> Option<Connection> {
        Some(self.connection.lock().clone())
    }

    fn update(&self, _specs: Vec<ConnectionSpec>) {}

    fn connections(&self) -> Vec<Connection> {
        vec![self.connection.lock().clone()]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;

    fn pool() -> SingleNodePool {
        SingleNodePool::new(ConnectionSpec::new(
            Url::parse("https://cluster.example.cloud:443").unwrap(),
        ))
    }

    #[test]
    fn test_always_returns_the_one_connection() {
        let pool = pool();
        let a = pool
            .get_connection(&NodeFilter::default(), &NodeSelector::default())
            .unwrap();
        let b = pool
            .get_connection(&NodeFilter::default(), &NodeSelector::default())
            .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_mark_dead_is_a_noop() {
        let pool = pool();
        let id = pool.connections()[0].id.clone();
        pool.mark_dead(&id);

        let conn = pool
            .get_connection(&NodeFilter::default(), &NodeSelector::default())
            .unwrap();
        assert!(conn.is_alive());
        assert_eq!(conn.failures, 0);
    }

    #[test]
    fn test_update_and_remove_never_drop_the_endpoint() {
        let pool = pool();
        let id = pool.connections()[0].id.clone();
        pool.update(Vec::new());
        pool.remove_connection(&id);
        assert_eq!(pool.connections().len(), 1);
    }
}
