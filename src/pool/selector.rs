//! Node filtering and selection strategies.
//!
//! Both are capability interfaces: the pool applies the filter to build the
//! eligible set, then asks the selector to pick one connection from it.

use std::fmt;
use std::sync::Arc;

use crate::connection::Connection;

/// Signature of a custom node filter predicate.
pub type NodeFilterFn = dyn Fn(&Connection) -> bool + Send + Sync;

/// Signature of a custom node selector. Receives the eligible connections
/// and returns the index of the one to use; out-of-range indices wrap
/// modulo the slice length.
pub type NodeSelectorFn = dyn Fn(&[Connection]) -> usize + Send + Sync;

/// Predicate excluding ineligible connections from selection.
#[derive(Clone)]
pub enum NodeFilter {
    /// Excludes dedicated master nodes: they coordinate the cluster and
    /// should not serve client traffic.
    Default,
    /// Accepts every connection.
    None,
    /// Caller-supplied predicate.
    Custom(Arc<NodeFilterFn>),
}

impl NodeFilter {
    /// Creates a filter from a custom predicate.
    ///
    /// The predicate runs on a snapshot of the pool, outside its lock, so
    /// it may query the pool it filters for.
    pub fn custom(f: impl Fn(&Connection) -> bool + Send + Sync + 'static) -> Self {
        NodeFilter::Custom(Arc::new(f))
    }

    /// Returns `true` if the connection passes this filter.
    pub fn accepts(&self, connection: &Connection) -> bool {
        match self {
            NodeFilter::Default => !connection.roles.is_master_only(),
            NodeFilter::None => true,
            NodeFilter::Custom(f) => f(connection),
        }
    }
}

impl Default for NodeFilter {
    fn default() -> Self {
        NodeFilter::Default
    }
}

impl fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeFilter::Default => f.write_str("NodeFilter::Default"),
            NodeFilter::None => f.write_str("NodeFilter::None"),
            NodeFilter::Custom(_) => f.write_str("NodeFilter::Custom(..)"),
        }
    }
}

/// Strategy choosing one connection out of the eligible set.
#[derive(Clone)]
pub enum NodeSelector {
    /// Cycles through eligible nodes in least-recently-selected order.
    RoundRobin,
    /// Caller-supplied selection function.
    Custom(Arc<NodeSelectorFn>),
}

impl NodeSelector {
    /// Creates a selector from a custom function.
    ///
    /// The function runs on a snapshot of the pool, outside its lock, so
    /// it may query the pool it selects for.
    pub fn custom(f: impl Fn(&[Connection]) -> usize + Send + Sync + 'static) -> Self {
        NodeSelector::Custom(Arc::new(f))
    }

    /// Picks the index of the connection to use from a non-empty eligible
    /// set.
    pub fn select(&self, eligible: &[Connection]) -> usize {
        debug_assert!(!eligible.is_empty());
        match self {
            NodeSelector::RoundRobin => least_recently_selected(eligible),
            NodeSelector::Custom(f) => f(eligible) % eligible.len(),
        }
    }
}

impl Default for NodeSelector {
    fn default() -> Self {
        NodeSelector::RoundRobin
    }
}

impl fmt::Debug for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeSelector::RoundRobin => f.write_str("NodeSelector::RoundRobin"),
            NodeSelector::Custom(_) => f.write_str("NodeSelector::Custom(..)"),
        }
    }
}

/// Index of the least-recently-selected connection. Never-selected
/// connections sort before any selected one, so fresh nodes are exercised
/// first.
fn least_recently_selected(eligible: &[Connection]) -> usize {
    let mut best = 0;
    for (idx, conn) in eligible.iter().enumerate().skip(1) {
        if conn.last_selected < eligible[best].last_selected {
            best = idx;
        }
    }
    best
}
