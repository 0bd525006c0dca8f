//! Read contract consumed by the heartbeat tracker.
//!
//! The tracker only ever reads cluster state. `ClusterState` is the narrow
//! surface it needs; [`StateStore`](crate::StateStore) implements it, and
//! tests can substitute their own implementation to inject failures.

use crate::error::StateResult;
use crate::types::{Allocation, Node};

/// Point-in-time view of the node table.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    nodes: Vec<Node>,
}

impl StateSnapshot {
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Iterate every node captured by the snapshot.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Read-only access to nodes and their allocations.
pub trait ClusterState: Send + Sync {
    /// Capture a consistent view of all nodes.
    fn snapshot(&self) -> StateResult<StateSnapshot>;

    /// Look up a single node. `Ok(None)` if it does not exist.
    fn node_by_id(&self, node_id: &str) -> StateResult<Option<Node>>;

    /// All allocations placed on a node, in any status.
    fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>>;
}
