//! Domain types for the FleetGrid state store.
//!
//! Nodes and allocations are the two records the heartbeat tracker reads.
//! The node-status update request is the write the leader submits when a
//! node misses its heartbeat; its JSON shape is replicated verbatim, so
//! field names are pinned with `serde(rename)`.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Unique identifier for an allocation.
pub type AllocId = String;

// ── Node ──────────────────────────────────────────────────────────

/// Liveness status of a client node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Initializing,
    Ready,
    Down,
    Disconnected,
}

impl NodeStatus {
    /// Terminal statuses are not tracked by the heartbeat timers.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Down)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Initializing => "initializing",
            NodeStatus::Ready => "ready",
            NodeStatus::Down => "down",
            NodeStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsystem that produced a node event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEventSubsystem {
    Cluster,
    Drain,
    Driver,
    Heartbeat,
    Scheduler,
    Storage,
}

/// An entry in a node's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub subsystem: NodeEventSubsystem,
    pub message: String,
}

impl NodeEvent {
    pub fn new(subsystem: NodeEventSubsystem, message: impl Into<String>) -> Self {
        Self {
            subsystem,
            message: message.into(),
        }
    }
}

/// A client node registered with the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub datacenter: String,
    pub status: NodeStatus,
    /// Event log, oldest first.
    #[serde(default)]
    pub events: Vec<NodeEvent>,
    /// Wall-clock time of the last status transition.
    #[serde(default)]
    pub status_updated_at: Option<SystemTime>,
}

impl Node {
    /// Whether the node is in a terminal status.
    pub fn terminal_status(&self) -> bool {
        self.status.is_terminal()
    }
}

// ── Allocation ────────────────────────────────────────────────────

/// What the scheduler wants an allocation to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocDesiredStatus {
    Run,
    Stop,
    Evict,
}

/// What the client last reported about an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocClientStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Lost,
    Unknown,
}

/// A unit of work placed on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocId,
    pub node_id: NodeId,
    pub job_id: String,
    pub desired_status: AllocDesiredStatus,
    pub client_status: AllocClientStatus,
    /// How long the allocation may stay disconnected before it is replaced.
    /// `None` means it is replaced as soon as its node goes down.
    #[serde(default)]
    pub max_client_disconnect: Option<Duration>,
    /// When the allocation last entered the `unknown` client status.
    #[serde(default)]
    pub last_unknown_at: Option<SystemTime>,
}

impl Allocation {
    /// Build the composite key for the allocations table.
    pub fn table_key(&self) -> String {
        alloc_key(&self.node_id, &self.id)
    }

    /// The instant at which this allocation's reconnect window closes if its
    /// node disconnects at `now`. Equal to `now` when no window is configured.
    pub fn disconnect_timeout(&self, now: SystemTime) -> SystemTime {
        match self.max_client_disconnect {
            Some(window) => now + window,
            None => now,
        }
    }

    /// Whether an allocation in the `unknown` state has outlived its
    /// reconnect window.
    pub fn expired(&self, now: SystemTime) -> bool {
        if self.client_status != AllocClientStatus::Unknown {
            return false;
        }
        match (self.last_unknown_at, self.max_client_disconnect) {
            (Some(since), Some(window)) => since + window <= now,
            _ => false,
        }
    }
}

/// `{len}:{node_id}:{alloc_id}`. The length prefix keeps node ids that
/// contain `:` from sharing a key space.
pub(crate) fn alloc_key(node_id: &str, alloc_id: &str) -> String {
    format!("{}{alloc_id}", alloc_key_prefix(node_id))
}

/// Key prefix shared by every allocation of `node_id`.
pub(crate) fn alloc_key_prefix(node_id: &str) -> String {
    format!("{}:{node_id}:", node_id.len())
}

// ── Status update ─────────────────────────────────────────────────

/// Replication envelope common to write requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub region: String,
}

/// Request to change a node's status through the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdateStatusRequest {
    #[serde(rename = "nodeID")]
    pub node_id: NodeId,
    pub status: NodeStatus,
    #[serde(rename = "nodeEvent")]
    pub node_event: NodeEvent,
    #[serde(rename = "writeRequest")]
    pub write_request: WriteRequest,
}
