//! The heartbeat capability as seen by the rest of the leader.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::HeartbeatResult;

/// Leader-side node liveness tracking.
///
/// [`HeartbeatTracker`](crate::HeartbeatTracker) is the production
/// implementation. Leadership transitions and the node RPC layer depend on
/// this trait so they can be exercised against a double.
#[async_trait]
pub trait Heartbeater: Send + Sync {
    /// Arm a failover-length timer for every non-terminal node in the state
    /// store. Called on gaining leadership.
    async fn initialize(&self) -> HeartbeatResult<()>;

    /// Record a heartbeat from `node_id` and return the TTL the client
    /// should wait before its next one.
    async fn reset(&self, node_id: &str) -> HeartbeatResult<Duration>;

    /// Stop tracking `node_id`. No-op if it is not tracked.
    async fn clear(&self, node_id: &str);

    /// Stop tracking every node. Called on losing leadership.
    async fn clear_all(&self);

    /// Publish the tracked-node gauge every `period` until `stop` changes.
    async fn emit_stats(&self, period: Duration, stop: watch::Receiver<bool>);
}
