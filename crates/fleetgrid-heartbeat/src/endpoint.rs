//! Node status endpoint glue.
//!
//! The node RPC layer hands every client status report here. Transport is
//! handled elsewhere.

use std::sync::Arc;
use std::time::Duration;

use fleetgrid_state::NodeStatus;
use tracing::debug;

use crate::error::HeartbeatResult;
use crate::heartbeater::Heartbeater;

/// Routes client status reports to the heartbeat tracker.
#[derive(Clone)]
pub struct HeartbeatEndpoint {
    heartbeater: Arc<dyn Heartbeater>,
}

impl HeartbeatEndpoint {
    pub fn new(heartbeater: Arc<dyn Heartbeater>) -> Self {
        Self { heartbeater }
    }

    /// Handle a status report from `node_id`.
    ///
    /// A node reporting itself `down` is no longer tracked and gets no TTL.
    /// Any other status counts as a heartbeat and returns the TTL the client
    /// must heartbeat within.
    pub async fn update_status(
        &self,
        node_id: &str,
        reported: NodeStatus,
    ) -> HeartbeatResult<Option<Duration>> {
        if reported.is_terminal() {
            debug!(%node_id, status = %reported, "node reported terminal status");
            self.heartbeater.clear(node_id).await;
            return Ok(None);
        }

        let ttl = self.heartbeater.reset(node_id).await?;
        Ok(Some(ttl))
    }

    /// Stop tracking a node that left the cluster.
    pub async fn deregister(&self, node_id: &str) {
        debug!(%node_id, "node deregistered");
        self.heartbeater.clear(node_id).await;
    }
}
