//! Heartbeat tracker — per-node expiration timers on the leader.
//!
//! Every tracked node owns one timer task. A heartbeat pushes the timer's
//! deadline forward; if the deadline passes, the task removes the node from
//! the map and asks the state store what the node was running so it can be
//! marked `down` or `disconnected`.
//!
//! # Timer lifecycle
//!
//! ```text
//! reset()/initialize() ──► armed ──deadline──► fired ──lock──► callback
//!        ▲                   │                   │               │
//!        └─ new deadline ────┘                   │               ├─ not leader → stop
//!                                                │               └─ classify → apply RPC
//! clear()/clear_all() ── drop sender ──► task exits (from armed or fired)
//! ```
//!
//! The deadline travels over a `watch` channel, so re-arming updates the
//! same timer. Each timer is stamped with a generation; a fire is acted on
//! only if the map still holds that generation and its deadline has
//! actually passed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use fleetgrid_metrics::MetricsSink;
use fleetgrid_state::{
    ClusterState, NodeEvent, NodeEventSubsystem, NodeId, NodeStatus, NodeUpdateStatusRequest,
    WriteRequest,
};
use tokio::sync::{Mutex, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::classify::disconnect_state;
use crate::config::HeartbeatConfig;
use crate::error::{HeartbeatError, HeartbeatResult};
use crate::heartbeater::Heartbeater;
use crate::hooks::{ApplyNodeStatusFn, IsLeaderFn};
use crate::rate::{random_stagger, rate_scaled_interval};

/// Gauge: number of nodes with an armed timer.
pub const METRIC_ACTIVE: &str = "heartbeat.active";

/// Timing: duration of each expiry handler.
pub const METRIC_INVALIDATE: &str = "heartbeat.invalidate";

/// Node event message attached to missed-heartbeat status updates.
pub const HEARTBEAT_MISSED: &str = "Node heartbeat missed";

/// One armed timer. Dropping it stops the timer task.
struct HeartbeatTimer {
    generation: u64,
    deadline: watch::Sender<Instant>,
}

/// `None` until the first insertion and again after `clear_all`.
type TimerMap = Option<HashMap<NodeId, HeartbeatTimer>>;

/// What a fired timer found when it took the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    /// Entry removed; run the expiry handler.
    Fired,
    /// Deadline moved forward after the timer fired; keep waiting.
    Rearmed,
    /// Entry cleared or replaced; exit quietly.
    Stale,
}

struct Inner {
    config: HeartbeatConfig,
    state: Arc<dyn ClusterState>,
    is_leader: IsLeaderFn,
    apply_node_status: ApplyNodeStatusFn,
    metrics: Arc<dyn MetricsSink>,
    timers: Mutex<TimerMap>,
    next_generation: AtomicU64,
}

/// Tracks node heartbeats on the leader and expires silent nodes.
///
/// Cheap to clone; clones share the same timer map.
#[derive(Clone)]
pub struct HeartbeatTracker {
    inner: Arc<Inner>,
}

impl HeartbeatTracker {
    pub fn new(
        config: HeartbeatConfig,
        state: Arc<dyn ClusterState>,
        is_leader: IsLeaderFn,
        apply_node_status: ApplyNodeStatusFn,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                is_leader,
                apply_node_status,
                metrics,
                timers: Mutex::new(None),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.inner.config
    }

    /// Seed timers for every non-terminal node using the failover TTL.
    ///
    /// Existing entries are re-armed. Fails only if the state snapshot
    /// cannot be taken.
    pub async fn initialize(&self) -> HeartbeatResult<()> {
        let snapshot = self.inner.state.snapshot()?;
        let ttl = self.inner.config.failover_heartbeat_ttl;

        let mut timers = self.inner.timers.lock().await;
        let mut armed = 0usize;
        for node in snapshot.nodes() {
            if node.terminal_status() {
                continue;
            }
            self.arm_locked(&mut timers, &node.id, ttl);
            armed += 1;
        }

        info!(nodes = armed, ttl_ms = duration_ms(ttl), "heartbeat timers initialized");
        Ok(())
    }

    /// Record a heartbeat and return the TTL the client should honor.
    ///
    /// The local timer is armed at the returned TTL plus the configured
    /// grace.
    pub async fn reset(&self, node_id: &str) -> HeartbeatResult<Duration> {
        let mut timers = self.inner.timers.lock().await;

        // Checked under the lock so a timer can never be armed by a server
        // that has already stepped down.
        if !(self.inner.is_leader)() {
            debug!(%node_id, "heartbeat rejected, not leader");
            return Err(HeartbeatError::NotLeader);
        }

        let config = &self.inner.config;
        let tracked = timers.as_ref().map_or(0, HashMap::len);
        let ttl = rate_scaled_interval(
            config.max_heartbeats_per_second,
            config.min_heartbeat_ttl,
            tracked,
        );
        let ttl = ttl.saturating_add(random_stagger(ttl));

        self.arm_locked(
            &mut timers,
            node_id,
            ttl.saturating_add(config.heartbeat_grace),
        );

        debug!(%node_id, ttl_ms = duration_ms(ttl), tracked, "heartbeat timer reset");
        Ok(ttl)
    }

    /// Stop tracking a node.
    pub async fn clear(&self, node_id: &str) {
        let mut timers = self.inner.timers.lock().await;
        let removed = timers
            .as_mut()
            .and_then(|map| map.remove(node_id))
            .is_some();
        if removed {
            debug!(%node_id, "heartbeat timer cleared");
        }
    }

    /// Stop every timer and discard the map.
    pub async fn clear_all(&self) {
        let mut timers = self.inner.timers.lock().await;
        if let Some(map) = timers.take() {
            info!(nodes = map.len(), "heartbeat timers cleared");
        }
    }

    /// Publish [`METRIC_ACTIVE`] every `period` until `stop` changes or its
    /// sender is dropped.
    pub async fn emit_stats(&self, period: Duration, mut stop: watch::Receiver<bool>) {
        if period.is_zero() {
            warn!("heartbeat stats period is zero, not emitting");
            return;
        }

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let active = self.tracked().await;
                    self.inner.metrics.set_gauge(METRIC_ACTIVE, active as f64);
                }
                _ = stop.changed() => {
                    debug!("heartbeat stats loop stopping");
                    break;
                }
            }
        }
    }

    /// Number of nodes with an armed timer.
    pub(crate) async fn tracked(&self) -> usize {
        self.inner.timers.lock().await.as_ref().map_or(0, HashMap::len)
    }

    /// Arm or re-arm the timer for `node_id` to fire after `ttl`.
    fn arm_locked(&self, timers: &mut TimerMap, node_id: &str, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        let map = timers.get_or_insert_with(HashMap::new);

        if let Some(timer) = map.get(node_id) {
            if timer.deadline.send(deadline).is_ok() {
                return;
            }
            // The task is gone without its entry being removed; replace it.
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(deadline);
        tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            node_id.to_string(),
            generation,
            rx,
        ));
        map.insert(
            node_id.to_string(),
            HeartbeatTimer {
                generation,
                deadline: tx,
            },
        );
    }

    /// Timer-fired entry point. Removes the entry and, if this fire is
    /// current, runs the expiry handler.
    async fn invalidate(&self, node_id: &str, generation: u64) -> Expiry {
        let start = std::time::Instant::now();

        let expiry = self.take_expired(node_id, generation).await;
        if expiry != Expiry::Fired {
            return expiry;
        }

        self.expire_node(node_id).await;
        self.inner.metrics.measure_since(METRIC_INVALIDATE, start);
        Expiry::Fired
    }

    async fn take_expired(&self, node_id: &str, generation: u64) -> Expiry {
        let mut timers = self.inner.timers.lock().await;
        let Some(map) = timers.as_mut() else {
            return Expiry::Stale;
        };

        let deadline = match map.get(node_id) {
            Some(timer) if timer.generation == generation => *timer.deadline.borrow(),
            _ => return Expiry::Stale,
        };
        if deadline > Instant::now() {
            return Expiry::Rearmed;
        }

        map.remove(node_id);
        Expiry::Fired
    }

    /// Decide what a missed heartbeat means for the node and submit the
    /// status update. Runs outside the timer lock.
    async fn expire_node(&self, node_id: &str) {
        // Leadership may have moved between arming and firing; only the
        // current leader may write cluster state.
        if !(self.inner.is_leader)() {
            debug!(%node_id, "heartbeat expired after losing leadership, ignoring");
            return;
        }

        let node = match self.inner.state.node_by_id(node_id) {
            Ok(Some(node)) => node,
            Ok(None) => {
                debug!(%node_id, "expired node no longer exists");
                return;
            }
            Err(e) => {
                error!(%node_id, error = %e, "looking up expired node failed");
                return;
            }
        };

        if matches!(node.status, NodeStatus::Down | NodeStatus::Initializing) {
            debug!(%node_id, status = %node.status, "expired node needs no update");
            return;
        }

        let allocs = match self.inner.state.allocs_by_node(node_id) {
            Ok(allocs) => allocs,
            Err(e) => {
                error!(%node_id, error = %e, "looking up allocations of expired node failed");
                return;
            }
        };

        let classified = disconnect_state(&allocs);
        debug!(
            %node_id,
            allocs = allocs.len(),
            node_can_disconnect = classified.node_can_disconnect,
            has_reconnectable_run_alloc = classified.has_reconnectable_run_alloc,
            "classified expired node"
        );

        let request = NodeUpdateStatusRequest {
            node_id: node_id.to_string(),
            status: classified.target_status(),
            node_event: NodeEvent::new(NodeEventSubsystem::Cluster, HEARTBEAT_MISSED),
            write_request: WriteRequest {
                region: self.inner.config.region.clone(),
            },
        };
        let status = request.status;

        match (self.inner.apply_node_status)(request).await {
            Ok(()) => info!(%node_id, %status, "node heartbeat missed"),
            Err(e) => error!(%node_id, %status, error = %e, "updating node status failed"),
        }
    }

    #[cfg(test)]
    async fn timer_state(&self, node_id: &str) -> Option<(u64, Instant)> {
        let timers = self.inner.timers.lock().await;
        timers
            .as_ref()?
            .get(node_id)
            .map(|t| (t.generation, *t.deadline.borrow()))
    }

    #[cfg(test)]
    async fn is_cleared(&self) -> bool {
        self.inner.timers.lock().await.is_none()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Body of one timer task.
///
/// Exits when the sender is dropped (cleared), when the tracker is gone, or
/// after its expiry has been handled.
async fn run_timer(
    tracker: Weak<Inner>,
    node_id: NodeId,
    generation: u64,
    mut deadline: watch::Receiver<Instant>,
) {
    loop {
        let at = *deadline.borrow_and_update();
        tokio::select! {
            _ = time::sleep_until(at) => {}
            changed = deadline.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
        }

        let Some(inner) = tracker.upgrade() else {
            return;
        };
        let tracker_handle = HeartbeatTracker { inner };
        match tracker_handle.invalidate(&node_id, generation).await {
            Expiry::Rearmed => continue,
            Expiry::Fired | Expiry::Stale => return,
        }
    }
}

#[async_trait]
impl Heartbeater for HeartbeatTracker {
    async fn initialize(&self) -> HeartbeatResult<()> {
        HeartbeatTracker::initialize(self).await
    }

    async fn reset(&self, node_id: &str) -> HeartbeatResult<Duration> {
        HeartbeatTracker::reset(self, node_id).await
    }

    async fn clear(&self, node_id: &str) {
        HeartbeatTracker::clear(self, node_id).await
    }

    async fn clear_all(&self) {
        HeartbeatTracker::clear_all(self).await
    }

    async fn emit_stats(&self, period: Duration, stop: watch::Receiver<bool>) {
        HeartbeatTracker::emit_stats(self, period, stop).await
    }
}
