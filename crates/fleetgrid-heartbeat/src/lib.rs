//! fleetgrid-heartbeat — leader-side node liveness for FleetGrid.
//!
//! Client nodes heartbeat the leader. The leader keeps one expiration timer
//! per node, hands each client a TTL scaled to fleet size, and when a timer
//! runs out marks the node `down` or `disconnected` through the replicated
//! state.
//!
//! # Architecture
//!
//! ```text
//! node RPC ──► HeartbeatEndpoint ──► Heartbeater (trait)
//!                                        │
//! leadership flag ──► watch_leadership ──┤
//!                                        ▼
//!                                  HeartbeatTracker
//!                                    ├── timer map (node → timer task)
//!                                    ├── rate_scaled_interval + random_stagger
//!                                    ├── on expiry:
//!                                    │     ClusterState lookups
//!                                    │     disconnect_state() → down | disconnected
//!                                    │     ApplyNodeStatusFn(NodeUpdateStatusRequest)
//!                                    └── emit_stats() → MetricsSink
//! ```
//!
//! Timers exist only while this server is leader. Every write to the map
//! checks leadership under the map lock, and an expiring timer checks it
//! again before submitting a status update.

pub mod classify;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod heartbeater;
pub mod hooks;
pub mod leadership;
pub mod rate;
pub mod tracker;

pub use classify::{DisconnectState, disconnect_state, disconnect_state_at};
pub use config::HeartbeatConfig;
pub use endpoint::HeartbeatEndpoint;
pub use error::{ConfigError, HeartbeatError, HeartbeatResult};
pub use heartbeater::Heartbeater;
pub use hooks::{ApplyNodeStatusFn, IsLeaderFn, apply_node_status_fn, apply_to_store, leader_flag};
pub use leadership::watch_leadership;
pub use rate::{random_stagger, rate_scaled_interval};
pub use tracker::{HEARTBEAT_MISSED, HeartbeatTracker, METRIC_ACTIVE, METRIC_INVALIDATE};
