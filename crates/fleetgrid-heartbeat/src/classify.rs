//! Disconnect classification for nodes that missed their heartbeat.
//!
//! A node is marked `disconnected` instead of `down` when at least one of
//! its allocations tolerates a reconnect window, is meant to be running,
//! and has not already outlived that window.

use std::time::SystemTime;

use fleetgrid_state::{AllocDesiredStatus, Allocation, NodeStatus};

/// Outcome of scanning a node's allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectState {
    /// Some allocation has a reconnect window configured.
    pub node_can_disconnect: bool,
    /// Some allocation with a reconnect window is desired running and has
    /// not expired.
    pub has_reconnectable_run_alloc: bool,
}

impl DisconnectState {
    /// Status to write for a node that missed its heartbeat.
    pub fn target_status(&self) -> NodeStatus {
        if self.node_can_disconnect && self.has_reconnectable_run_alloc {
            NodeStatus::Disconnected
        } else {
            NodeStatus::Down
        }
    }
}

/// Classify a node's allocations against the current wall clock.
pub fn disconnect_state(allocs: &[Allocation]) -> DisconnectState {
    disconnect_state_at(allocs, SystemTime::now())
}

/// Classify a node's allocations against a fixed `now`, shared by every
/// allocation in the scan.
pub fn disconnect_state_at(allocs: &[Allocation], now: SystemTime) -> DisconnectState {
    let mut state = DisconnectState::default();

    for alloc in allocs {
        let can_disconnect = alloc.disconnect_timeout(now) > now;
        if !can_disconnect {
            continue;
        }
        state.node_can_disconnect = true;

        if alloc.desired_status == AllocDesiredStatus::Run && !alloc.expired(now) {
            state.has_reconnectable_run_alloc = true;
            return state;
        }
    }

    state
}
