//! Leadership transitions.
//!
//! Timers only exist on the leader. Gaining leadership seeds them from the
//! state store; losing it throws them all away.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::heartbeater::Heartbeater;

/// Follow a leadership flag until its sender is dropped.
///
/// A transition to `true` seeds timers with [`Heartbeater::initialize`]; a
/// transition to `false` discards them with [`Heartbeater::clear_all`]. If
/// this server is still leader when the sender goes away the timers are
/// cleared on the way out.
pub async fn watch_leadership(
    heartbeater: Arc<dyn Heartbeater>,
    mut leadership: watch::Receiver<bool>,
) {
    let mut leader = false;

    loop {
        let is_leader = *leadership.borrow_and_update();
        if is_leader != leader {
            leader = is_leader;
            if leader {
                establish(heartbeater.as_ref()).await;
            } else {
                info!("leadership lost, clearing heartbeat timers");
                heartbeater.clear_all().await;
            }
        }

        if leadership.changed().await.is_err() {
            break;
        }
    }

    if leader {
        heartbeater.clear_all().await;
    }
    info!("leadership watcher stopped");
}

async fn establish(heartbeater: &dyn Heartbeater) {
    info!("leadership acquired, initializing heartbeat timers");
    // Nodes keep heartbeating; timers missing here are created by their
    // next reset.
    if let Err(e) = heartbeater.initialize().await {
        error!(error = %e, "initializing heartbeat timers failed");
    }
}
