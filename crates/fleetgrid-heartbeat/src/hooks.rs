//! Collaborator hooks injected into the tracker.
//!
//! The leadership oracle and the node-status write path live outside this
//! crate. They are handed to the tracker as function-typed fields, following
//! the same boxed-future callback shape the rest of FleetGrid uses.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fleetgrid_state::{NodeUpdateStatusRequest, StateStore};

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Leadership oracle. Must not block; it is called while the timer map is
/// locked.
pub type IsLeaderFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Submits a node-status update to the replicated log.
pub type ApplyNodeStatusFn = Arc<dyn Fn(NodeUpdateStatusRequest) -> BoxFuture + Send + Sync>;

/// Leadership oracle backed by a shared flag.
pub fn leader_flag(flag: Arc<AtomicBool>) -> IsLeaderFn {
    Arc::new(move || flag.load(Ordering::SeqCst))
}

/// Wrap an async closure as an [`ApplyNodeStatusFn`].
pub fn apply_node_status_fn<F, Fut>(f: F) -> ApplyNodeStatusFn
where
    F: Fn(NodeUpdateStatusRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |req| -> BoxFuture { Box::pin(f(req)) })
}

/// Apply status updates directly to a local [`StateStore`], for
/// single-server deployments and tests where no replicated log sits in
/// between.
pub fn apply_to_store(store: StateStore) -> ApplyNodeStatusFn {
    apply_node_status_fn(move |req| {
        let store = store.clone();
        async move {
            store
                .apply_node_status_update(&req)
                .map_err(anyhow::Error::from)
        }
    })
}
