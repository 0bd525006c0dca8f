//! fleetgrid-state — cluster state for FleetGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the nodes and allocations
//! the heartbeat tracker reads, and applies the node-status updates it
//! submits.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Allocations use composite `{len}:{node_id}:{alloc_id}` keys so a node's
//! allocations are found with a prefix scan.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Consumers that only read depend on
//! the `ClusterState` trait instead of the concrete store.

pub mod error;
pub mod snapshot;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use snapshot::{ClusterState, StateSnapshot};
pub use store::StateStore;
pub use types::*;
