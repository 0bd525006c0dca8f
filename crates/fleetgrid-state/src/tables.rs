//! redb table definitions for the FleetGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Nodes keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Allocations keyed by `{len}:{node_id}:{alloc_id}` so a node's allocations
/// can be found with a prefix scan.
pub const ALLOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("allocations");
