//! StateStore — redb-backed persistence for nodes and allocations.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing). Every read goes through a single read transaction, so a
//! [`StateSnapshot`] is consistent even while writers are active.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::snapshot::{ClusterState, StateSnapshot};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        let value = serde_json::to_vec(node).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id = %node.id, status = %node.status, "node stored");
        Ok(())
    }

    /// Get a node by ID.
    pub fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Storage))? {
            Some(guard) => {
                let node: Node =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Decode))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// List all nodes.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            let node: Node = serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            results.push(node);
        }
        Ok(results)
    }

    /// Delete a node by ID. Returns true if it existed.
    pub fn delete_node(&self, node_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = table.remove(node_id).map_err(map_err!(Storage))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%node_id, existed, "node deleted");
        Ok(existed)
    }

    /// Apply a node-status update: set the status, stamp the transition
    /// time, and append the request's event to the node's event log.
    pub fn apply_node_status_update(&self, req: &NodeUpdateStatusRequest) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let existing = match table.get(req.node_id.as_str()).map_err(map_err!(Storage))? {
                Some(guard) => {
                    serde_json::from_slice::<Node>(guard.value()).map_err(map_err!(Decode))?
                }
                None => return Err(StateError::NodeNotFound(req.node_id.clone())),
            };

            let mut node = existing;
            node.status = req.status;
            node.status_updated_at = Some(SystemTime::now());
            node.events.push(req.node_event.clone());

            let value = serde_json::to_vec(&node).map_err(map_err!(Encode))?;
            table
                .insert(req.node_id.as_str(), value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            node_id = %req.node_id,
            status = %req.status,
            region = %req.write_request.region,
            "node status update applied"
        );
        Ok(())
    }

    // ── Allocations ────────────────────────────────────────────────

    /// Insert or update an allocation.
    pub fn put_allocation(&self, alloc: &Allocation) -> StateResult<()> {
        let key = alloc.table_key();
        let value = serde_json::to_vec(alloc).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an allocation by node and allocation ID.
    pub fn get_allocation(&self, node_id: &str, alloc_id: &str) -> StateResult<Option<Allocation>> {
        let key = alloc_key(node_id, alloc_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Storage))? {
            Some(guard) => {
                let alloc: Allocation =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Decode))?;
                Ok(Some(alloc))
            }
            None => Ok(None),
        }
    }

    /// List all allocations placed on a node.
    pub fn list_allocations_for_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        let prefix = alloc_key_prefix(node_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            if key.value().starts_with(&prefix) {
                let alloc: Allocation =
                    serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
                if alloc.node_id == node_id {
                    results.push(alloc);
                }
            }
        }
        Ok(results)
    }

    /// Delete an allocation. Returns true if it existed.
    pub fn delete_allocation(&self, node_id: &str, alloc_id: &str) -> StateResult<bool> {
        let key = alloc_key(node_id, alloc_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Storage))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

impl ClusterState for StateStore {
    fn snapshot(&self) -> StateResult<StateSnapshot> {
        // One read transaction pins a single MVCC version for the whole scan.
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut nodes = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            nodes.push(serde_json::from_slice(value.value()).map_err(map_err!(Decode))?);
        }
        Ok(StateSnapshot::from_nodes(nodes))
    }

    fn node_by_id(&self, node_id: &str) -> StateResult<Option<Node>> {
        self.get_node(node_id)
    }

    fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        self.list_allocations_for_node(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_node(id: &str, status: NodeStatus) -> Node {
        Node {
            id: id.to_string(),
            name: format!("{id}.example"),
            datacenter: "dc1".to_string(),
            status,
            events: Vec::new(),
            status_updated_at: None,
        }
    }

    fn test_alloc(node_id: &str, id: &str) -> Allocation {
        Allocation {
            id: id.to_string(),
            node_id: node_id.to_string(),
            job_id: "web".to_string(),
            desired_status: AllocDesiredStatus::Run,
            client_status: AllocClientStatus::Running,
            max_client_disconnect: Some(Duration::from_secs(30)),
            last_unknown_at: None,
        }
    }

    fn missed_heartbeat(node_id: &str, status: NodeStatus) -> NodeUpdateStatusRequest {
        NodeUpdateStatusRequest {
            node_id: node_id.to_string(),
            status,
            node_event: NodeEvent::new(NodeEventSubsystem::Cluster, "Node heartbeat missed"),
            write_request: WriteRequest {
                region: "global".to_string(),
            },
        }
    }

    // ── Node CRUD ──────────────────────────────────────────────────

    #[test]
    fn node_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let node = test_node("node-1", NodeStatus::Ready);

        store.put_node(&node).unwrap();
        let retrieved = store.get_node("node-1").unwrap();

        assert_eq!(retrieved, Some(node));
    }

    #[test]
    fn node_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_node("nope").unwrap().is_none());
    }

    #[test]
    fn node_list_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("node-1", NodeStatus::Ready)).unwrap();
        store.put_node(&test_node("node-2", NodeStatus::Down)).unwrap();
        assert_eq!(store.list_nodes().unwrap().len(), 2);

        assert!(store.delete_node("node-1").unwrap());
        assert!(!store.delete_node("node-1").unwrap());
        assert_eq!(store.list_nodes().unwrap().len(), 1);
    }

    // ── Allocation CRUD ────────────────────────────────────────────

    #[test]
    fn allocation_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let alloc = test_alloc("node-1", "a1");

        store.put_allocation(&alloc).unwrap();
        assert_eq!(store.get_allocation("node-1", "a1").unwrap(), Some(alloc));
        assert!(store.get_allocation("node-2", "a1").unwrap().is_none());
    }

    #[test]
    fn allocations_scoped_to_node() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_allocation(&test_alloc("node-1", "a1")).unwrap();
        store.put_allocation(&test_alloc("node-1", "a2")).unwrap();
        store.put_allocation(&test_alloc("node-2", "a3")).unwrap();

        assert_eq!(store.list_allocations_for_node("node-1").unwrap().len(), 2);
        assert_eq!(store.list_allocations_for_node("node-2").unwrap().len(), 1);
        assert!(store.list_allocations_for_node("node-3").unwrap().is_empty());

        assert!(store.delete_allocation("node-1", "a1").unwrap());
        assert_eq!(store.list_allocations_for_node("node-1").unwrap().len(), 1);
    }

    #[test]
    fn allocation_prefix_does_not_leak_between_similar_ids() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_allocation(&test_alloc("node-1", "a1")).unwrap();
        store.put_allocation(&test_alloc("node-10", "a2")).unwrap();

        let allocs = store.list_allocations_for_node("node-1").unwrap();
        assert_eq!(allocs.len(), 1);
        assert_eq!(allocs[0].id, "a1");
    }

    #[test]
    fn colon_bearing_node_ids_keep_separate_allocations() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_allocation(&test_alloc("web:1", "x")).unwrap();
        store.put_allocation(&test_alloc("web", "1:x")).unwrap();

        let web = store.list_allocations_for_node("web").unwrap();
        assert_eq!(web.len(), 1);
        assert_eq!((web[0].node_id.as_str(), web[0].id.as_str()), ("web", "1:x"));

        let web1 = store.list_allocations_for_node("web:1").unwrap();
        assert_eq!(web1.len(), 1);
        assert_eq!((web1[0].node_id.as_str(), web1[0].id.as_str()), ("web:1", "x"));

        assert!(store.get_allocation("web:1", "x").unwrap().is_some());
        assert!(store.get_allocation("web", "1:x").unwrap().is_some());
        assert!(store.delete_allocation("web", "1:x").unwrap());
        assert_eq!(store.list_allocations_for_node("web:1").unwrap().len(), 1);
    }

    // ── Snapshot / read contract ───────────────────────────────────

    #[test]
    fn snapshot_captures_all_nodes() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("a", NodeStatus::Ready)).unwrap();
        store.put_node(&test_node("b", NodeStatus::Initializing)).unwrap();
        store.put_node(&test_node("t", NodeStatus::Down)).unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.nodes().filter(|n| n.terminal_status()).count(), 1);

        // Later writes do not show up in an existing snapshot.
        store.put_node(&test_node("c", NodeStatus::Ready)).unwrap();
        assert_eq!(snap.len(), 3);
    }

    #[test]
    fn cluster_state_delegates_to_store() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("node-1", NodeStatus::Ready)).unwrap();
        store.put_allocation(&test_alloc("node-1", "a1")).unwrap();

        let state: &dyn ClusterState = &store;
        assert!(state.node_by_id("node-1").unwrap().is_some());
        assert_eq!(state.allocs_by_node("node-1").unwrap().len(), 1);
    }

    // ── Status updates ─────────────────────────────────────────────

    #[test]
    fn status_update_sets_status_and_appends_event() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("node-1", NodeStatus::Ready)).unwrap();

        store
            .apply_node_status_update(&missed_heartbeat("node-1", NodeStatus::Down))
            .unwrap();

        let node = store.get_node("node-1").unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Down);
        assert!(node.status_updated_at.is_some());
        assert_eq!(node.events.len(), 1);
        assert_eq!(node.events[0].subsystem, NodeEventSubsystem::Cluster);
        assert_eq!(node.events[0].message, "Node heartbeat missed");
    }

    #[test]
    fn status_update_for_missing_node_fails() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .apply_node_status_update(&missed_heartbeat("ghost", NodeStatus::Down))
            .unwrap_err();
        assert!(matches!(err, StateError::NodeNotFound(id) if id == "ghost"));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_node(&test_node("node-1", NodeStatus::Ready)).unwrap();
            store.put_allocation(&test_alloc("node-1", "a1")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_node("node-1").unwrap().is_some());
        assert_eq!(store.list_allocations_for_node("node-1").unwrap().len(), 1);
    }
}
