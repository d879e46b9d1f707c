// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editing facade that records every mutation for undo/redo.
//!
//! [`EntityStore`] applies changes without history; [`GraphEditor`] wraps
//! it and turns each successful mutation into a [`Command`].

use crate::config::EditorConfig;
use crate::edge::{Edge, EdgeId, EdgeSpec};
use crate::error::{BatchError, Result};
use crate::events::EventRegistry;
use crate::history::{Command, History, HistoryStats};
use crate::node::{DataMap, Node, NodeId, NodeSpec, NodeTypeDefinition, NodeTypeRegistry, NodeUpdate};
use crate::snapshot::{GraphSnapshot, SnapshotItem};
use crate::store::{run_batch, EntityStore};

/// Graph store with recorded, undoable mutations
#[derive(Debug)]
pub struct GraphEditor {
    store: EntityStore,
    history: History,
    config: EditorConfig,
}

impl GraphEditor {
    /// Create an editor with default configuration
    pub fn new() -> Self {
        Self::with_config(EditorConfig::default())
    }

    /// Create an editor with custom limits
    pub fn with_config(config: EditorConfig) -> Self {
        Self::with_registry(config, NodeTypeRegistry::new())
    }

    /// Create an editor with custom limits and node types
    pub fn with_registry(config: EditorConfig, node_types: NodeTypeRegistry) -> Self {
        let events = EventRegistry::with_limits(config.event_history_capacity, config.max_listeners);
        Self {
            store: EntityStore::with_parts(node_types, events),
            history: History::with_max_depth(config.max_history),
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Read access to the graph
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Undo/redo history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Event registry
    pub fn events(&self) -> &EventRegistry {
        self.store.events()
    }

    /// Mutable event registry, for adding and removing listeners
    pub fn events_mut(&mut self) -> &mut EventRegistry {
        self.store.events_mut()
    }

    /// Register a node type
    pub fn register_node_type(&mut self, definition: NodeTypeDefinition) -> Option<NodeTypeDefinition> {
        self.store.register_node_type(definition)
    }

    /// Remove a node type
    pub fn unregister_node_type(&mut self, type_name: &str) -> Option<NodeTypeDefinition> {
        self.store.unregister_node_type(type_name)
    }

    // ------------------------------------------------------------------
    // Recorded mutations
    // ------------------------------------------------------------------

    /// Create a node. See [`EntityStore::create_node`].
    pub fn create_node(&mut self, spec: NodeSpec) -> Result<Node> {
        self.record_create_node(&spec)
    }

    /// Update a node. See [`EntityStore::update_node`].
    pub fn update_node(&mut self, id: &NodeId, update: NodeUpdate) -> Result<Node> {
        let before = self.store.node(id).map(Node::to_spec);
        let node = self.store.update_node(id, update)?;
        let after = node.to_spec();
        match before {
            Some(before) if before != after => self.history.record(Command::UpdateNode { before, after }),
            _ => tracing::trace!("Update of node {id} changed nothing, not recorded"),
        }
        Ok(node)
    }

    /// Delete a node and its edges as one undo step
    pub fn delete_node(&mut self, id: &NodeId) -> bool {
        let Some((node, edges)) = self.store.remove_node(id) else {
            return false;
        };
        self.history.record(Command::DeleteNode {
            node: node.to_spec(),
            edges: edges.iter().map(Edge::to_spec).collect(),
        });
        true
    }

    /// Create an edge. Edges it replaces come back on undo.
    pub fn create_edge(&mut self, spec: EdgeSpec) -> Result<Edge> {
        self.record_create_edge(&spec)
    }

    /// Merge keys into an edge's payload
    pub fn update_edge(&mut self, id: &EdgeId, data: DataMap) -> Result<Edge> {
        let before = self.store.edge(id).map(Edge::to_spec);
        let edge = self.store.update_edge(id, data)?;
        let after = edge.to_spec();
        match before {
            Some(before) if before != after => self.history.record(Command::UpdateEdge { before, after }),
            _ => tracing::trace!("Update of edge {id} changed nothing, not recorded"),
        }
        Ok(edge)
    }

    /// Delete an edge
    pub fn delete_edge(&mut self, id: &EdgeId) -> bool {
        let Some(edge) = self.store.remove_edge(id) else {
            return false;
        };
        self.history.record(Command::DeleteEdge { edge: edge.to_spec() });
        true
    }

    // ------------------------------------------------------------------
    // Batches, one undo step per call
    // ------------------------------------------------------------------

    /// Create several nodes
    pub fn create_nodes(
        &mut self,
        specs: Vec<NodeSpec>,
    ) -> std::result::Result<Vec<Node>, BatchError<Node, NodeSpec>> {
        self.history.begin_transaction(format!("Create {} nodes", specs.len()));
        let result = run_batch(specs, |spec| self.record_create_node(spec));
        self.history.commit_transaction();
        result
    }

    /// Update several nodes
    pub fn update_nodes(
        &mut self,
        updates: Vec<(NodeId, NodeUpdate)>,
    ) -> std::result::Result<Vec<Node>, BatchError<Node, (NodeId, NodeUpdate)>> {
        self.history.begin_transaction(format!("Update {} nodes", updates.len()));
        let result = run_batch(updates, |(id, update)| self.update_node(id, update.clone()));
        self.history.commit_transaction();
        result
    }

    /// Create several edges
    pub fn create_edges(
        &mut self,
        specs: Vec<EdgeSpec>,
    ) -> std::result::Result<Vec<Edge>, BatchError<Edge, EdgeSpec>> {
        self.history.begin_transaction(format!("Create {} edges", specs.len()));
        let result = run_batch(specs, |spec| self.record_create_edge(spec));
        self.history.commit_transaction();
        result
    }

    /// Delete several nodes, returning how many existed
    pub fn delete_nodes(&mut self, ids: &[NodeId]) -> usize {
        self.history.begin_transaction(format!("Delete {} nodes", ids.len()));
        let removed = ids.iter().filter(|id| self.delete_node(id)).count();
        self.history.commit_transaction();
        removed
    }

    /// Delete several edges, returning how many existed
    pub fn delete_edges(&mut self, ids: &[EdgeId]) -> usize {
        self.history.begin_transaction(format!("Delete {} edges", ids.len()));
        let removed = ids.iter().filter(|id| self.delete_edge(id)).count();
        self.history.commit_transaction();
        removed
    }

    /// Delete everything as one undo step
    pub fn clear(&mut self) {
        let ids: Vec<NodeId> = self.store.node_ids().cloned().collect();
        self.history.begin_transaction("Clear graph");
        for id in &ids {
            self.delete_node(id);
        }
        self.history.commit_transaction();
    }

    // ------------------------------------------------------------------
    // Selection (not recorded)
    // ------------------------------------------------------------------

    /// Select a node
    pub fn select_node(&mut self, id: &NodeId) -> bool {
        self.store.select_node(id)
    }

    /// Deselect a node
    pub fn deselect_node(&mut self, id: &NodeId) -> bool {
        self.store.deselect_node(id)
    }

    /// Select an edge
    pub fn select_edge(&mut self, id: &EdgeId) -> bool {
        self.store.select_edge(id)
    }

    /// Deselect an edge
    pub fn deselect_edge(&mut self, id: &EdgeId) -> bool {
        self.store.deselect_edge(id)
    }

    /// Deselect everything
    pub fn clear_selection(&mut self) {
        self.store.clear_selection();
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Revert the latest step
    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.store)
    }

    /// Re-apply the latest undone step
    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.store)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Drop all undo and redo steps
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Get history statistics
    pub fn history_stats(&self) -> HistoryStats {
        self.history.stats()
    }

    /// Description of the next undo step
    pub fn undo_description(&self) -> Option<&str> {
        self.history.undo_description()
    }

    /// Description of the next redo step
    pub fn redo_description(&self) -> Option<&str> {
        self.history.redo_description()
    }

    /// Start grouping mutations into one undo step
    pub fn begin_transaction(&mut self, description: impl Into<String>) {
        self.history.begin_transaction(description);
    }

    /// Finish a group started with [`begin_transaction`](Self::begin_transaction)
    pub fn commit_transaction(&mut self) -> bool {
        self.history.commit_transaction()
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Capture the graph
    pub fn snapshot(&self) -> GraphSnapshot {
        self.store.snapshot()
    }

    /// Replace the graph with a snapshot and start a fresh history
    pub fn load_snapshot(
        &mut self,
        snapshot: GraphSnapshot,
    ) -> std::result::Result<(), BatchError<SnapshotItem, SnapshotItem>> {
        let result = self.store.load_snapshot(snapshot);
        self.history.clear();
        result
    }

    fn record_create_node(&mut self, spec: &NodeSpec) -> Result<Node> {
        let node = self.store.insert_node(spec)?;
        self.history.record(Command::CreateNode { node: node.to_spec() });
        Ok(node)
    }

    fn record_create_edge(&mut self, spec: &EdgeSpec) -> Result<Edge> {
        let (edge, replaced) = self.store.insert_edge(spec)?;
        self.history.record(Command::CreateEdge {
            edge: edge.to_spec(),
            replaced: replaced.iter().map(Edge::to_spec).collect(),
        });
        Ok(edge)
    }
}

impl Default for GraphEditor {
    fn default() -> Self {
        Self::new()
    }
}
