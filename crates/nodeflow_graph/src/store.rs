// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entity store: the canonical node, port and edge tables.
//!
//! Every mutation either fails without touching the tables or leaves them
//! consistent:
//! - node ids and edge ids are unique, port ids are unique per node
//! - every edge endpoint resolves to an existing node and port
//! - no edge connects a node to itself
//! - a single-connection port holds at most one edge
//! - connected ports agree on direction and data type, and no two edges
//!   share the same ordered port pair
//!
//! Ports index their edges through `Port::connections`, so edge lookups by
//! node or port never scan the edge table.

use crate::edge::{Edge, EdgeId, EdgeSpec};
use crate::error::{BatchError, BatchFailure, GraphError, Result};
use crate::events::{EventRegistry, GraphEvent};
use crate::node::{DataMap, Node, NodeId, NodeSpec, NodeTypeDefinition, NodeTypeRegistry, NodeUpdate};
use crate::port::{Port, PortId, PortSpec};
use crate::snapshot::{GraphSnapshot, SnapshotItem};
use crate::validation::{self, ConnectionCheck, RejectReason};
use indexmap::{IndexMap, IndexSet};
use serde_json::json;
use std::collections::HashSet;

/// Node, port and edge tables with integrity enforcement
#[derive(Debug)]
pub struct EntityStore {
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
    node_types: NodeTypeRegistry,
    events: EventRegistry,
    selected_nodes: IndexSet<NodeId>,
    selected_edges: IndexSet<EdgeId>,
}

impl EntityStore {
    /// Create an empty store with the built-in `default` node type
    pub fn new() -> Self {
        Self::with_parts(NodeTypeRegistry::new(), EventRegistry::new())
    }

    /// Create an empty store with a custom type registry
    pub fn with_registry(node_types: NodeTypeRegistry) -> Self {
        Self::with_parts(node_types, EventRegistry::new())
    }

    /// Create an empty store from a type registry and an event registry
    pub fn with_parts(node_types: NodeTypeRegistry, events: EventRegistry) -> Self {
        Self {
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            node_types,
            events,
            selected_nodes: IndexSet::new(),
            selected_edges: IndexSet::new(),
        }
    }

    /// Event registry used for mutation notifications
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Mutable event registry, for adding and removing listeners
    pub fn events_mut(&mut self) -> &mut EventRegistry {
        &mut self.events
    }

    /// Registered node types
    pub fn node_types(&self) -> &NodeTypeRegistry {
        &self.node_types
    }

    /// Look up a node type by name
    pub fn node_type(&self, type_name: &str) -> Option<&NodeTypeDefinition> {
        self.node_types.get(type_name)
    }

    /// Register a node type, returning the definition it replaced
    pub fn register_node_type(&mut self, definition: NodeTypeDefinition) -> Option<NodeTypeDefinition> {
        tracing::debug!("Registering node type '{}'", definition.type_name);
        self.node_types.register(definition)
    }

    /// Remove a node type. Nodes already created with it are kept.
    pub fn unregister_node_type(&mut self, type_name: &str) -> Option<NodeTypeDefinition> {
        self.node_types.unregister(type_name)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a node.
    ///
    /// Type defaults are applied first: caller data is merged over the
    /// type's default data, and the type's default ports are used when the
    /// spec lists none.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidNodeData`] for an empty or duplicate id, an empty
    /// or unregistered type, a non-finite position, or bad port ids.
    pub fn create_node(&mut self, spec: NodeSpec) -> Result<Node> {
        self.insert_node(&spec)
    }

    pub(crate) fn insert_node(&mut self, spec: &NodeSpec) -> Result<Node> {
        self.add_node(spec, true)
    }

    /// Recreate a captured node as-is. Type defaults are not applied, so an
    /// empty port list stays empty.
    pub(crate) fn reinsert_node(&mut self, spec: &NodeSpec) -> Result<Node> {
        self.add_node(spec, false)
    }

    fn add_node(&mut self, spec: &NodeSpec, apply_defaults: bool) -> Result<Node> {
        if spec.id.is_empty() {
            return Err(GraphError::invalid_node("node id is empty", json!({ "id": spec.id })));
        }
        if self.nodes.contains_key(&spec.id) {
            return Err(GraphError::invalid_node(
                format!("node {} already exists", spec.id),
                json!({ "id": spec.id }),
            ));
        }
        if spec.node_type.trim().is_empty() {
            return Err(GraphError::invalid_node(
                "node type is empty",
                json!({ "id": spec.id, "field": "type" }),
            ));
        }
        let Some(definition) = self.node_types.get(&spec.node_type) else {
            return Err(GraphError::invalid_node(
                format!("unknown node type '{}'", spec.node_type),
                json!({ "id": spec.id, "type": spec.node_type }),
            ));
        };
        if !spec.position.is_finite() {
            return Err(GraphError::invalid_node(
                "position is not finite",
                json!({ "id": spec.id, "field": "position" }),
            ));
        }

        let port_specs = if apply_defaults && spec.ports.is_empty() {
            definition.default_ports.as_slice()
        } else {
            spec.ports.as_slice()
        };
        validate_port_specs(&spec.id, port_specs)?;

        let node = Node {
            id: spec.id.clone(),
            node_type: spec.node_type.clone(),
            position: spec.position,
            data: if apply_defaults {
                definition.merge_data(&spec.data)
            } else {
                spec.data.clone()
            },
            ports: port_specs
                .iter()
                .map(|port| (port.id.clone(), Port::from_spec(spec.id.clone(), port)))
                .collect(),
            selected: false,
        };

        tracing::debug!("Created node {} of type '{}'", node.id, node.node_type);
        self.nodes.insert(node.id.clone(), node.clone());
        self.events.emit(GraphEvent::NodeCreated { node: node.clone() });
        Ok(node)
    }

    /// Apply a partial update to a node.
    ///
    /// Data is shallow-merged. A port list replaces all ports; ports kept by
    /// id keep their edges.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidNodeData`] if the node is unknown, the position
    /// would become non-finite, or the new ports would orphan or invalidate
    /// an existing edge. The node is unchanged on error.
    pub fn update_node(&mut self, id: &NodeId, update: NodeUpdate) -> Result<Node> {
        let current = self.require_node(id)?;
        let mut updated = current.clone();

        if let Some(position) = update.position {
            if let Some(x) = position.x {
                updated.position.x = x;
            }
            if let Some(y) = position.y {
                updated.position.y = y;
            }
        }
        if let Some(data) = update.data {
            for (key, value) in data {
                updated.data.insert(key, value);
            }
        }
        if let Some(ports) = &update.ports {
            updated.ports = self.rebuild_ports(current, ports)?;
        }

        self.commit_node(updated)
    }

    /// Put a node back into exactly the state described by `spec`.
    ///
    /// Unlike [`update_node`](Self::update_node) the payload is replaced,
    /// not merged.
    pub(crate) fn restore_node(&mut self, spec: &NodeSpec) -> Result<Node> {
        let current = self.require_node(&spec.id)?;
        let mut updated = current.clone();
        updated.position = spec.position;
        updated.data = spec.data.clone();
        updated.ports = self.rebuild_ports(current, &spec.ports)?;
        self.commit_node(updated)
    }

    /// Delete a node and every edge attached to it.
    ///
    /// Emits one `edge:deleted` per removed edge, then `node:deleted`.
    /// Returns `false` if the node does not exist.
    pub fn delete_node(&mut self, id: &NodeId) -> bool {
        self.remove_node(id).is_some()
    }

    /// Delete a node, returning it with the edges removed by the cascade
    pub(crate) fn remove_node(&mut self, id: &NodeId) -> Option<(Node, Vec<Edge>)> {
        let edge_ids = self.node_edge_ids(id)?;

        let mut removed = Vec::with_capacity(edge_ids.len());
        for edge_id in edge_ids {
            if let Some(edge) = self.remove_edge(&edge_id) {
                removed.push(edge);
            }
        }
        tracing::trace!("Cascade removed {} edges of node {id}", removed.len());

        let mut node = self.nodes.swap_remove(id)?;
        if self.selected_nodes.shift_remove(id) {
            node.selected = false;
        }

        tracing::debug!("Deleted node {id}");
        self.events.emit(GraphEvent::NodeDeleted { node: node.clone() });
        Some((node, removed))
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Connect two ports.
    ///
    /// A single-connection endpoint that is already occupied has its edge
    /// deleted first; if both endpoints are occupied both edges go.
    ///
    /// # Errors
    ///
    /// - [`GraphError::InvalidEdgeData`]: empty ids, duplicate edge id,
    ///   self-loop, or an endpoint node that does not exist
    /// - [`GraphError::ConnectionValidationFailed`]: missing port, same
    ///   direction, data type mismatch, or an existing edge between the same
    ///   ordered port pair
    pub fn create_edge(&mut self, spec: EdgeSpec) -> Result<Edge> {
        self.insert_edge(&spec).map(|(edge, _)| edge)
    }

    /// Connect two ports, returning the new edge and any edges it replaced
    pub(crate) fn insert_edge(&mut self, spec: &EdgeSpec) -> Result<(Edge, Vec<Edge>)> {
        let required = [
            ("id", spec.id.is_empty()),
            ("sourceNodeId", spec.source_node_id.is_empty()),
            ("sourcePortId", spec.source_port_id.is_empty()),
            ("targetNodeId", spec.target_node_id.is_empty()),
            ("targetPortId", spec.target_port_id.is_empty()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, empty)| *empty) {
            return Err(GraphError::invalid_edge(
                format!("{field} is empty"),
                json!({ "id": spec.id, "field": field }),
            ));
        }
        if self.edges.contains_key(&spec.id) {
            return Err(GraphError::invalid_edge(
                format!("edge {} already exists", spec.id),
                json!({ "id": spec.id }),
            ));
        }
        if spec.source_node_id == spec.target_node_id {
            return Err(GraphError::invalid_edge(
                "self-loops are not allowed",
                json!({ "id": spec.id, "nodeId": spec.source_node_id }),
            ));
        }

        let stale = {
            let source = self.endpoint(spec, &spec.source_node_id, &spec.source_port_id)?;
            let target = self.endpoint(spec, &spec.target_node_id, &spec.target_port_id)?;

            validation::check_compatibility(source, target)
                .map_err(|reason| GraphError::rejected(reason, edge_details(spec)))?;

            if self.edge_between(source, target).is_some() {
                return Err(GraphError::rejected(RejectReason::DuplicateEdge, edge_details(spec)));
            }

            let mut stale: Vec<EdgeId> = Vec::new();
            for port in [source, target] {
                if port.is_at_capacity() {
                    stale.extend(port.connections.iter().cloned());
                }
            }
            stale
        };

        let mut replaced = Vec::with_capacity(stale.len());
        for edge_id in stale {
            if let Some(edge) = self.remove_edge(&edge_id) {
                tracing::debug!("Edge {edge_id} replaced by {} on a single-connection port", spec.id);
                replaced.push(edge);
            }
        }

        let edge = Edge::from_spec(spec);
        for (node_id, port_id) in [
            (&edge.source_node_id, &edge.source_port_id),
            (&edge.target_node_id, &edge.target_port_id),
        ] {
            if let Some(port) = self.port_mut(node_id, port_id) {
                port.connections.insert(edge.id.clone());
            }
        }
        self.edges.insert(edge.id.clone(), edge.clone());

        tracing::debug!(
            "Created edge {}: {}.{} -> {}.{}",
            edge.id,
            edge.source_node_id,
            edge.source_port_id,
            edge.target_node_id,
            edge.target_port_id
        );
        self.events.emit(GraphEvent::EdgeCreated { edge: edge.clone() });
        Ok((edge, replaced))
    }

    /// Merge keys into an edge's payload. Endpoints cannot change.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidEdgeData`] if the edge is unknown.
    pub fn update_edge(&mut self, id: &EdgeId, data: DataMap) -> Result<Edge> {
        let mut merged = self.require_edge(id)?.data.clone();
        for (key, value) in data {
            merged.insert(key, value);
        }
        self.set_edge_data(id, merged)
    }

    /// Replace an edge's payload
    pub(crate) fn set_edge_data(&mut self, id: &EdgeId, data: DataMap) -> Result<Edge> {
        let edge = self
            .edges
            .get_mut(id)
            .ok_or_else(|| unknown_edge(id))?;
        let previous = std::mem::replace(&mut edge.data, data);
        let updated = edge.clone();
        let previous = Edge {
            data: previous,
            ..updated.clone()
        };

        self.events.emit(GraphEvent::EdgeUpdated {
            edge: updated.clone(),
            previous,
        });
        Ok(updated)
    }

    /// Delete an edge. Returns `false` if it does not exist.
    pub fn delete_edge(&mut self, id: &EdgeId) -> bool {
        self.remove_edge(id).is_some()
    }

    pub(crate) fn remove_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        let mut edge = self.edges.swap_remove(id)?;
        for (node_id, port_id) in [
            (&edge.source_node_id, &edge.source_port_id),
            (&edge.target_node_id, &edge.target_port_id),
        ] {
            if let Some(port) = self.port_mut(node_id, port_id) {
                port.connections.shift_remove(id);
            }
        }
        if self.selected_edges.shift_remove(id) {
            edge.selected = false;
        }

        tracing::debug!("Deleted edge {id}");
        self.events.emit(GraphEvent::EdgeDeleted { edge: edge.clone() });
        Some(edge)
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    /// Create several nodes; failures do not stop the rest
    pub fn create_nodes(
        &mut self,
        specs: Vec<NodeSpec>,
    ) -> std::result::Result<Vec<Node>, BatchError<Node, NodeSpec>> {
        run_batch(specs, |spec| self.insert_node(spec))
    }

    /// Update several nodes; failures do not stop the rest
    pub fn update_nodes(
        &mut self,
        updates: Vec<(NodeId, NodeUpdate)>,
    ) -> std::result::Result<Vec<Node>, BatchError<Node, (NodeId, NodeUpdate)>> {
        run_batch(updates, |(id, update)| self.update_node(id, update.clone()))
    }

    /// Create several edges; failures do not stop the rest
    pub fn create_edges(
        &mut self,
        specs: Vec<EdgeSpec>,
    ) -> std::result::Result<Vec<Edge>, BatchError<Edge, EdgeSpec>> {
        run_batch(specs, |spec| self.insert_edge(spec).map(|(edge, _)| edge))
    }

    /// Delete several nodes, returning how many existed
    pub fn delete_nodes(&mut self, ids: &[NodeId]) -> usize {
        ids.iter().filter(|id| self.delete_node(id)).count()
    }

    /// Delete several edges, returning how many existed
    pub fn delete_edges(&mut self, ids: &[EdgeId]) -> usize {
        ids.iter().filter(|id| self.delete_edge(id)).count()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Get a node by ID
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether a node exists
    pub fn has_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Get a port of a node
    pub fn port(&self, node_id: &NodeId, port_id: &PortId) -> Option<&Port> {
        self.nodes.get(node_id)?.ports.get(port_id)
    }

    /// Get an edge by ID
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Get all edges
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether an edge exists
    pub fn has_edge(&self, id: &EdgeId) -> bool {
        self.edges.contains_key(id)
    }

    /// Edges attached to any port of a node
    pub fn edges_by_node(&self, node_id: &NodeId) -> Vec<&Edge> {
        let ids = self.node_edge_ids(node_id).unwrap_or_default();
        ids.iter().filter_map(|id| self.edges.get(id)).collect()
    }

    /// Edges attached to one port
    pub fn edges_by_port(&self, node_id: &NodeId, port_id: &PortId) -> Vec<&Edge> {
        self.port(node_id, port_id)
            .map(|port| port.connections.iter().filter_map(|id| self.edges.get(id)).collect())
            .unwrap_or_default()
    }

    /// Advisory check whether an edge between two ports would be accepted
    /// without replacing anything
    pub fn can_connect(
        &self,
        source_node: &NodeId,
        source_port: &PortId,
        target_node: &NodeId,
        target_port: &PortId,
    ) -> ConnectionCheck {
        if source_node == target_node {
            return ConnectionCheck::rejected(RejectReason::SelfLoop);
        }
        let source = match self.lookup_port(source_node, source_port) {
            Ok(port) => port,
            Err(reason) => return ConnectionCheck::rejected(reason),
        };
        let target = match self.lookup_port(target_node, target_port) {
            Ok(port) => port,
            Err(reason) => return ConnectionCheck::rejected(reason),
        };

        validation::can_connect(source, target, self.edge_between(source, target).is_some())
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Add a node to the selection. Returns `false` if unknown or already selected.
    pub fn select_node(&mut self, id: &NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if !self.selected_nodes.insert(id.clone()) {
            return false;
        }
        node.selected = true;
        let node = node.clone();
        self.events.emit(GraphEvent::NodeSelected { node });
        true
    }

    /// Remove a node from the selection. Returns `false` if it was not selected.
    pub fn deselect_node(&mut self, id: &NodeId) -> bool {
        if !self.selected_nodes.shift_remove(id) {
            return false;
        }
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.selected = false;
        let node = node.clone();
        self.events.emit(GraphEvent::NodeDeselected { node });
        true
    }

    /// Add an edge to the selection. Returns `false` if unknown or already selected.
    pub fn select_edge(&mut self, id: &EdgeId) -> bool {
        let Some(edge) = self.edges.get_mut(id) else {
            return false;
        };
        if !self.selected_edges.insert(id.clone()) {
            return false;
        }
        edge.selected = true;
        let edge = edge.clone();
        self.events.emit(GraphEvent::EdgeSelected { edge });
        true
    }

    /// Remove an edge from the selection. Returns `false` if it was not selected.
    pub fn deselect_edge(&mut self, id: &EdgeId) -> bool {
        if !self.selected_edges.shift_remove(id) {
            return false;
        }
        let Some(edge) = self.edges.get_mut(id) else {
            return false;
        };
        edge.selected = false;
        let edge = edge.clone();
        self.events.emit(GraphEvent::EdgeDeselected { edge });
        true
    }

    /// Deselect everything
    pub fn clear_selection(&mut self) {
        let nodes: Vec<NodeId> = self.selected_nodes.iter().cloned().collect();
        for id in &nodes {
            self.deselect_node(id);
        }
        let edges: Vec<EdgeId> = self.selected_edges.iter().cloned().collect();
        for id in &edges {
            self.deselect_edge(id);
        }
    }

    /// Selected node IDs, in selection order
    pub fn selected_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.selected_nodes.iter()
    }

    /// Selected edge IDs, in selection order
    pub fn selected_edges(&self) -> impl Iterator<Item = &EdgeId> {
        self.selected_edges.iter()
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Capture all nodes and edges as specs
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().map(Node::to_spec).collect(),
            edges: self.edges.values().map(Edge::to_spec).collect(),
        }
    }

    /// Replace the whole graph with a snapshot.
    ///
    /// Nodes are imported as captured, without type defaults, and before
    /// edges. Items that fail are reported
    /// together; the rest stay imported.
    pub fn load_snapshot(
        &mut self,
        snapshot: GraphSnapshot,
    ) -> std::result::Result<(), BatchError<SnapshotItem, SnapshotItem>> {
        self.clear();

        let items = snapshot
            .nodes
            .into_iter()
            .map(SnapshotItem::Node)
            .chain(snapshot.edges.into_iter().map(SnapshotItem::Edge))
            .collect();
        let imported = run_batch(items, |item| {
            let result = match item {
                SnapshotItem::Node(spec) => self.reinsert_node(spec).map(drop),
                SnapshotItem::Edge(spec) => self.insert_edge(spec).map(drop),
            };
            result.map(|()| item.clone())
        })?;

        tracing::debug!("Loaded snapshot with {} items", imported.len());
        Ok(())
    }

    /// Delete every node and edge, emitting the usual events
    pub fn clear(&mut self) {
        let ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        for id in &ids {
            self.delete_node(id);
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_node(&self, id: &NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or_else(|| {
            GraphError::invalid_node(format!("node {id} does not exist"), json!({ "id": id }))
        })
    }

    fn require_edge(&self, id: &EdgeId) -> Result<&Edge> {
        self.edges.get(id).ok_or_else(|| unknown_edge(id))
    }

    fn commit_node(&mut self, updated: Node) -> Result<Node> {
        if !updated.position.is_finite() {
            return Err(GraphError::invalid_node(
                "position is not finite",
                json!({ "id": updated.id, "field": "position" }),
            ));
        }
        let Some(slot) = self.nodes.get_mut(&updated.id) else {
            return Err(GraphError::invalid_node(
                format!("node {} does not exist", updated.id),
                json!({ "id": updated.id }),
            ));
        };
        let previous = std::mem::replace(slot, updated.clone());

        tracing::debug!("Updated node {}", updated.id);
        self.events.emit(GraphEvent::NodeUpdated {
            node: updated.clone(),
            previous,
        });
        Ok(updated)
    }

    /// Build a replacement port table, carrying over connections of ports
    /// that survive by id.
    fn rebuild_ports(&self, node: &Node, specs: &[PortSpec]) -> Result<IndexMap<PortId, Port>> {
        validate_port_specs(&node.id, specs)?;

        let mut ports: IndexMap<PortId, Port> = specs
            .iter()
            .map(|spec| (spec.id.clone(), Port::from_spec(node.id.clone(), spec)))
            .collect();

        for old in node.ports.values().filter(|port| port.is_connected()) {
            let details = json!({ "id": node.id, "portId": old.id });
            let Some(new) = ports.get_mut(&old.id) else {
                return Err(GraphError::invalid_node(
                    format!("port {} still has connections", old.id),
                    details,
                ));
            };
            if new.direction != old.direction {
                return Err(GraphError::invalid_node(
                    format!("port {} cannot change direction while connected", old.id),
                    details,
                ));
            }
            if !new.allow_multiple && old.connections.len() > 1 {
                return Err(GraphError::invalid_node(
                    format!("port {} has several connections and cannot become single", old.id),
                    details,
                ));
            }

            for edge_id in &old.connections {
                let Some(edge) = self.edges.get(edge_id) else {
                    continue;
                };
                let compatible = if edge.source_node_id == node.id {
                    self.port(&edge.target_node_id, &edge.target_port_id)
                        .map(|peer| validation::check_compatibility(new, peer))
                } else {
                    self.port(&edge.source_node_id, &edge.source_port_id)
                        .map(|peer| validation::check_compatibility(peer, new))
                };
                if let Some(Err(reason)) = compatible {
                    return Err(GraphError::invalid_node(
                        format!("port {} would break edge {edge_id}: {reason}", old.id),
                        details,
                    ));
                }
            }

            new.connections = old.connections.clone();
        }

        Ok(ports)
    }

    fn port_mut(&mut self, node_id: &NodeId, port_id: &PortId) -> Option<&mut Port> {
        self.nodes.get_mut(node_id)?.ports.get_mut(port_id)
    }

    fn lookup_port(&self, node_id: &NodeId, port_id: &PortId) -> std::result::Result<&Port, RejectReason> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| RejectReason::NodeNotFound(node_id.clone()))?;
        node.ports.get(port_id).ok_or_else(|| RejectReason::PortNotFound {
            node_id: node_id.clone(),
            port_id: port_id.clone(),
        })
    }

    /// Resolve an edge endpoint, mapping a missing node to invalid edge data
    /// and a missing port to a validation failure
    fn endpoint(&self, spec: &EdgeSpec, node_id: &NodeId, port_id: &PortId) -> Result<&Port> {
        match self.lookup_port(node_id, port_id) {
            Ok(port) => Ok(port),
            Err(RejectReason::NodeNotFound(missing)) => Err(GraphError::invalid_edge(
                format!("node {missing} does not exist"),
                json!({ "id": spec.id, "nodeId": missing }),
            )),
            Err(reason) => Err(GraphError::rejected(reason, edge_details(spec))),
        }
    }

    fn edge_between(&self, source: &Port, target: &Port) -> Option<&Edge> {
        source
            .connections
            .iter()
            .filter_map(|id| self.edges.get(id))
            .find(|edge| edge.connects(&source.node_id, &source.id, &target.node_id, &target.id))
    }

    fn node_edge_ids(&self, node_id: &NodeId) -> Option<Vec<EdgeId>> {
        let node = self.nodes.get(node_id)?;
        let mut seen = HashSet::new();
        Some(
            node.ports
                .values()
                .flat_map(|port| port.connections.iter())
                .filter(|id| seen.insert(*id))
                .cloned()
                .collect(),
        )
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_port_specs(node_id: &NodeId, specs: &[PortSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if spec.id.is_empty() {
            return Err(GraphError::invalid_node(
                "port id is empty",
                json!({ "id": node_id, "field": "ports" }),
            ));
        }
        if !seen.insert(&spec.id) {
            return Err(GraphError::invalid_node(
                format!("duplicate port id {}", spec.id),
                json!({ "id": node_id, "portId": spec.id }),
            ));
        }
    }
    Ok(())
}

fn unknown_edge(id: &EdgeId) -> GraphError {
    GraphError::invalid_edge(format!("edge {id} does not exist"), json!({ "id": id }))
}

fn edge_details(spec: &EdgeSpec) -> serde_json::Value {
    json!({
        "id": spec.id,
        "sourceNodeId": spec.source_node_id,
        "sourcePortId": spec.source_port_id,
        "targetNodeId": spec.target_node_id,
        "targetPortId": spec.target_port_id,
    })
}

/// Apply `op` to every item, collecting successes and failures
pub(crate) fn run_batch<I, T, F>(items: Vec<I>, mut op: F) -> std::result::Result<Vec<T>, BatchError<T, I>>
where
    I: std::fmt::Debug,
    T: std::fmt::Debug,
    F: FnMut(&I) -> Result<T>,
{
    let mut successes = Vec::with_capacity(items.len());
    let mut failures = Vec::new();
    for item in items {
        match op(&item) {
            Ok(value) => successes.push(value),
            Err(error) => {
                tracing::debug!("Batch item failed: {error}");
                failures.push(BatchFailure { item, error });
            }
        }
    }
    BatchError::check(successes, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::events::EventType;
    use crate::port::PortSpec;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn nid(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn pid(id: &str) -> PortId {
        PortId::from(id)
    }

    fn eid(id: &str) -> EdgeId {
        EdgeId::from(id)
    }

    /// A and C have a string output `O`, B has string inputs `I` (single) and `M` (multi)
    fn sample_store() -> EntityStore {
        let mut store = EntityStore::new();
        store
            .create_node(
                NodeSpec::with_id("A", "default")
                    .with_port(PortSpec::output("O").with_data_type("string").multiple()),
            )
            .unwrap();
        store
            .create_node(
                NodeSpec::with_id("B", "default")
                    .at(200.0, 0.0)
                    .with_port(PortSpec::input("I").with_data_type("string"))
                    .with_port(PortSpec::input("M").with_data_type("string").multiple()),
            )
            .unwrap();
        store
            .create_node(
                NodeSpec::with_id("C", "default")
                    .at(0.0, 200.0)
                    .with_port(PortSpec::output("O").with_data_type("string").multiple()),
            )
            .unwrap();
        store
    }

    fn record_events(store: &mut EntityStore, types: &[EventType]) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for event_type in types {
            let log = Rc::clone(&log);
            store.events_mut().on(*event_type, move |event| {
                let id = event
                    .node_id()
                    .map(|id| id.to_string())
                    .or_else(|| event.edge_id().map(|id| id.to_string()))
                    .unwrap_or_default();
                log.borrow_mut().push(format!("{}:{id}", event.event_type()));
            });
        }
        log
    }

    #[test]
    fn test_create_edge_between_matching_types() {
        let mut store = sample_store();
        let edge = store
            .create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I"))
            .unwrap();

        assert_eq!(edge.id, eid("E1"));
        assert_eq!(store.edges_by_node(&nid("A")).len(), 1);
        assert_eq!(store.edges_by_port(&nid("B"), &pid("I")).len(), 1);
        assert!(store.port(&nid("A"), &pid("O")).unwrap().connections.contains(&eid("E1")));
    }

    #[test]
    fn test_mismatched_types_rejected() {
        let mut store = sample_store();
        store
            .create_node(
                NodeSpec::with_id("N", "default").with_port(PortSpec::input("I").with_data_type("number")),
            )
            .unwrap();

        let err = store
            .create_edge(EdgeSpec::with_id("E1", "A", "O", "N", "I"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionValidationFailed);
        assert!(!store.has_edge(&eid("E1")));
        assert!(!store.can_connect(&nid("A"), &pid("O"), &nid("N"), &pid("I")).ok);
    }

    #[test]
    fn test_same_direction_agrees_with_can_connect() {
        let mut store = sample_store();
        let check = store.can_connect(&nid("A"), &pid("O"), &nid("C"), &pid("O"));
        assert_eq!(check.reason, Some(RejectReason::SameDirection));

        let err = store
            .create_edge(EdgeSpec::with_id("E1", "A", "O", "C", "O"))
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::ConnectionValidationFailed {
                reason: RejectReason::SameDirection,
                ..
            }
        ));
    }

    #[test]
    fn test_single_connection_replacement() {
        crate::test_support::init_tracing();
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();
        let (_, replaced) = store
            .insert_edge(&EdgeSpec::with_id("E2", "C", "O", "B", "I"))
            .unwrap();

        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].id, eid("E1"));
        assert!(!store.has_edge(&eid("E1")));
        assert!(store.has_edge(&eid("E2")));

        let port = store.port(&nid("B"), &pid("I")).unwrap();
        assert_eq!(port.connections.len(), 1);
        assert!(port.connections.contains(&eid("E2")));
        // A's output no longer references the replaced edge
        assert!(store.port(&nid("A"), &pid("O")).unwrap().connections.is_empty());
    }

    #[test]
    fn test_replacement_on_both_ends() {
        let mut store = EntityStore::new();
        for (id, port) in [
            ("S1", PortSpec::output("o")),
            ("S2", PortSpec::output("o")),
            ("T1", PortSpec::input("i")),
            ("T2", PortSpec::input("i")),
        ] {
            store.create_node(NodeSpec::with_id(id, "default").with_port(port)).unwrap();
        }
        store.create_edge(EdgeSpec::with_id("E1", "S1", "o", "T1", "i")).unwrap();
        store.create_edge(EdgeSpec::with_id("E2", "S2", "o", "T2", "i")).unwrap();

        let (_, replaced) = store
            .insert_edge(&EdgeSpec::with_id("E3", "S1", "o", "T2", "i"))
            .unwrap();

        assert_eq!(replaced.len(), 2);
        assert_eq!(store.edge_count(), 1);
        assert!(store.has_edge(&eid("E3")));
        assert!(store.port(&nid("S2"), &pid("o")).unwrap().connections.is_empty());
        assert!(store.port(&nid("T1"), &pid("i")).unwrap().connections.is_empty());
    }

    #[test]
    fn test_can_connect_reports_capacity_but_create_replaces() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();

        let check = store.can_connect(&nid("C"), &pid("O"), &nid("B"), &pid("I"));
        assert!(matches!(check.reason, Some(RejectReason::PortAtCapacity { .. })));
        assert!(store.create_edge(EdgeSpec::with_id("E2", "C", "O", "B", "I")).is_ok());
    }

    #[test]
    fn test_duplicate_port_pair_rejected() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "M")).unwrap();
        let err = store
            .create_edge(EdgeSpec::with_id("E2", "A", "O", "B", "M"))
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::ConnectionValidationFailed {
                reason: RejectReason::DuplicateEdge,
                ..
            }
        ));
        assert_eq!(store.edge_count(), 1);
        assert_eq!(
            store.can_connect(&nid("A"), &pid("O"), &nid("B"), &pid("M")).reason,
            Some(RejectReason::DuplicateEdge)
        );
    }

    #[test]
    fn test_self_loop_rejected_before_port_checks() {
        let mut store = sample_store();
        let err = store
            .create_edge(EdgeSpec::with_id("E1", "A", "missing", "A", "nope"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdgeData);
        assert_eq!(
            store.can_connect(&nid("A"), &pid("O"), &nid("A"), &pid("O")).reason,
            Some(RejectReason::SelfLoop)
        );
    }

    #[test]
    fn test_edge_input_errors() {
        let mut store = sample_store();

        let err = store.create_edge(EdgeSpec::with_id("", "A", "O", "B", "I")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdgeData);

        let err = store.create_edge(EdgeSpec::with_id("E1", "Z", "O", "B", "I")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdgeData);

        let err = store.create_edge(EdgeSpec::with_id("E1", "A", "X", "B", "I")).unwrap_err();
        assert!(matches!(
            err,
            GraphError::ConnectionValidationFailed {
                reason: RejectReason::PortNotFound { .. },
                ..
            }
        ));

        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "M")).unwrap();
        let err = store.create_edge(EdgeSpec::with_id("E1", "C", "O", "B", "M")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdgeData);
    }

    #[test]
    fn test_create_node_validation() {
        let mut store = EntityStore::new();

        let err = store.create_node(NodeSpec::with_id("", "default")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        let err = store.create_node(NodeSpec::with_id("a", "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        let err = store.create_node(NodeSpec::with_id("a", "unknown")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        let err = store
            .create_node(NodeSpec::with_id("a", "default").at(f64::INFINITY, 0.0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        let err = store
            .create_node(
                NodeSpec::with_id("a", "default")
                    .with_port(PortSpec::input("p"))
                    .with_port(PortSpec::output("p")),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_duplicate_node_leaves_store_unchanged() {
        let mut store = sample_store();
        let before = store.snapshot();
        let err = store
            .create_node(NodeSpec::with_id("A", "default").with_data("label", "other"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_type_defaults_applied() {
        let mut store = EntityStore::new();
        store.register_node_type(
            NodeTypeDefinition::new("task")
                .with_default("label", "Task")
                .with_default("timeout", 30)
                .with_port(PortSpec::input("in"))
                .with_port(PortSpec::output("out").multiple()),
        );

        let node = store
            .create_node(NodeSpec::with_id("t1", "task").with_data("label", "Upload"))
            .unwrap();
        assert_eq!(node.data["label"], "Upload");
        assert_eq!(node.data["timeout"], 30);
        assert_eq!(node.ports.len(), 2);
        assert_eq!(node.port(&pid("in")).unwrap().node_id, nid("t1"));

        store.unregister_node_type("task");
        assert!(store.has_node(&nid("t1")));
        assert!(store.create_node(NodeSpec::with_id("t2", "task")).is_err());
    }

    #[test]
    fn test_update_node_partial() {
        let mut store = sample_store();
        store
            .update_node(&nid("A"), NodeUpdate::new().with_data("label", "first"))
            .unwrap();
        let node = store
            .update_node(
                &nid("A"),
                NodeUpdate::new().move_y(42.0).with_data("color", "red"),
            )
            .unwrap();

        assert_eq!(node.position.x, 0.0);
        assert_eq!(node.position.y, 42.0);
        assert_eq!(node.data["label"], "first");
        assert_eq!(node.data["color"], "red");

        let err = store.update_node(&nid("missing"), NodeUpdate::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        let err = store
            .update_node(&nid("A"), NodeUpdate::new().move_x(f64::NAN))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);
        assert_eq!(store.node(&nid("A")).unwrap().position.x, 0.0);
    }

    #[test]
    fn test_update_node_emits_previous_state() {
        let mut store = sample_store();
        let previous = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&previous);
        store.events_mut().on(EventType::NodeUpdated, move |event| {
            if let GraphEvent::NodeUpdated { previous, .. } = event {
                *slot.borrow_mut() = Some(previous.position.x);
            }
        });

        store.update_node(&nid("B"), NodeUpdate::new().move_x(10.0)).unwrap();
        assert_eq!(*previous.borrow(), Some(200.0));
    }

    #[test]
    fn test_port_replacement_keeps_surviving_connections() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();

        let node = store
            .update_node(
                &nid("B"),
                NodeUpdate::new().with_ports(vec![
                    PortSpec::input("I").with_data_type("string"),
                    PortSpec::input("extra"),
                ]),
            )
            .unwrap();

        assert!(node.port(&pid("M")).is_none());
        assert!(node.port(&pid("I")).unwrap().connections.contains(&eid("E1")));
        assert_eq!(store.edges_by_node(&nid("B")).len(), 1);
    }

    #[test]
    fn test_port_replacement_cannot_orphan_edges() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();

        // Removing the connected port
        let err = store
            .update_node(&nid("B"), NodeUpdate::new().with_ports(vec![PortSpec::input("M")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        // Changing its type away from the peer's
        let err = store
            .update_node(
                &nid("B"),
                NodeUpdate::new().with_ports(vec![PortSpec::input("I").with_data_type("number")]),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        // Flipping direction
        let err = store
            .update_node(&nid("B"), NodeUpdate::new().with_ports(vec![PortSpec::output("I")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);

        assert!(store.port(&nid("B"), &pid("M")).is_some());
        assert!(store.has_edge(&eid("E1")));
    }

    #[test]
    fn test_port_replacement_respects_capacity() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "M")).unwrap();
        store.create_edge(EdgeSpec::with_id("E2", "C", "O", "B", "M")).unwrap();

        let err = store
            .update_node(&nid("B"), NodeUpdate::new().with_ports(vec![PortSpec::input("M")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeData);
    }

    #[test]
    fn test_cascade_delete() {
        crate::test_support::init_tracing();
        let mut store = sample_store();
        store
            .create_node(NodeSpec::with_id("D", "default").with_port(PortSpec::input("I").multiple()))
            .unwrap();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();
        store.create_edge(EdgeSpec::with_id("E2", "A", "O", "B", "M")).unwrap();
        store.create_edge(EdgeSpec::with_id("E3", "C", "O", "D", "I")).unwrap();

        let log = record_events(&mut store, &[EventType::EdgeDeleted, EventType::NodeDeleted]);
        assert!(store.delete_node(&nid("A")));

        assert!(!store.has_node(&nid("A")));
        assert!(!store.has_edge(&eid("E1")));
        assert!(!store.has_edge(&eid("E2")));
        assert!(store.has_edge(&eid("E3")));
        assert_eq!(store.node_count(), 3);
        assert!(store.edges_by_node(&nid("B")).is_empty());
        assert!(store.port(&nid("B"), &pid("I")).unwrap().connections.is_empty());

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert!(log[..2].iter().all(|entry| entry.starts_with("edge:deleted")));
        assert_eq!(log[2], "node:deleted:A");

        assert!(!store.delete_node(&nid("A")));
    }

    #[test]
    fn test_delete_edge_detaches_ports() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();
        assert!(store.delete_edge(&eid("E1")));
        assert!(!store.delete_edge(&eid("E1")));
        assert!(store.port(&nid("A"), &pid("O")).unwrap().connections.is_empty());
        assert!(store.port(&nid("B"), &pid("I")).unwrap().connections.is_empty());
    }

    #[test]
    fn test_update_edge_merges_data() {
        let mut store = sample_store();
        store
            .create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I").with_data("label", "a"))
            .unwrap();

        let mut data = DataMap::new();
        data.insert("weight".to_string(), json!(2));
        let edge = store.update_edge(&eid("E1"), data.clone()).unwrap();
        assert_eq!(edge.data["label"], "a");
        assert_eq!(edge.data["weight"], 2);
        assert_eq!(edge.source_node_id, nid("A"));

        let err = store.update_edge(&eid("missing"), data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdgeData);
    }

    #[test]
    fn test_batch_partial_failure() {
        let mut store = EntityStore::new();
        let err = store
            .create_nodes(vec![
                NodeSpec::with_id("a", "default"),
                NodeSpec::with_id("", "default"),
                NodeSpec::with_id("b", "default"),
                NodeSpec::with_id("a", "default"),
            ])
            .unwrap_err();

        assert_eq!(err.successes.len(), 2);
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[1].item.id, nid("a"));
        assert_eq!(
            err.failure_kinds(),
            vec![ErrorKind::InvalidNodeData, ErrorKind::InvalidNodeData]
        );
        assert!(store.has_node(&nid("a")));
        assert!(store.has_node(&nid("b")));
    }

    #[test]
    fn test_batch_edges_and_deletes() {
        let mut store = sample_store();
        let edges = store
            .create_edges(vec![
                EdgeSpec::with_id("E1", "A", "O", "B", "M"),
                EdgeSpec::with_id("E2", "C", "O", "B", "M"),
            ])
            .unwrap();
        assert_eq!(edges.len(), 2);

        assert_eq!(store.delete_edges(&[eid("E1"), eid("missing")]), 1);
        assert_eq!(store.delete_nodes(&[nid("A"), nid("C"), nid("missing")]), 2);
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_batch_updates() {
        let mut store = sample_store();
        let err = store
            .update_nodes(vec![
                (nid("A"), NodeUpdate::new().move_x(1.0)),
                (nid("missing"), NodeUpdate::new().move_x(1.0)),
            ])
            .unwrap_err();
        assert_eq!(err.successes.len(), 1);
        assert_eq!(err.failures[0].item.0, nid("missing"));
        assert_eq!(store.node(&nid("A")).unwrap().position.x, 1.0);
    }

    #[test]
    fn test_selection_mirrors_flag() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();
        let log = record_events(
            &mut store,
            &[EventType::NodeSelected, EventType::NodeDeselected, EventType::EdgeSelected],
        );

        assert!(store.select_node(&nid("A")));
        assert!(!store.select_node(&nid("A")));
        assert!(!store.select_node(&nid("missing")));
        assert!(store.select_edge(&eid("E1")));
        assert!(store.node(&nid("A")).unwrap().selected);
        assert!(store.edge(&eid("E1")).unwrap().selected);

        store.clear_selection();
        assert_eq!(store.selected_nodes().count(), 0);
        assert_eq!(store.selected_edges().count(), 0);
        assert!(!store.node(&nid("A")).unwrap().selected);
        assert!(!store.edge(&eid("E1")).unwrap().selected);

        assert_eq!(
            *log.borrow(),
            vec!["node:selected:A", "edge:selected:E1", "node:deselected:A"]
        );
    }

    #[test]
    fn test_deleting_selected_node_clears_selection() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();
        store.select_node(&nid("A"));
        store.select_edge(&eid("E1"));

        store.delete_node(&nid("A"));
        assert_eq!(store.selected_nodes().count(), 0);
        assert_eq!(store.selected_edges().count(), 0);
    }

    #[test]
    fn test_snapshot_load() {
        let mut store = sample_store();
        store.create_edge(EdgeSpec::with_id("E1", "A", "O", "B", "I")).unwrap();
        let snapshot = store.snapshot();

        let mut copy = EntityStore::new();
        copy.create_node(NodeSpec::with_id("stale", "default")).unwrap();
        copy.load_snapshot(snapshot.clone()).unwrap();

        assert!(!copy.has_node(&nid("stale")));
        assert_eq!(copy.node_count(), 3);
        assert!(copy.has_edge(&eid("E1")));
        assert!(copy.port(&nid("B"), &pid("I")).unwrap().connections.contains(&eid("E1")));
    }

    #[test]
    fn test_snapshot_load_reports_bad_items() {
        let mut store = EntityStore::new();
        let snapshot = GraphSnapshot {
            nodes: vec![
                NodeSpec::with_id("a", "default").with_port(PortSpec::output("o")),
                NodeSpec::with_id("b", "unknown"),
            ],
            edges: vec![EdgeSpec::with_id("e", "a", "o", "b", "i")],
        };

        let err = store.load_snapshot(snapshot).unwrap_err();
        assert_eq!(err.successes.len(), 1);
        assert_eq!(err.failures.len(), 2);
        assert!(store.has_node(&nid("a")));
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_snapshot_keeps_emptied_port_list() {
        let task = NodeTypeDefinition::new("task")
            .with_default("label", "Task")
            .with_port(PortSpec::input("in"));
        let mut store = EntityStore::new();
        store.register_node_type(task.clone());
        store.create_node(NodeSpec::with_id("t", "task")).unwrap();
        store
            .update_node(&nid("t"), NodeUpdate::new().with_ports(Vec::new()))
            .unwrap();
        let snapshot = store.snapshot();
        assert!(snapshot.nodes[0].ports.is_empty());

        let mut copy = EntityStore::new();
        copy.register_node_type(task);
        copy.load_snapshot(snapshot.clone()).unwrap();

        assert_eq!(copy.node(&nid("t")).unwrap().ports.len(), 0);
        assert_eq!(copy.snapshot(), snapshot);
    }

    #[test]
    fn test_reinsert_skips_type_defaults() {
        let mut store = EntityStore::new();
        store.register_node_type(
            NodeTypeDefinition::new("task")
                .with_default("label", "Task")
                .with_port(PortSpec::input("in")),
        );

        let node = store.reinsert_node(&NodeSpec::with_id("t", "task")).unwrap();
        assert!(node.ports.is_empty());
        assert!(node.data.is_empty());

        let node = store.create_node(NodeSpec::with_id("u", "task")).unwrap();
        assert_eq!(node.ports.len(), 1);
        assert_eq!(node.data["label"], "Task");
    }
}
