// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions and the per-store node type registry.

use crate::port::{Port, PortId, PortSpec};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Opaque payload attached to nodes and edges
pub type DataMap = Map<String, Value>;

/// Name of the node type every registry starts with
pub const DEFAULT_NODE_TYPE: &str = "default";

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is usable as a key
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Position in graph space. The store does not interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Create a position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Creation-time description of a node, also its snapshot shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node ID
    pub id: NodeId,
    /// Node type name
    #[serde(rename = "type")]
    pub node_type: String,
    /// Position
    pub position: Position,
    /// Payload
    #[serde(default)]
    pub data: DataMap,
    /// Ports; empty means "use the type's default ports"
    #[serde(default)]
    pub ports: Vec<PortSpec>,
}

impl NodeSpec {
    /// Create a spec with a fresh random id
    pub fn new(node_type: impl Into<String>) -> Self {
        Self::with_id(NodeId::new(), node_type)
    }

    /// Create a spec with an explicit id
    pub fn with_id(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            position: Position::default(),
            data: DataMap::new(),
            ports: Vec::new(),
        }
    }

    /// Set the position
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Set one payload entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add a port
    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.ports.push(port);
        self
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node ID
    pub id: NodeId,
    /// Node type name
    #[serde(rename = "type")]
    pub node_type: String,
    /// Position
    pub position: Position,
    /// Payload
    pub data: DataMap,
    /// Ports by id
    pub ports: IndexMap<PortId, Port>,
    /// Mirrors selection state
    pub selected: bool,
}

impl Node {
    /// Get a port by ID
    pub fn port(&self, port_id: &PortId) -> Option<&Port> {
        self.ports.get(port_id)
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Snapshot of this node without index state
    pub fn to_spec(&self) -> NodeSpec {
        NodeSpec {
            id: self.id.clone(),
            node_type: self.node_type.clone(),
            position: self.position,
            data: self.data.clone(),
            ports: self.ports.values().map(Port::to_spec).collect(),
        }
    }
}

/// Partial position change
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// New x, if any
    pub x: Option<f64>,
    /// New y, if any
    pub y: Option<f64>,
}

/// Partial node update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    /// Position change
    pub position: Option<PositionUpdate>,
    /// Keys merged over the current payload
    pub data: Option<DataMap>,
    /// Replacement port list
    pub ports: Option<Vec<PortSpec>>,
}

impl NodeUpdate {
    /// Create an empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to an absolute position
    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        self.position = Some(PositionUpdate {
            x: Some(x),
            y: Some(y),
        });
        self
    }

    /// Change only the x coordinate
    pub fn move_x(mut self, x: f64) -> Self {
        self.position.get_or_insert_with(PositionUpdate::default).x = Some(x);
        self
    }

    /// Change only the y coordinate
    pub fn move_y(mut self, y: f64) -> Self {
        self.position.get_or_insert_with(PositionUpdate::default).y = Some(y);
        self
    }

    /// Merge one payload entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(DataMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replace the port list
    pub fn with_ports(mut self, ports: Vec<PortSpec>) -> Self {
        self.ports = Some(ports);
        self
    }
}

/// Node type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDefinition {
    /// Unique type name
    pub type_name: String,
    /// Payload merged under caller data at creation
    #[serde(default)]
    pub default_data: DataMap,
    /// Ports used when the caller gives none
    #[serde(default)]
    pub default_ports: Vec<PortSpec>,
}

impl NodeTypeDefinition {
    /// Create a definition with no defaults
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            default_data: DataMap::new(),
            default_ports: Vec::new(),
        }
    }

    /// Add a default payload entry
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_data.insert(key.into(), value.into());
        self
    }

    /// Add a default port
    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.default_ports.push(port);
        self
    }

    /// Payload for a new node: defaults overlaid by the caller's keys
    pub fn merge_data(&self, data: &DataMap) -> DataMap {
        let mut merged = self.default_data.clone();
        for (key, value) in data {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Registry of node types known to one store
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    /// Registered node types by name
    types: IndexMap<String, NodeTypeDefinition>,
}

impl NodeTypeRegistry {
    /// Create a registry holding only the `default` type
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(NodeTypeDefinition::new(DEFAULT_NODE_TYPE));
        registry
    }

    /// Create a registry with no types at all
    pub fn empty() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Register a node type, returning the definition it replaced
    pub fn register(&mut self, node_type: NodeTypeDefinition) -> Option<NodeTypeDefinition> {
        self.types.insert(node_type.type_name.clone(), node_type)
    }

    /// Remove a node type. Existing nodes of that type are untouched.
    pub fn unregister(&mut self, type_name: &str) -> Option<NodeTypeDefinition> {
        self.types.shift_remove(type_name)
    }

    /// Get a node type by name
    pub fn get(&self, type_name: &str) -> Option<&NodeTypeDefinition> {
        self.types.get(type_name)
    }

    /// Whether a type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeDefinition> {
        self.types.values()
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
