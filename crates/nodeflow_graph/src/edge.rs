// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge definitions for the graph.

use crate::node::{DataMap, NodeId};
use crate::port::PortId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    /// Create a new random edge ID
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

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EdgeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Creation-time description of an edge, also its snapshot shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSpec {
    /// Edge ID
    pub id: EdgeId,
    /// Source node ID
    pub source_node_id: NodeId,
    /// Source port ID
    pub source_port_id: PortId,
    /// Target node ID
    pub target_node_id: NodeId,
    /// Target port ID
    pub target_port_id: PortId,
    /// Payload
    #[serde(default)]
    pub data: DataMap,
}

impl EdgeSpec {
    /// Create a spec with a fresh random id
    pub fn new(
        source_node_id: impl Into<NodeId>,
        source_port_id: impl Into<PortId>,
        target_node_id: impl Into<NodeId>,
        target_port_id: impl Into<PortId>,
    ) -> Self {
        Self::with_id(
            EdgeId::new(),
            source_node_id,
            source_port_id,
            target_node_id,
            target_port_id,
        )
    }

    /// Create a spec with an explicit id
    pub fn with_id(
        id: impl Into<EdgeId>,
        source_node_id: impl Into<NodeId>,
        source_port_id: impl Into<PortId>,
        target_node_id: impl Into<NodeId>,
        target_port_id: impl Into<PortId>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source_node_id.into(),
            source_port_id: source_port_id.into(),
            target_node_id: target_node_id.into(),
            target_port_id: target_port_id.into(),
            data: DataMap::new(),
        }
    }

    /// Set one payload entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// A directed connection between two ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Edge ID
    pub id: EdgeId,
    /// Source node ID
    pub source_node_id: NodeId,
    /// Source port ID
    pub source_port_id: PortId,
    /// Target node ID
    pub target_node_id: NodeId,
    /// Target port ID
    pub target_port_id: PortId,
    /// Payload
    pub data: DataMap,
    /// Mirrors selection state
    pub selected: bool,
}

impl Edge {
    pub(crate) fn from_spec(spec: &EdgeSpec) -> Self {
        Self {
            id: spec.id.clone(),
            source_node_id: spec.source_node_id.clone(),
            source_port_id: spec.source_port_id.clone(),
            target_node_id: spec.target_node_id.clone(),
            target_port_id: spec.target_port_id.clone(),
            data: spec.data.clone(),
            selected: false,
        }
    }

    /// Snapshot of this edge without selection state
    pub fn to_spec(&self) -> EdgeSpec {
        EdgeSpec {
            id: self.id.clone(),
            source_node_id: self.source_node_id.clone(),
            source_port_id: self.source_port_id.clone(),
            target_node_id: self.target_node_id.clone(),
            target_port_id: self.target_port_id.clone(),
            data: self.data.clone(),
        }
    }

    /// Whether this edge runs between exactly this ordered port pair
    pub fn connects(
        &self,
        source_node_id: &NodeId,
        source_port_id: &PortId,
        target_node_id: &NodeId,
        target_port_id: &PortId,
    ) -> bool {
        &self.source_node_id == source_node_id
            && &self.source_port_id == source_port_id
            && &self.target_node_id == target_node_id
            && &self.target_port_id == target_port_id
    }
}
