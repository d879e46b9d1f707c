// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-graph snapshots and their text encodings.

use crate::edge::EdgeSpec;
use crate::error::{GraphError, Result};
use crate::node::NodeSpec;
use serde::{Deserialize, Serialize};

/// Plain-data copy of a graph: nodes with their ports, then edges
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes
    pub nodes: Vec<NodeSpec>,
    /// Edges
    pub edges: Vec<EdgeSpec>,
}

impl GraphSnapshot {
    /// Whether the snapshot holds nothing
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Encode as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GraphError::serialization("failed to encode snapshot as JSON", Some(e)))
    }

    /// Decode from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| GraphError::deserialization(format!("invalid JSON snapshot: {e}"), Some(e)))
    }

    /// Encode as RON
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GraphError::serialization("failed to encode snapshot as RON", Some(e)))
    }

    /// Decode from RON
    pub fn from_ron(ron: &str) -> Result<Self> {
        ron::from_str(ron)
            .map_err(|e| GraphError::deserialization(format!("invalid RON snapshot: {e}"), Some(e)))
    }
}

/// One entry of a snapshot import, used to report failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotItem {
    /// A node spec
    Node(NodeSpec),
    /// An edge spec
    Edge(EdgeSpec),
}
