// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::edge::EdgeId;
use crate::node::NodeId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier for a port, unique within its owning node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub String);

impl PortId {
    /// Create a new random port ID
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

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PortId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

impl PortDirection {
    /// Side a port is drawn on when none is given
    pub fn default_side(self) -> PortSide {
        match self {
            Self::Input => PortSide::Left,
            Self::Output => PortSide::Right,
        }
    }
}

/// Edge of the node box a port is attached to.
///
/// Only stored for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSide {
    /// Top edge
    Top,
    /// Right edge
    Right,
    /// Bottom edge
    Bottom,
    /// Left edge
    Left,
}

/// Creation-time description of a port.
///
/// When deserialized without a `side`, the direction's default side is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PortSpecRepr")]
pub struct PortSpec {
    /// Port ID
    pub id: PortId,
    /// Port direction
    pub direction: PortDirection,
    /// Data type tag, `None` connects to anything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Whether more than one edge may attach
    pub allow_multiple: bool,
    /// Side of the node
    pub side: PortSide,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortSpecRepr {
    id: PortId,
    direction: PortDirection,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    allow_multiple: bool,
    #[serde(default)]
    side: Option<PortSide>,
}

impl From<PortSpecRepr> for PortSpec {
    fn from(repr: PortSpecRepr) -> Self {
        Self {
            id: repr.id,
            direction: repr.direction,
            data_type: repr.data_type,
            allow_multiple: repr.allow_multiple,
            side: repr.side.unwrap_or_else(|| repr.direction.default_side()),
        }
    }
}

impl PortSpec {
    /// Create a port spec with the direction's default side
    pub fn new(id: impl Into<PortId>, direction: PortDirection) -> Self {
        Self {
            id: id.into(),
            direction,
            data_type: None,
            allow_multiple: false,
            side: direction.default_side(),
        }
    }

    /// Create an input port spec
    pub fn input(id: impl Into<PortId>) -> Self {
        Self::new(id, PortDirection::Input)
    }

    /// Create an output port spec
    pub fn output(id: impl Into<PortId>) -> Self {
        Self::new(id, PortDirection::Output)
    }

    /// Set the data type
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Allow any number of connections
    pub fn multiple(mut self) -> Self {
        self.allow_multiple = true;
        self
    }

    /// Set the side
    pub fn on_side(mut self, side: PortSide) -> Self {
        self.side = side;
        self
    }
}

/// A port on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Port ID
    pub id: PortId,
    /// Owning node
    pub node_id: NodeId,
    /// Port direction
    pub direction: PortDirection,
    /// Data type tag
    pub data_type: Option<String>,
    /// Whether multiple connections are allowed
    pub allow_multiple: bool,
    /// Side of the node
    pub side: PortSide,
    /// Attached edges
    pub connections: IndexSet<EdgeId>,
}

impl Port {
    pub(crate) fn from_spec(node_id: NodeId, spec: &PortSpec) -> Self {
        Self {
            id: spec.id.clone(),
            node_id,
            direction: spec.direction,
            data_type: spec.data_type.clone(),
            allow_multiple: spec.allow_multiple,
            side: spec.side,
            connections: IndexSet::new(),
        }
    }

    /// Spec this port was built from
    pub fn to_spec(&self) -> PortSpec {
        PortSpec {
            id: self.id.clone(),
            direction: self.direction,
            data_type: self.data_type.clone(),
            allow_multiple: self.allow_multiple,
            side: self.side,
        }
    }

    /// Whether any edge is attached
    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    /// Whether a single-connection port is already taken
    pub fn is_at_capacity(&self) -> bool {
        !self.allow_multiple && self.is_connected()
    }
}
