// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection rules consulted before an edge is inserted.
//!
//! These are pure functions over ports. The store layers id resolution,
//! self-loop checks and single-connection replacement on top.

use crate::node::NodeId;
use crate::port::{Port, PortId};
use serde::{Deserialize, Serialize};

/// Why two ports cannot be connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RejectReason {
    /// Both ports face the same way
    #[error("ports have the same direction")]
    SameDirection,

    /// Both ports declare a data type and they differ
    #[error("data type mismatch: {source_type} -> {target_type}")]
    DataTypeMismatch {
        /// Type of the source port
        source_type: String,
        /// Type of the target port
        target_type: String,
    },

    /// A single-connection port already holds an edge
    #[error("port {node_id}.{port_id} already has a connection")]
    PortAtCapacity {
        /// Owning node
        node_id: NodeId,
        /// Occupied port
        port_id: PortId,
    },

    /// An edge already runs between this exact port pair
    #[error("an edge already connects these ports")]
    DuplicateEdge,

    /// Source and target node are the same
    #[error("self-loops are not allowed")]
    SelfLoop,

    /// Endpoint node does not exist
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Endpoint port does not exist on its node
    #[error("port not found: {node_id}.{port_id}")]
    PortNotFound {
        /// Node that was searched
        node_id: NodeId,
        /// Missing port
        port_id: PortId,
    },
}

/// Outcome of an advisory connection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    /// Whether the connection would be accepted as-is
    pub ok: bool,
    /// First rule that failed
    pub reason: Option<RejectReason>,
}

impl ConnectionCheck {
    /// A passing check
    pub fn allowed() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    /// A failing check
    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> Result<(), RejectReason> {
        match self.reason {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

impl From<Result<(), RejectReason>> for ConnectionCheck {
    fn from(result: Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => Self::allowed(),
            Err(reason) => Self::rejected(reason),
        }
    }
}

/// Check that two data type tags may meet. `None` matches anything.
pub fn data_types_compatible(source: Option<&str>, target: Option<&str>) -> bool {
    match (source, target) {
        (Some(source), Some(target)) => source == target,
        _ => true,
    }
}

/// Direction and data type rules.
///
/// This is the part of [`can_connect`] that edge creation enforces; capacity
/// is resolved by replacing the old edge instead.
pub fn check_compatibility(source: &Port, target: &Port) -> Result<(), RejectReason> {
    // Must be opposite directions
    if source.direction == target.direction {
        return Err(RejectReason::SameDirection);
    }

    if !data_types_compatible(source.data_type.as_deref(), target.data_type.as_deref()) {
        return Err(RejectReason::DataTypeMismatch {
            source_type: source.data_type.clone().unwrap_or_default(),
            target_type: target.data_type.clone().unwrap_or_default(),
        });
    }

    Ok(())
}

/// Advisory check used to pre-flight a user action.
///
/// `already_linked` is whether an edge already runs from `source` to `target`.
pub fn can_connect(source: &Port, target: &Port, already_linked: bool) -> ConnectionCheck {
    connection_rules(source, target, already_linked).into()
}

fn connection_rules(source: &Port, target: &Port, already_linked: bool) -> Result<(), RejectReason> {
    check_compatibility(source, target)?;

    if let Some(port) = [source, target].into_iter().find(|port| port.is_at_capacity()) {
        return Err(RejectReason::PortAtCapacity {
            node_id: port.node_id.clone(),
            port_id: port.id.clone(),
        });
    }

    if already_linked {
        return Err(RejectReason::DuplicateEdge);
    }
    Ok(())
}
