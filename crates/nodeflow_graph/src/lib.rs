// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph core for node-and-edge diagram editors.
//!
//! This crate maintains the logical graph behind a flow-chart style editor:
//! - Nodes with typed, directional ports
//! - Edges checked against connection rules
//! - Mutation events for renderers
//! - Undo/redo over recorded commands
//!
//! ## Architecture
//!
//! [`EntityStore`] owns the node and edge tables and enforces referential
//! integrity. It consults [`validation`] before inserting an edge and
//! announces every change through its [`EventRegistry`]. [`GraphEditor`]
//! wraps the store and records each mutation in a [`History`].
//!
//! Rendering, hit-testing and persistence are left to the host; the store
//! only exposes [`GraphSnapshot`]s.

pub mod config;
pub mod edge;
pub mod editor;
pub mod error;
pub mod events;
pub mod history;
pub mod node;
pub mod port;
pub mod snapshot;
pub mod store;
pub mod validation;

pub use config::EditorConfig;
pub use edge::{Edge, EdgeId, EdgeSpec};
pub use editor::GraphEditor;
pub use error::{BatchError, BatchFailure, ErrorKind, GraphError, Result};
pub use events::{EventRegistry, EventType, GraphEvent, ListenerId};
pub use history::{Command, History, HistoryStats};
pub use node::{DataMap, Node, NodeId, NodeSpec, NodeTypeDefinition, NodeTypeRegistry, NodeUpdate, Position};
pub use port::{Port, PortDirection, PortId, PortSide, PortSpec};
pub use snapshot::{GraphSnapshot, SnapshotItem};
pub use store::EntityStore;
pub use validation::{ConnectionCheck, RejectReason};
